use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::DownloadError;
use crate::feed::Episode;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Download an episode's enclosure to the specified output path
///
/// Streams the response body to disk, reporting progress through the reporter.
/// A file that was only partly written is removed again before the error is
/// returned. Returns the number of bytes downloaded on success.
pub async fn download_episode<C: HttpClient>(
    client: &C,
    episode: &Episode,
    output_path: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<u64, DownloadError> {
    let url = episode.enclosure.url.as_str();
    debug!(url, path = %output_path.display(), "starting download");

    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        episode_title: episode.title.clone(),
        content_length: response.content_length,
    });

    let file = File::create(output_path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    let content_length = response.content_length;
    let result = write_body(file, response.body, url, output_path, content_length, reporter).await;

    match result {
        Ok(bytes_downloaded) => {
            reporter.report(ProgressEvent::DownloadCompleted {
                episode_title: episode.title.clone(),
                bytes_downloaded,
            });
            Ok(bytes_downloaded)
        }
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(output_path).await {
                warn!(
                    path = %output_path.display(),
                    error = %remove_err,
                    "could not remove partial download"
                );
            }
            Err(e)
        }
    }
}

async fn write_body(
    mut file: File,
    mut stream: crate::http::ByteStream,
    url: &str,
    output_path: &Path,
    content_length: Option<u64>,
    reporter: &dyn ProgressReporter,
) -> Result<u64, DownloadError> {
    let mut bytes_downloaded: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            bytes_downloaded,
            total_bytes: content_length,
        });
    }

    // Ensure all data is flushed to disk
    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}
