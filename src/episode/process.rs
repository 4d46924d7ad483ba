// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{DownloadError, EpisodeError};
use crate::feed::Episode;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::transcode::Encoder;

use super::download::download_episode;
use super::filename::{episode_stem, native_filename, temporary_filename, transcoded_filename};

/// Suffix for native downloads that have not been completed yet
const PARTIAL_SUFFIX: &str = ".partial";

/// What happened to a single episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    /// Already Opus/Ogg, stored as downloaded
    Downloaded(PathBuf),
    /// Downloaded and converted to Opus
    Transcoded(PathBuf),
    /// The destination already existed
    Skipped(PathBuf),
}

impl EpisodeOutcome {
    pub fn path(&self) -> &Path {
        match self {
            EpisodeOutcome::Downloaded(path)
            | EpisodeOutcome::Transcoded(path)
            | EpisodeOutcome::Skipped(path) => path,
        }
    }
}

/// Download one episode into `output_dir`, transcoding it when it is not Opus
///
/// Episodes that already declare Opus or Ogg audio are streamed straight to
/// their destination and never touch the encoder. Everything else is
/// downloaded to a temporary file first; the temporary file is deleted once
/// the encoder succeeds and kept for inspection when it fails.
pub async fn process_episode<C: HttpClient>(
    client: &C,
    encoder: &dyn Encoder,
    episode: &Episode,
    output_dir: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<EpisodeOutcome, EpisodeError> {
    let stem = episode_stem(episode);
    process_episode_as(client, encoder, episode, &stem, output_dir, reporter).await
}

/// Like [`process_episode`], but names every file after `stem`
pub async fn process_episode_as<C: HttpClient>(
    client: &C,
    encoder: &dyn Encoder,
    episode: &Episode,
    stem: &str,
    output_dir: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<EpisodeOutcome, EpisodeError> {
    let native = episode.enclosure.is_native_opus();
    let destination = output_dir.join(if native {
        native_filename(episode, stem)
    } else {
        transcoded_filename(stem)
    });

    if destination.exists() {
        debug!(path = %destination.display(), "destination exists, skipping");
        return Ok(EpisodeOutcome::Skipped(destination));
    }

    if native {
        download_native(client, episode, &destination, reporter).await?;
        return Ok(EpisodeOutcome::Downloaded(destination));
    }

    let temporary = output_dir.join(temporary_filename(episode, stem));
    download_episode(client, episode, &temporary, reporter).await?;

    reporter.report(ProgressEvent::TranscodeStarting {
        episode_title: episode.title.clone(),
        duration: episode.duration,
    });

    if let Err(source) = encoder
        .transcode(&temporary, &destination, episode.duration, reporter)
        .await
    {
        // A leftover output would be skipped as finished on the next run
        if destination.exists()
            && let Err(e) = tokio::fs::remove_file(&destination).await
        {
            warn!(
                path = %destination.display(),
                error = %e,
                "could not remove failed encoder output"
            );
        }
        return Err(EpisodeError::TranscodeFailed {
            preserved: temporary,
            source,
        });
    }

    // Output is already complete
    if let Err(e) = tokio::fs::remove_file(&temporary).await {
        warn!(
            path = %temporary.display(),
            error = %e,
            "could not remove temporary source file"
        );
    }

    reporter.report(ProgressEvent::TranscodeCompleted {
        episode_title: episode.title.clone(),
    });
    info!(path = %destination.display(), "episode transcoded");

    Ok(EpisodeOutcome::Transcoded(destination))
}

/// Stream a native Opus/Ogg enclosure to `<destination>.partial`, then move it into place
async fn download_native<C: HttpClient>(
    client: &C,
    episode: &Episode,
    destination: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<(), EpisodeError> {
    let mut partial = destination.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    download_episode(client, episode, &partial, reporter).await?;

    if let Err(source) = tokio::fs::rename(&partial, destination).await {
        // Best effort, the rename error is what gets reported
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(DownloadError::RenameFailed {
            from: partial,
            to: destination.to_path_buf(),
            source,
        }
        .into());
    }

    info!(path = %destination.display(), "episode downloaded");
    Ok(())
}
