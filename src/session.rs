// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::episode::{EpisodeOutcome, episode_stem, indexed_stem, process_episode_as};
use crate::error::SessionError;
use crate::feed::Podcast;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::selection::Selection;
use crate::transcode::Encoder;

/// Result of processing one selection
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Episodes converted to Opus
    pub transcoded: usize,
    /// Episodes that were already Opus/Ogg and stored as-is
    pub downloaded: usize,
    /// Episodes whose destination already existed
    pub skipped: usize,
    /// Number of episodes that failed
    pub failed: usize,
    /// Details of failed episodes (title, error message)
    pub failed_episodes: Vec<(String, String)>,
}

impl BatchResult {
    /// Number of episodes that ended up on disk during this batch
    pub fn succeeded(&self) -> usize {
        self.transcoded + self.downloaded
    }
}

/// Make sure the destination directory exists
pub fn prepare_output_dir(output_dir: &Path) -> Result<(), SessionError> {
    if output_dir.exists() {
        if !output_dir.is_dir() {
            return Err(SessionError::NotADirectory(output_dir.to_path_buf()));
        }
        return Ok(());
    }

    std::fs::create_dir_all(output_dir).map_err(|e| SessionError::CreateDirectoryFailed {
        path: output_dir.to_path_buf(),
        source: e,
    })
}

/// Process the selected episodes one at a time, in selection order
///
/// A failing episode is reported and recorded, then the batch moves on to
/// the next one. Nothing is retried. When two episodes of the batch sanitize
/// to the same filename stem, the later one gets its index appended.
pub async fn run_selection<C: HttpClient>(
    client: &C,
    encoder: &dyn Encoder,
    podcast: &Podcast,
    selection: &Selection,
    output_dir: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<BatchResult, SessionError> {
    prepare_output_dir(output_dir)?;

    let mut result = BatchResult::default();
    let total_selected = selection.len();
    // stem -> index of the episode that claimed it
    let mut claimed: HashMap<String, usize> = HashMap::new();

    for (position, &index) in selection.indices().iter().enumerate() {
        // Index is 1-based
        let Some(episode) = podcast.episodes.get(index - 1) else {
            warn!(index, "selection refers to a missing episode");
            continue;
        };

        reporter.report(ProgressEvent::EpisodeStarting {
            episode_title: episode.title.clone(),
            position,
            total_selected,
        });

        let mut stem = episode_stem(episode);
        if claimed.get(&stem).is_some_and(|&owner| owner != episode.index) {
            let renamed = indexed_stem(episode);
            info!(
                episode = %episode.title,
                stem = %renamed,
                "filename already used in this batch"
            );
            stem = renamed;
        }
        claimed.insert(stem.clone(), episode.index);

        match process_episode_as(client, encoder, episode, &stem, output_dir, reporter).await {
            Ok(outcome) => {
                match &outcome {
                    EpisodeOutcome::Transcoded(_) => result.transcoded += 1,
                    EpisodeOutcome::Downloaded(_) => result.downloaded += 1,
                    EpisodeOutcome::Skipped(path) => {
                        result.skipped += 1;
                        reporter.report(ProgressEvent::EpisodeSkipped {
                            episode_title: episode.title.clone(),
                            path: path.clone(),
                        });
                        continue;
                    }
                }
                reporter.report(ProgressEvent::EpisodeFinished {
                    episode_title: episode.title.clone(),
                    path: outcome.path().to_path_buf(),
                });
            }
            Err(e) => {
                info!(episode = %episode.title, error = %e, "episode failed");
                result.failed += 1;
                result
                    .failed_episodes
                    .push((episode.title.clone(), e.to_string()));
                reporter.report(ProgressEvent::EpisodeFailed {
                    episode_title: episode.title.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        transcoded = result.transcoded,
        downloaded = result.downloaded,
        skipped = result.skipped,
        failed = result.failed,
        "selection processed"
    );
    reporter.report(ProgressEvent::BatchCompleted {
        transcoded_count: result.transcoded,
        downloaded_count: result.downloaded,
        skipped_count: result.skipped,
        failed_count: result.failed,
    });

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::tempdir;
    use url::Url;

    use crate::episode::mock::MockHttpClient;
    use crate::feed::parse_feed;
    use crate::http::{ByteStream, HttpResponse};
    use crate::progress::NoopReporter;
    use crate::progress::recording::RecordingReporter;
    use crate::selection::parse_selection;
    use crate::transcode::stub::EncoderStub;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast</description>
    <item>
      <title>Episode 3</title>
      <enclosure url="https://example.com/ep3.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 2</title>
      <enclosure url="https://example.com/ep2.opus" type="audio/opus"/>
    </item>
    <item>
      <title>Episode 1</title>
      <enclosure url="https://example.com/ep1.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    fn podcast() -> Podcast {
        parse_feed(
            SAMPLE_FEED.as_bytes(),
            Url::parse("https://example.com/feed.xml").unwrap(),
        )
        .unwrap()
    }

    /// Fails every URL listed in `broken`, serves audio for the rest
    struct FlakyClient {
        broken: Vec<&'static str>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for FlakyClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            unreachable!("episodes are always streamed")
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.requested.lock().unwrap().push(url.to_string());
            let status = if self.broken.iter().any(|b| url.ends_with(b)) {
                503
            } else {
                200
            };
            let body: ByteStream = Box::pin(futures::stream::once(async {
                Ok::<_, reqwest::Error>(Bytes::from_static(b"audio"))
            }));
            Ok(HttpResponse {
                status,
                content_length: Some(5),
                body,
            })
        }
    }

    #[tokio::test]
    async fn run_selection_handles_mixed_formats() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::ok(b"audio");
        let encoder = EncoderStub::default();
        let selection = parse_selection("all", 3).unwrap();

        let result = run_selection(
            &client,
            &encoder,
            &podcast(),
            &selection,
            dir.path(),
            &NoopReporter,
        )
        .await
        .unwrap();

        assert_eq!(result.transcoded, 2);
        assert_eq!(result.downloaded, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.succeeded(), 3);
        assert_eq!(encoder.calls(), 2);
        assert!(dir.path().join("Episode_2.opus").exists());
    }

    #[tokio::test]
    async fn run_selection_processes_in_selection_order_and_continues_after_failure() {
        let dir = tempdir().unwrap();
        let client = FlakyClient {
            broken: vec!["ep3.mp3"],
            requested: Mutex::new(Vec::new()),
        };
        let encoder = EncoderStub::default();
        let reporter = RecordingReporter::default();
        let selection = parse_selection("3,1,2", 3).unwrap();

        let result = run_selection(
            &client,
            &encoder,
            &podcast(),
            &selection,
            dir.path(),
            &reporter,
        )
        .await
        .unwrap();

        assert_eq!(
            *client.requested.lock().unwrap(),
            vec![
                "https://example.com/ep1.mp3",
                "https://example.com/ep3.mp3",
                "https://example.com/ep2.opus",
            ]
        );
        assert_eq!(result.failed, 1);
        assert_eq!(result.failed_episodes[0].0, "Episode 3");
        assert_eq!(result.succeeded(), 2);
        assert_eq!(
            reporter.count(|e| matches!(e, ProgressEvent::EpisodeFailed { .. })),
            1
        );
        assert_eq!(
            reporter.count(|e| matches!(e, ProgressEvent::BatchCompleted { failed_count: 1, .. })),
            1
        );
    }

    #[tokio::test]
    async fn run_selection_skips_on_second_run() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::ok(b"audio");
        let encoder = EncoderStub::default();
        let selection = parse_selection("f2", 3).unwrap();

        run_selection(&client, &encoder, &podcast(), &selection, dir.path(), &NoopReporter)
            .await
            .unwrap();
        let second = run_selection(&client, &encoder, &podcast(), &selection, dir.path(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(second.skipped, 2);
        assert_eq!(second.succeeded(), 0);
        assert_eq!(encoder.calls(), 1);
    }

    #[tokio::test]
    async fn run_selection_creates_output_dir() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("nested").join("podcast");
        let client = MockHttpClient::ok(b"audio");
        let encoder = EncoderStub::default();
        let selection = parse_selection("2", 3).unwrap();

        let result = run_selection(&client, &encoder, &podcast(), &selection, &output_dir, &NoopReporter)
            .await
            .unwrap();

        assert_eq!(result.downloaded, 1);
        assert!(output_dir.join("Episode_2.opus").exists());
    }

    #[test]
    fn prepare_output_dir_rejects_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();

        assert!(matches!(
            prepare_output_dir(&file),
            Err(SessionError::NotADirectory(_))
        ));
    }

    const COLLIDING_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Colliding Podcast</title>
    <item>
      <title>Episode: 1</title>
      <enclosure url="https://example.com/a.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 1</title>
      <enclosure url="https://example.com/b.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn run_selection_keeps_colliding_titles_apart() {
        let dir = tempdir().unwrap();
        let podcast = parse_feed(
            COLLIDING_FEED.as_bytes(),
            Url::parse("https://example.com/feed.xml").unwrap(),
        )
        .unwrap();
        let client = MockHttpClient::ok(b"audio");
        let encoder = EncoderStub::default();
        let selection = parse_selection("all", 2).unwrap();

        let first = run_selection(&client, &encoder, &podcast, &selection, dir.path(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(first.transcoded, 2);
        assert_eq!(first.skipped, 0);
        assert!(dir.path().join("Episode_1.opus").exists());
        assert!(dir.path().join("Episode_1-2.opus").exists());

        let second = run_selection(&client, &encoder, &podcast, &selection, dir.path(), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(second.skipped, 2);
        assert_eq!(encoder.calls(), 2);
    }
}
