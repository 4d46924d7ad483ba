use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Events emitted while loading a feed and processing a selection
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// Feed is being read from a local file
    ReadingFeed { path: String },

    /// Feed has been parsed successfully
    FeedParsed {
        podcast_title: String,
        total_episodes: usize,
    },

    /// Processing of a selected episode begins
    EpisodeStarting {
        episode_title: String,
        /// Position of this episode within the current selection
        position: usize,
        /// Number of episodes in the current selection
        total_selected: usize,
    },

    /// A download is starting
    DownloadStarting {
        episode_title: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed successfully
    DownloadCompleted {
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// The encoder was started for an episode
    TranscodeStarting {
        episode_title: String,
        /// Declared episode length, used as the progress total when known
        duration: Option<Duration>,
    },

    /// Encoder progress update
    TranscodeProgress {
        encoded: Duration,
        duration: Option<Duration>,
    },

    /// The encoder finished and the temporary file was removed
    TranscodeCompleted { episode_title: String },

    /// The destination already existed, nothing was done
    EpisodeSkipped { episode_title: String, path: PathBuf },

    /// An episode was written to its final destination
    EpisodeFinished { episode_title: String, path: PathBuf },

    /// Downloading or transcoding an episode failed
    EpisodeFailed {
        episode_title: String,
        error: String,
    },

    /// All episodes of a selection were handled
    BatchCompleted {
        transcoded_count: usize,
        downloaded_count: usize,
        skipped_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}


#[cfg(test)]
mod tests {
    use super::recording::RecordingReporter;
    use super::*;

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter::shared();

        reporter.report(ProgressEvent::FetchingFeed {
            url: "https://example.com/feed.xml".to_string(),
        });
        reporter.report(ProgressEvent::DownloadProgress {
            bytes_downloaded: 512,
            total_bytes: Some(1024),
        });
        reporter.report(ProgressEvent::TranscodeProgress {
            encoded: Duration::from_secs(10),
            duration: None,
        });
        reporter.report(ProgressEvent::BatchCompleted {
            transcoded_count: 1,
            downloaded_count: 1,
            skipped_count: 0,
            failed_count: 1,
        });
    }

    #[test]
    fn recording_reporter_keeps_events_in_order() {
        let reporter = RecordingReporter::default();

        reporter.report(ProgressEvent::FeedParsed {
            podcast_title: "Test".to_string(),
            total_episodes: 3,
        });
        reporter.report(ProgressEvent::EpisodeFailed {
            episode_title: "Episode 2".to_string(),
            error: "Connection timeout".to_string(),
        });

        let events = reporter.events.lock().unwrap();
        assert!(matches!(events[0], ProgressEvent::FeedParsed { .. }));
        assert!(matches!(events[1], ProgressEvent::EpisodeFailed { .. }));
    }
}
