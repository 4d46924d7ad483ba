pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod progress;
pub mod selection;
pub mod session;
pub mod transcode;

// Re-export main types for convenience
pub use episode::{EpisodeOutcome, process_episode, sanitize_filename};
pub use error::{DownloadError, EpisodeError, FeedError, SelectionError, SessionError, TranscodeError};
pub use feed::{Enclosure, Episode, Podcast, is_url, load_podcast, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use selection::{Choice, Selection, parse_choice, parse_selection};
pub use session::{BatchResult, run_selection};
pub use transcode::{Application, Encoder, EncoderSettings, FfmpegEncoder};
