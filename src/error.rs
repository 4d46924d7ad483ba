// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Episode '{title}' has no enclosure (audio file)")]
    MissingEnclosure { title: String },

    #[error("No episodes found in feed {url}")]
    NoEpisodes { url: String },
}

/// Errors produced while parsing an episode selection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Invalid selection '{token}'")]
    InvalidSelection { token: String },

    #[error("Selection '{token}' is outside the available episodes (1-{total})")]
    OutOfRange { token: String, total: usize },
}

/// Errors that can occur during episode downloads
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised by the external audio encoder
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Encoder '{binary}' not found on PATH, please install it to transcode episodes")]
    EncoderNotFound {
        binary: String,
        #[source]
        source: which::Error,
    },

    #[error("Failed to start encoder {binary}: {source}")]
    SpawnFailed {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with {status} while converting {input}: {stderr}")]
    EncoderFailed {
        input: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("I/O error while waiting for encoder: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors for the download/transcode step of a single episode
#[derive(Error, Debug)]
pub enum EpisodeError {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Transcoding failed, source kept at {preserved}: {source}")]
    TranscodeFailed {
        preserved: PathBuf,
        #[source]
        source: TranscodeError,
    },
}

/// Top-level errors for a batch of episodes
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output path {0} is not a directory")]
    NotADirectory(PathBuf),
}
