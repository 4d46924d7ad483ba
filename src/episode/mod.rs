mod download;
mod filename;
mod process;

pub use download::download_episode;
pub use filename::{
    episode_stem, get_audio_extension, indexed_stem, native_filename, sanitize_filename,
    temporary_filename, transcoded_filename,
};
pub use process::{EpisodeOutcome, process_episode, process_episode_as};

#[cfg(test)]
pub(crate) use download::mock;
