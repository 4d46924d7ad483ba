mod fetch;
mod parse;

pub use fetch::{fetch_feed_bytes, is_url, load_podcast, read_feed_file};
pub use parse::{Enclosure, Episode, Podcast, parse_duration, parse_feed};
