// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tracing::debug;
use url::Url;

use crate::error::FeedError;

/// Represents a parsed podcast feed
#[derive(Debug, Clone)]
pub struct Podcast {
    pub title: String,
    pub author: Option<String>,
    pub feed_url: Url,
    /// Episodes in feed order, indexed from 1
    pub episodes: Vec<Episode>,
}

/// Represents a single podcast episode
#[derive(Debug, Clone)]
pub struct Episode {
    /// 1-based position in feed order
    pub index: usize,
    pub title: String,
    /// The publication date exactly as the feed declares it
    pub published: Option<String>,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub enclosure: Enclosure,
    pub duration: Option<Duration>,
}

/// Represents the audio file attached to an episode
#[derive(Debug, Clone)]
pub struct Enclosure {
    pub url: Url,
    pub length: Option<u64>,
    pub mime_type: Option<String>,
}

impl Enclosure {
    /// Whether the enclosure is already Opus or Ogg audio and needs no transcoding
    ///
    /// The declared MIME type wins; the URL extension is only consulted when
    /// the feed declares no type at all.
    pub fn is_native_opus(&self) -> bool {
        match self.mime_type.as_deref() {
            Some(mime) => {
                let mime = mime.to_ascii_lowercase();
                mime.contains("opus") || mime.contains("ogg")
            }
            None => self
                .url
                .path()
                .rsplit('.')
                .next()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("opus") || ext.eq_ignore_ascii_case("ogg")),
        }
    }
}

/// Parse RSS feed XML bytes into a Podcast struct
///
/// Items without a usable enclosure are dropped, so episode indices are
/// contiguous over the episodes that can actually be downloaded.
pub fn parse_feed(xml_bytes: &[u8], feed_url: Url) -> Result<Podcast, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let episodes: Vec<Episode> = channel
        .items()
        .iter()
        .filter_map(|item| match parse_episode(item) {
            Ok(episode) => Some(episode),
            Err(e) => {
                debug!(error = %e, "skipping feed item");
                None
            }
        })
        .enumerate()
        .map(|(position, episode)| Episode {
            index: position + 1,
            ..episode
        })
        .collect();

    let author = channel
        .itunes_ext()
        .and_then(|ext| ext.author().map(String::from))
        .or_else(|| channel.managing_editor().map(String::from));

    Ok(Podcast {
        title: decode_text(channel.title()),
        author,
        feed_url,
        episodes,
    })
}

fn parse_episode(item: &rss::Item) -> Result<Episode, FeedError> {
    let title = item
        .title()
        .map(decode_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Episode".to_string());

    let enclosure = item
        .enclosure()
        .ok_or_else(|| FeedError::MissingEnclosure {
            title: title.clone(),
        })?;

    let enclosure_url = Url::parse(enclosure.url().trim())?;

    let published = item.pub_date().map(|d| d.trim().to_string());
    let pub_date = published.as_deref().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str)
            .ok()
            .or_else(|| parse_relaxed_date(date_str))
    });

    Ok(Episode {
        index: 0,
        title,
        published,
        pub_date,
        enclosure: Enclosure {
            url: enclosure_url,
            length: enclosure.length().parse().ok(),
            mime_type: Some(enclosure.mime_type().trim().to_string()).filter(|s| !s.is_empty()),
        },
        duration: item
            .itunes_ext()
            .and_then(|ext| ext.duration())
            .and_then(parse_duration),
    })
}

/// Decode HTML entities that feeds commonly leave in titles
fn decode_text(raw: &str) -> String {
    html_escape::decode_html_entities(raw.trim()).into_owned()
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    formats
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
}

/// Parse an `itunes:duration` value
///
/// Accepts plain seconds (`1830`), `MM:SS` and `HH:MM:SS`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut seconds: u64 = 0;
    let mut parts = 0;
    for part in raw.split(':') {
        parts += 1;
        if parts > 3 {
            return None;
        }
        // Fractional seconds appear in the wild ("1830.5"); drop the fraction.
        let whole = part.split('.').next().unwrap_or(part);
        let value: u64 = whole.parse().ok()?;
        seconds = seconds.checked_mul(60)?.checked_add(value)?;
    }

    Some(Duration::from_secs(seconds))
}
