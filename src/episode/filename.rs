use crate::feed::Episode;

/// Maximum length, in bytes, of a sanitized title
const MAX_STEM_LENGTH: usize = 200;

/// Punctuation that survives sanitization next to letters and digits
const SAFE_PUNCTUATION: &[char] = &['_', '.', '(', ')', '+', ',', '\'', '&'];

/// Extension of transcoded files
pub const OPUS_EXTENSION: &str = "opus";

/// Check if a character belongs to the documented safe set
///
/// The safe set is every Unicode letter or digit plus [`SAFE_PUNCTUATION`].
/// Whitespace, dashes and underscores are handled as separators instead.
fn is_safe_char(c: char) -> bool {
    c.is_alphanumeric() || SAFE_PUNCTUATION.contains(&c)
}

fn is_separator(c: char) -> bool {
    c == '-' || c == '_' || c.is_whitespace()
}

/// Sanitize an episode title into a filename stem
///
/// Runs of whitespace and dashes collapse into a single `_`, characters
/// outside the safe set are removed, leading and trailing `_`/`.` are
/// trimmed and the result is capped at 200 bytes on a character boundary.
/// Names Windows reserves for devices are rejected as well.
pub fn sanitize_filename(title: &str) -> String {
    let collapsed = collapse_separators(title);
    let trimmed = collapsed.trim_matches(|c| c == '_' || c == '.');
    let truncated = truncate_at_char_boundary(trimmed, MAX_STEM_LENGTH).trim_end_matches(['_', '.']);

    sanitize_filename::sanitize_with_options(
        truncated,
        sanitize_filename::Options {
            windows: true,
            truncate: false,
            replacement: "",
        },
    )
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Keep safe characters, turn separator runs into one underscore, drop the rest
fn collapse_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_separator = false;

    for c in s.chars() {
        if is_separator(c) {
            if !last_was_separator {
                result.push('_');
                last_was_separator = true;
            }
        } else if is_safe_char(c) {
            result.push(c);
            last_was_separator = false;
        }
    }

    result
}

/// Filename stem for an episode, falling back to its index for empty titles
pub fn episode_stem(episode: &Episode) -> String {
    let stem = sanitize_filename(&episode.title);
    if stem.is_empty() {
        format!("episode-{}", episode.index)
    } else {
        stem
    }
}

/// Stem for an episode whose [`episode_stem`] is already taken by another
/// episode of the same batch
pub fn indexed_stem(episode: &Episode) -> String {
    format!("{}-{}", episode_stem(episode), episode.index)
}

/// Get the audio file extension from an episode's enclosure
///
/// Attempts to extract from URL path or MIME type, defaults to "mp3"
pub fn get_audio_extension(episode: &Episode) -> String {
    if let Some(ext) = episode
        .enclosure
        .url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| is_valid_audio_extension(ext))
    {
        return ext.to_lowercase();
    }

    if let Some(ref mime) = episode.enclosure.mime_type
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    "mp3".to_string()
}

/// Final filename of an episode that is downloaded without transcoding
pub fn native_filename(episode: &Episode, stem: &str) -> String {
    let ext = match get_audio_extension(episode).as_str() {
        "ogg" => "ogg",
        _ => OPUS_EXTENSION,
    };
    format!("{stem}.{ext}")
}

/// Final filename of an episode that goes through the encoder
pub fn transcoded_filename(stem: &str) -> String {
    format!("{stem}.{OPUS_EXTENSION}")
}

/// Temporary filename holding the source audio until the encoder is done
pub fn temporary_filename(episode: &Episode, stem: &str) -> String {
    let ext = match get_audio_extension(episode).as_str() {
        // Never let the source collide with the encoder's output name
        "opus" => "audio".to_string(),
        other => other.to_string(),
    };
    format!("{stem}.tmp.{ext}")
}

/// Check if a string is a valid audio file extension
fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

/// Map MIME types to file extensions
fn mime_to_extension(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}
