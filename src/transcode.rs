// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transcoding through an external encoder process.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::TranscodeError;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Number of stderr lines kept when the encoder fails
const STDERR_TAIL_LINES: usize = 5;

/// Opus application profile passed to libopus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Application {
    /// Tuned for speech
    #[default]
    Voip,
    /// Tuned for music and general audio
    Audio,
    LowDelay,
}

impl Application {
    fn as_ffmpeg_arg(self) -> &'static str {
        match self {
            Application::Voip => "voip",
            Application::Audio => "audio",
            Application::LowDelay => "lowdelay",
        }
    }
}

/// Fixed encoder parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub bitrate_kbps: u32,
    pub application: Application,
}

impl Default for EncoderSettings {
    /// 64 kbit/s, voice optimized
    fn default() -> Self {
        Self {
            bitrate_kbps: 64,
            application: Application::Voip,
        }
    }
}

/// Something that turns an audio file into an Opus file
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Convert `input` into `output`, reporting progress against `duration`
    /// when the episode length is known
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        duration: Option<Duration>,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), TranscodeError>;
}

/// Encoder backed by the `ffmpeg` binary and its libopus codec
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary_path: PathBuf,
    settings: EncoderSettings,
}

impl FfmpegEncoder {
    /// Name looked up on `PATH`
    pub const BINARY: &'static str = "ffmpeg";

    /// Create an encoder with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            settings: EncoderSettings::default(),
        }
    }

    /// Locate `ffmpeg` on `PATH`
    ///
    /// Fails with [`TranscodeError::EncoderNotFound`] when it is not installed,
    /// so a missing encoder is noticed before anything is downloaded.
    pub fn from_path() -> Result<Self, TranscodeError> {
        Self::locate(Self::BINARY)
    }

    /// Resolve a binary name or path to an executable encoder
    pub fn locate(binary: impl AsRef<OsStr>) -> Result<Self, TranscodeError> {
        let binary = binary.as_ref();
        which::which(binary)
            .map(Self::new)
            .map_err(|source| TranscodeError::EncoderNotFound {
                binary: binary.to_string_lossy().into_owned(),
                source,
            })
    }

    pub fn with_settings(mut self, settings: EncoderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn settings(&self) -> EncoderSettings {
        self.settings
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
            .map(OsString::from)
            .into();
        args.push(input.into());
        args.extend(["-vn", "-c:a", "libopus", "-b:a"].map(OsString::from));
        args.push(format!("{}k", self.settings.bitrate_kbps).into());
        args.push("-application".into());
        args.push(self.settings.application.as_ffmpeg_arg().into());
        args.extend(["-progress", "pipe:1", "-nostats"].map(OsString::from));
        args.push(output.into());
        args
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        duration: Option<Duration>,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), TranscodeError> {
        let args = self.build_args(input, output);
        debug!(binary = %self.binary_path.display(), ?args, "spawning encoder");

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::SpawnFailed {
                binary: self.binary_path.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("encoder stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("encoder stderr was not captured"))?;

        // stderr is drained alongside stdout so a chatty encoder cannot block on a full pipe
        let read_progress = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(encoded) = parse_progress_line(&line) {
                    reporter.report(ProgressEvent::TranscodeProgress { encoded, duration });
                }
            }
            Ok::<_, std::io::Error>(())
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            BufReader::new(stderr).read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        let (progress, stderr_bytes) = tokio::join!(read_progress, read_stderr);
        let status = child.wait().await?;
        progress?;
        let stderr_bytes = stderr_bytes?;

        if !status.success() {
            return Err(TranscodeError::EncoderFailed {
                input: input.to_path_buf(),
                status: describe_status(status),
                stderr: stderr_tail(&stderr_bytes),
            });
        }

        info!(input = %input.display(), output = %output.display(), "encoder finished");
        Ok(())
    }
}

/// Extract the encoded position from one line of `-progress` output
fn parse_progress_line(line: &str) -> Option<Duration> {
    let (key, value) = line.trim().split_once('=')?;
    // ffmpeg reports microseconds under both keys
    match key {
        "out_time_us" | "out_time_ms" => value.parse().ok().map(Duration::from_micros),
        _ => None,
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

#[cfg(test)]
pub(crate) mod stub {
    use std::sync::Mutex;

    use super::*;

    /// Encoder that never runs a process
    ///
    /// On success it writes a small file to the output path. On failure it
    /// leaves a half-written output behind, the way a crashing encoder would.
    #[derive(Default)]
    pub struct EncoderStub {
        pub fail: bool,
        /// Delete the input after encoding so later cleanup cannot find it
        pub consume_input: bool,
        pub inputs: Mutex<Vec<PathBuf>>,
    }

    impl EncoderStub {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn consuming_input() -> Self {
            Self {
                consume_input: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.inputs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Encoder for EncoderStub {
        async fn transcode(
            &self,
            input: &Path,
            output: &Path,
            duration: Option<Duration>,
            reporter: &dyn ProgressReporter,
        ) -> Result<(), TranscodeError> {
            self.inputs.lock().unwrap().push(input.to_path_buf());
            assert!(input.exists(), "encoder input must exist");

            reporter.report(ProgressEvent::TranscodeProgress {
                encoded: Duration::from_secs(1),
                duration,
            });

            if self.fail {
                std::fs::write(output, b"half")?;
                return Err(TranscodeError::EncoderFailed {
                    input: input.to_path_buf(),
                    status: "exit code 1".to_string(),
                    stderr: "Invalid data found when processing input".to_string(),
                });
            }

            std::fs::write(output, b"OggS opus")?;
            if self.consume_input {
                std::fs::remove_file(input)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopReporter;

    #[test]
    fn default_settings_are_voice_at_64k() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.bitrate_kbps, 64);
        assert_eq!(settings.application, Application::Voip);
    }

    #[test]
    fn build_args_uses_libopus_with_fixed_parameters() {
        let encoder = FfmpegEncoder::new(PathBuf::from("ffmpeg"));
        let args: Vec<String> = encoder
            .build_args(Path::new("in.tmp.mp3"), Path::new("out.opus"))
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();

        let joined = args.join(" ");
        assert!(joined.contains("-i in.tmp.mp3"));
        assert!(joined.contains("-c:a libopus"));
        assert!(joined.contains("-b:a 64k"));
        assert!(joined.contains("-application voip"));
        assert!(joined.contains("-progress pipe:1"));
        assert_eq!(args.last().map(String::as_str), Some("out.opus"));
    }

    #[test]
    fn build_args_follow_custom_settings() {
        let encoder = FfmpegEncoder::new(PathBuf::from("ffmpeg")).with_settings(EncoderSettings {
            bitrate_kbps: 96,
            application: Application::Audio,
        });
        let joined = encoder
            .build_args(Path::new("a"), Path::new("b"))
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect::<Vec<_>>()
            .join(" ");

        assert!(joined.contains("-b:a 96k"));
        assert!(joined.contains("-application audio"));
    }

    #[test]
    fn progress_lines_are_parsed() {
        assert_eq!(
            parse_progress_line("out_time_us=1500000"),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            parse_progress_line("out_time_ms=2000000\n"),
            Some(Duration::from_secs(2))
        );
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
        assert_eq!(parse_progress_line("bitrate=  64.0kbits/s"), None);
        assert_eq!(parse_progress_line("progress=end"), None);
        assert_eq!(parse_progress_line("garbage"), None);
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr = b"line1\nline2\n\nline3\nline4\nline5\nline6\n";
        assert_eq!(stderr_tail(stderr), "line2 | line3 | line4 | line5 | line6");
        assert_eq!(stderr_tail(b""), "");
    }

    #[test]
    fn from_path_agrees_with_which() {
        let which_result = which::which(FfmpegEncoder::BINARY);
        let from_path_result = FfmpegEncoder::from_path();

        assert_eq!(which_result.is_ok(), from_path_result.is_ok());
        if let Err(e) = from_path_result {
            assert!(matches!(e, TranscodeError::EncoderNotFound { .. }));
        }
    }

    #[test]
    fn locate_rejects_missing_explicit_path() {
        let result = FfmpegEncoder::locate("/nonexistent/bin/ffmpeg-xyz");
        match result {
            Err(TranscodeError::EncoderNotFound { binary, .. }) => {
                assert_eq!(binary, "/nonexistent/bin/ffmpeg-xyz")
            }
            other => panic!("expected EncoderNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let encoder = FfmpegEncoder::new(PathBuf::from("/nonexistent/bin/ffmpeg-xyz"));
        let dir = tempfile::tempdir().unwrap();

        let result = encoder
            .transcode(
                &dir.path().join("in.mp3"),
                &dir.path().join("out.opus"),
                None,
                &NoopReporter,
            )
            .await;

        assert!(matches!(result, Err(TranscodeError::SpawnFailed { .. })));
    }

    // Requires ffmpeg with libopus. Run with: cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn ffmpeg_transcodes_generated_tone() {
        let encoder = FfmpegEncoder::from_path().expect("ffmpeg not found in PATH");
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.mp3");
        let output = dir.path().join("tone.opus");

        let status = std::process::Command::new(encoder.binary_path())
            .args(["-hide_banner", "-loglevel", "error", "-f", "lavfi"])
            .args(["-i", "sine=frequency=440:duration=1"])
            .arg(&input)
            .status()
            .unwrap();
        assert!(status.success());

        encoder
            .transcode(&input, &output, Some(Duration::from_secs(1)), &NoopReporter)
            .await
            .unwrap();

        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[tokio::test]
    #[ignore]
    async fn ffmpeg_fails_on_non_audio_input() {
        let encoder = FfmpegEncoder::from_path().expect("ffmpeg not found in PATH");
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bogus.mp3");
        std::fs::write(&input, b"this is not audio").unwrap();

        let result = encoder
            .transcode(&input, &dir.path().join("out.opus"), None, &NoopReporter)
            .await;

        assert!(matches!(result, Err(TranscodeError::EncoderFailed { .. })));
    }
}
