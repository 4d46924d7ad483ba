use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podopus::{
    BatchResult, Choice, FfmpegEncoder, NoopReporter, Podcast, ProgressEvent, ProgressReporter,
    ReqwestClient, SharedProgressReporter, parse_choice, parse_selection, run_selection,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static ENCODE: Emoji<'_, '_> = Emoji("🎛️  ", "[o] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static SKIPPED: Emoji<'_, '_> = Emoji("⏭️  ", "[=] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

const DEFAULT_FEED: &str = "https://feeds.podcastindex.org/pc20.xml";

/// Episodes shown at each end of a long episode list
const LIST_EDGE: usize = 5;

/// Download podcast episodes and transcode them to Opus
#[derive(Parser, Debug)]
#[command(name = "podopus")]
#[command(about = "Download podcast episodes and transcode them to compact Opus audio")]
#[command(version)]
struct Args {
    /// RSS feed URL or path to local RSS file (prompted for when omitted)
    feed: Option<String>,

    /// Output directory for downloaded episodes
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Process a single selection (e.g. "l3", "10-25", "all") and exit
    #[arg(short, long)]
    select: Option<String>,

    /// Encoder binary to use instead of looking up ffmpeg on PATH
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Progress reporter using indicatif for terminal output
///
/// Episodes are handled one after another, so a single bar is enough.
struct IndicatifReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn replace_bar(&self, bar: ProgressBar) {
        let mut current = self.bar.lock().unwrap();
        if let Some(old) = current.replace(bar) {
            old.finish_and_clear();
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bar.lock().unwrap().as_ref() {
            f(bar);
        }
    }

    fn clear_bar(&self) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {wide_msg}")
                .unwrap(),
        );
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    fn download_bar(content_length: Option<u64>) -> ProgressBar {
        match content_length {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(&format!(
                            "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{bytes_per_sec}} {{wide_msg}}"
                        ))
                        .unwrap()
                        .progress_chars("█▓░"),
                );
                bar
            }
            None => {
                let bar = Self::spinner(String::new());
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template(&format!("  {DOWNLOAD}{{spinner:.cyan}} {{bytes}} {{bytes_per_sec}}"))
                        .unwrap(),
                );
                bar
            }
        }
    }

    fn encode_bar(duration: Option<Duration>) -> ProgressBar {
        match duration.filter(|d| !d.is_zero()) {
            Some(total) => {
                let bar = ProgressBar::new(total.as_secs());
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(&format!(
                            "  {ENCODE}[{{bar:30.magenta/blue}}] {{percent:>3}}% {{wide_msg}}"
                        ))
                        .unwrap()
                        .progress_chars("█▓░"),
                );
                bar
            }
            None => {
                let bar = Self::spinner(String::new());
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template(&format!("  {ENCODE}{{spinner:.magenta}} {{wide_msg}}"))
                        .unwrap(),
                );
                bar
            }
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.replace_bar(Self::spinner(format!(
                    "{SEARCH}Fetching feed: {}",
                    url.cyan()
                )));
            }

            ProgressEvent::ReadingFeed { path } => {
                self.replace_bar(Self::spinner(format!(
                    "{SEARCH}Reading feed: {}",
                    path.cyan()
                )));
            }

            ProgressEvent::FeedParsed { .. } => self.clear_bar(),

            ProgressEvent::EpisodeStarting {
                episode_title,
                position,
                total_selected,
            } => {
                println!(
                    "\n[{}/{}] {}",
                    (position + 1).to_string().cyan(),
                    total_selected.to_string().cyan(),
                    episode_title.bold()
                );
            }

            ProgressEvent::DownloadStarting { content_length, .. } => {
                self.replace_bar(Self::download_bar(content_length));
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
            } => {
                self.with_bar(|bar| {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                });
            }

            ProgressEvent::DownloadCompleted { .. } => self.clear_bar(),

            ProgressEvent::TranscodeStarting { duration, .. } => {
                let bar = Self::encode_bar(duration);
                bar.set_message("transcoding to Opus".dimmed().to_string());
                self.replace_bar(bar);
            }

            ProgressEvent::TranscodeProgress { encoded, duration } => {
                self.with_bar(|bar| {
                    if duration.is_some_and(|d| !d.is_zero()) {
                        bar.set_position(encoded.as_secs());
                    }
                    bar.set_message(format!("encoded {}", format_clock(encoded)).dimmed().to_string());
                });
            }

            ProgressEvent::TranscodeCompleted { .. } => self.clear_bar(),

            ProgressEvent::EpisodeSkipped { path, .. } => {
                self.clear_bar();
                println!(
                    "  {SKIPPED}{} {}",
                    "Already exists:".yellow(),
                    path.display().to_string().dimmed()
                );
            }

            ProgressEvent::EpisodeFinished { path, .. } => {
                self.clear_bar();
                println!("  {SUCCESS}{}", path.display().to_string().green());
            }

            ProgressEvent::EpisodeFailed { error, .. } => {
                if let Some(bar) = self.bar.lock().unwrap().take() {
                    bar.abandon();
                }
                println!("  {FAILURE}{}", error.red());
            }

            ProgressEvent::BatchCompleted {
                transcoded_count,
                downloaded_count,
                skipped_count,
                failed_count,
            } => {
                self.clear_bar();
                println!(
                    "\n{PARTY}{} {} transcoded, {} downloaded, {} skipped, {} failed",
                    "Done:".bold().green(),
                    transcoded_count.to_string().green().bold(),
                    downloaded_count.to_string().green(),
                    skipped_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }
        }
    }
}

fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("podopus={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Print `message` and read one line from stdin; `None` on end of input
fn prompt(message: &str) -> Result<Option<String>> {
    let term = console::Term::stdout();
    term.write_str(message).context("Failed to write prompt")?;
    std::io::stdout().flush().ok();

    let mut line = String::new();
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_episode_list(podcast: &Podcast) {
    let total = podcast.episodes.len();
    let rule = "=".repeat(70);

    println!("\n{}", rule.dimmed());
    println!("{HEADPHONES}{}", podcast.title.bold().green());
    if let Some(author) = &podcast.author {
        println!("   {}", author.dimmed());
    }
    println!("   {} episodes available", total.to_string().cyan());
    println!("{}\n", rule.dimmed());

    let print_line = |episode: &podopus::Episode| {
        let date = episode
            .pub_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .or_else(|| episode.published.clone())
            .unwrap_or_else(|| "No date".to_string());
        let marker = if episode.enclosure.is_native_opus() {
            " opus".magenta().to_string()
        } else {
            String::new()
        };
        println!(
            "  [{}] {} {}{}",
            format!("{:03}", episode.index).cyan(),
            episode.title,
            format!("({date})").dimmed(),
            marker
        );
    };

    if total <= LIST_EDGE * 2 {
        podcast.episodes.iter().for_each(print_line);
    } else {
        podcast.episodes[..LIST_EDGE].iter().for_each(print_line);
        println!(
            "  {}",
            format!("... ({} episodes hidden) ...", total - 2 * LIST_EDGE).dimmed()
        );
        podcast.episodes[total - LIST_EDGE..]
            .iter()
            .for_each(print_line);
    }
    println!();
}

fn print_failures(result: &BatchResult) {
    if result.failed_episodes.is_empty() {
        return;
    }
    println!("\n{}", "Failed episodes:".red().bold());
    for (title, error) in &result.failed_episodes {
        println!("  {}{} - {}", CROSS, title.yellow(), error.dimmed());
    }
}

fn feed_source(args: &Args) -> Result<String> {
    if let Some(feed) = &args.feed {
        return Ok(feed.clone());
    }
    let answer = prompt(&format!(
        "Enter podcast RSS feed URL (or press Enter for default)\n[{}]: ",
        DEFAULT_FEED.cyan()
    ))?;
    Ok(answer
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_FEED.to_string()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podopus".bold().magenta(),
            "- Podcast Downloader with Opus transcoding".dimmed()
        );
    }

    let encoder = match &args.ffmpeg {
        Some(path) => FfmpegEncoder::locate(path),
        None => FfmpegEncoder::from_path(),
    }
    .context("An encoder is required to transcode episodes")?;
    tracing::debug!(binary = %encoder.binary_path().display(), "using encoder");

    let client = ReqwestClient::new().context("Failed to set up HTTP client")?;

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    let source = feed_source(&args)?;
    let podcast = podopus::load_podcast(&client, &source, reporter.as_ref())
        .await
        .with_context(|| format!("Failed to load feed {source}"))?;

    if !args.quiet {
        print_episode_list(&podcast);
    }

    let total = podcast.episodes.len();

    if let Some(select) = &args.select {
        let selection = parse_selection(select, total)?;
        let result = run_selection(
            &client,
            &encoder,
            &podcast,
            &selection,
            &args.output_dir,
            reporter.as_ref(),
        )
        .await
        .context("Failed to process selection")?;

        finish_batch(&args, &result);
        if result.failed > 0 && result.succeeded() == 0 && result.skipped == 0 {
            std::process::exit(1);
        }
        return Ok(());
    }

    let question = format!("Enter selection (1-{total}, fN, lN, all, list, or q to quit): ");
    while let Some(input) = prompt(&question)? {
        let selection = match parse_choice(&input, total) {
            Ok(Choice::Quit) => break,
            Ok(Choice::List) => {
                print_episode_list(&podcast);
                continue;
            }
            Ok(Choice::Episodes(selection)) => selection,
            Err(e) => {
                println!("{FAILURE}{}", e.to_string().red());
                continue;
            }
        };

        let result = run_selection(
            &client,
            &encoder,
            &podcast,
            &selection,
            &args.output_dir,
            reporter.as_ref(),
        )
        .await
        .context("Failed to process selection")?;

        finish_batch(&args, &result);
    }

    Ok(())
}

fn finish_batch(args: &Args, result: &BatchResult) {
    if args.quiet {
        return;
    }
    print_failures(result);
    print_output_dir(&args.output_dir);
}

fn print_output_dir(output_dir: &Path) {
    println!(
        "\n{FOLDER}Output: {}\n",
        output_dir.display().to_string().cyan()
    );
}
