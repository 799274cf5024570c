//! CLI binary for edgequake-fileconv.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, runs a batch and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_fileconv::{
    convert_batch, normalize_format, targets_for, Artifact, ConversionConfig,
    ConversionProgressCallback, ConversionRequest, ConversionState, Converter, ErrorKind,
    FfmpegTranscoder, PendingInput, ProgressCallback, SofficeConverter,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner for the whole batch plus a log
/// line per finished request. Requests finish out of order when
/// `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    total: usize,
    finished: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos}/{len}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            total,
            finished: AtomicUsize::new(0),
        })
    }

    fn tick(&self) {
        self.bar.inc(1);
        if self.finished.fetch_add(1, Ordering::SeqCst) + 1 == self.total {
            self.bar.finish_and_clear();
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_state(&self, request_id: &str, state: ConversionState) {
        if !state.is_terminal() {
            self.bar.set_message(format!("{} {}", dim(request_id), state));
        }
    }

    fn on_complete(&self, request_id: &str, artifact: &Artifact) {
        self.bar.println(format!(
            "  {} {}  {:<5} {}  {}",
            green("✓"),
            dim(request_id),
            artifact.format,
            dim(&format!("{:>9} bytes", artifact.size_bytes)),
            dim(&format!("{:.1}s", artifact.duration_ms as f64 / 1000.0)),
        ));
        self.tick();
    }

    fn on_error(&self, request_id: &str, kind: ErrorKind, _detail: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            dim(request_id),
            red(kind.user_message())
        ));
        self.tick();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Photo to progressive JPEG (MIME guessed from the extension)
  fileconv photo.heic.png --to jpg

  # Several files at once, results moved next to each other
  fileconv a.png b.webp c.bmp --to pdf --output-dir ./out

  # Trim a clip to a 10 s GIF
  fileconv clip.mov --to gif

  # Extract the soundtrack
  fileconv talk.mp4 --to mp3

  # Office document to PDF, explicit MIME
  fileconv report.bin --mime application/vnd.openxmlformats-officedocument.wordprocessingml.document --to pdf

  # What can a MIME type become?
  fileconv --list-formats video/quicktime

  # Are ffmpeg and soffice installed?
  fileconv --check-backends

LIMITS:
  Input size          20 MiB
  Image deadline      30 s
  ffmpeg / soffice    120 s (process is killed on expiry)
  Image long edge     1080 px (never upscaled)
  GIF                 first 10 s, 10 fps, 480 px wide

ENVIRONMENT VARIABLES:
  FILECONV_SCRATCH_DIR   Where artifacts are written (default: $TMPDIR/fileconv)
  FILECONV_FFMPEG        ffmpeg binary (default: ffmpeg)
  FILECONV_SOFFICE       LibreOffice binary (default: soffice)
  RUST_LOG               Overrides the log filter
"#;

/// Convert images, audio, video and office documents between formats.
#[derive(Parser, Debug)]
#[command(
    name = "fileconv",
    version,
    about = "Convert images, audio, video and office documents between formats",
    long_about = "Convert uploaded files to jpg, png, webp, gif, pdf, mp3 or mp4 inside a \
safety envelope: 20 MiB input ceiling, executable deny-list, per-category allow-list, and hard \
deadlines on every backend (in-process image codecs, ffmpeg, LibreOffice).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to convert.
    #[arg(required_unless_present_any = ["list_formats", "check_backends"])]
    inputs: Vec<PathBuf>,

    /// Target format: jpg, jpeg, png, webp, gif, pdf, mp3, mp4 (a leading dot is fine).
    #[arg(short, long, required_unless_present_any = ["list_formats", "check_backends"])]
    to: Option<String>,

    /// Declared MIME type for every input. Guessed from the extension if absent.
    #[arg(long, env = "FILECONV_MIME")]
    mime: Option<String>,

    /// Scratch directory for artifacts.
    #[arg(long, env = "FILECONV_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Owner prefix for artifact names.
    #[arg(long, env = "FILECONV_OWNER", default_value = "cli")]
    owner: String,

    /// Move finished artifacts here as `<input stem>.<format>` (`<stem>-N` on collision).
    #[arg(short, long, env = "FILECONV_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// ffmpeg binary.
    #[arg(long, env = "FILECONV_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// LibreOffice binary.
    #[arg(long, env = "FILECONV_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// JPEG and WebP quality for image targets (1–100).
    #[arg(long, env = "FILECONV_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Number of files converted at once.
    #[arg(short, long, env = "FILECONV_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Output a JSON report instead of text.
    #[arg(long, env = "FILECONV_JSON")]
    json: bool,

    /// Print the targets allowed for a MIME type and exit.
    #[arg(long, value_name = "MIME")]
    list_formats: Option<String>,

    /// Check that ffmpeg and soffice can be run, then exit.
    #[arg(long)]
    check_backends: bool,

    /// Disable the spinner.
    #[arg(long, env = "FILECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FILECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FILECONV_QUIET")]
    quiet: bool,
}

/// One line of the `--json` report.
#[derive(Debug, Serialize)]
struct Report {
    input: PathBuf,
    mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports every request; keep library logs quiet
    // while it is on.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Informational modes ──────────────────────────────────────────────
    if let Some(ref mime) = cli.list_formats {
        let targets = targets_for(mime);
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(targets).context("Failed to serialise formats")?
            );
        } else if targets.is_empty() {
            println!("{} {} cannot be converted", red("✗"), mime);
        } else {
            println!("{}  →  {}", bold(mime), targets.join(", "));
        }
        return Ok(());
    }

    if cli.check_backends {
        let ffmpeg = FfmpegTranscoder::new(&cli.ffmpeg).probe().await;
        let soffice = SofficeConverter::new(&cli.soffice).probe().await;
        for (name, path, ok) in [
            ("ffmpeg", &cli.ffmpeg, ffmpeg),
            ("soffice", &cli.soffice, soffice),
        ] {
            println!(
                "  {} {:<8} {}",
                if ok { green("✓") } else { red("✗") },
                name,
                dim(&path.display().to_string())
            );
        }
        if !(ffmpeg && soffice) {
            anyhow::bail!("Some backends are unavailable; audio/video or document conversion will fail");
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let target = normalize_format(cli.to.as_deref().context("--to is required")?);
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new(cli.inputs.len()) as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let converter = Converter::new(config);

    // ── Build requests ───────────────────────────────────────────────────
    let requests: Vec<ConversionRequest> = cli
        .inputs
        .iter()
        .map(|path| {
            let mime = cli.mime.clone().unwrap_or_else(|| guess_mime(path));
            let mut input = PendingInput::new(path, mime);
            if let Some(name) = path.file_name() {
                input = input.with_display_name(name.to_string_lossy());
            }
            ConversionRequest::new(input, &target).with_owner(&cli.owner)
        })
        .collect();

    // ── Run conversion ───────────────────────────────────────────────────
    let outcomes = convert_batch(&converter, &requests).await;

    let mut reports = Vec::with_capacity(outcomes.len());
    let mut claimed = HashSet::new();
    let mut failed = 0usize;
    for (request, outcome) in requests.iter().zip(outcomes) {
        let input = request.input.path().to_path_buf();
        let mime = request.input.mime().to_string();
        match outcome {
            Ok(mut artifact) => {
                if let Some(ref dir) = cli.output_dir {
                    match deliver(&artifact.path, dir, &input, &artifact.format, &mut claimed).await {
                        Ok(dest) => artifact.path = dest,
                        Err(e) => {
                            // The artifact stays in scratch; report where.
                            failed += 1;
                            let message = format!("{e:#}");
                            if !cli.json {
                                eprintln!(
                                    "{} {}: {} (left at {})",
                                    red("✗"),
                                    input.display(),
                                    message,
                                    artifact.path.display()
                                );
                            }
                            reports.push(Report {
                                input,
                                mime,
                                artifact: Some(artifact),
                                error: Some(ErrorKind::Unknown),
                                message: Some(message),
                            });
                            continue;
                        }
                    }
                }
                if !cli.json {
                    println!("{}", artifact.path.display());
                }
                reports.push(Report {
                    input,
                    mime,
                    artifact: Some(artifact),
                    error: None,
                    message: None,
                });
            }
            Err(e) => {
                failed += 1;
                if !cli.json && !show_progress {
                    eprintln!(
                        "{} {}: {}",
                        red("✗"),
                        input.display(),
                        e.kind().user_message()
                    );
                }
                reports.push(Report {
                    input,
                    mime,
                    artifact: None,
                    error: Some(e.kind()),
                    message: Some(e.kind().user_message().to_string()),
                });
            }
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        let ok = reports.len() - failed;
        eprintln!(
            "{}  {}/{} converted to {}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&ok.to_string()),
            reports.len(),
            bold(&target),
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} conversions failed", reports.len());
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .image_quality(cli.quality)
        .concurrency(cli.concurrency)
        .ffmpeg_path(&cli.ffmpeg)
        .soffice_path(&cli.soffice);

    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Declared MIME for `path`, from its extension.
fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Move an artifact out of scratch into `dir` as `<stem>.<format>`, or
/// `<stem>-N.<format>` when that name is taken on disk or by an earlier input
/// of this run.
async fn deliver(
    artifact: &Path,
    dir: &Path,
    input: &Path,
    format: &str,
    claimed: &mut HashSet<PathBuf>,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let dest = unique_destination(dir, &stem, format, claimed).await?;

    // rename fails across filesystems; fall back to copy + remove.
    if tokio::fs::rename(artifact, &dest).await.is_err() {
        tokio::fs::copy(artifact, &dest)
            .await
            .with_context(|| format!("Failed to copy to {}", dest.display()))?;
        edgequake_fileconv::remove(artifact).await;
    }
    Ok(dest)
}

async fn unique_destination(
    dir: &Path,
    stem: &str,
    format: &str,
    claimed: &mut HashSet<PathBuf>,
) -> Result<PathBuf> {
    for n in 0u32.. {
        let name = if n == 0 {
            format!("{stem}.{format}")
        } else {
            format!("{stem}-{n}.{format}")
        };
        let candidate = dir.join(name);
        if claimed.contains(&candidate) {
            continue;
        }
        let taken = tokio::fs::try_exists(&candidate)
            .await
            .with_context(|| format!("Failed to check {}", candidate.display()))?;
        if !taken {
            claimed.insert(candidate.clone());
            return Ok(candidate);
        }
    }
    anyhow::bail!("No free name for {stem}.{format} in {}", dir.display())
}
