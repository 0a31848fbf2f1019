//! CLI binary for edgequake-ocr.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and presents the session's events in the terminal.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr::pipeline::encode::canonical_png;
use edgequake_ocr::{
    extract, extract_to_file, inspect, ExtractionConfig, ExtractionObserver, MediaType, OcrError,
    PageImage, DEFAULT_ENDPOINT, DEFAULT_MODEL,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;
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

// ── Terminal observer ────────────────────────────────────────────────────────

/// Presents session events on the terminal.
///
/// Status lines go to stderr; the extracted text goes to stdout so it can be
/// piped. A spinner covers the recognition call, the only long wait.
struct CliObserver {
    quiet: bool,
    show_spinner: bool,
    /// Print the text to stdout (off for `--json` and `-o`).
    echo_text: bool,
    preview_path: Option<PathBuf>,
    spinner: Mutex<Option<ProgressBar>>,
    failure_shown: AtomicBool,
}

impl CliObserver {
    fn new(cli: &Cli) -> Arc<Self> {
        Arc::new(Self {
            quiet: cli.quiet,
            show_spinner: !cli.quiet && !cli.no_progress && !cli.json,
            echo_text: !cli.json && cli.output.is_none(),
            preview_path: cli.preview.clone(),
            spinner: Mutex::new(None),
            failure_shown: AtomicBool::new(false),
        })
    }

    fn status(&self, line: String) {
        if !self.quiet {
            eprintln!("{line}");
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn failure_shown(&self) -> bool {
        self.failure_shown.load(Ordering::SeqCst)
    }

    fn show_failure(&self, error: &OcrError) {
        self.stop_spinner();
        self.failure_shown.store(true, Ordering::SeqCst);
        eprintln!("{}", red(&bold(&format!("✘ {}", failure_headline(error)))));
        eprintln!("  {}", red(&error.to_string()));
    }
}

impl ExtractionObserver for CliObserver {
    fn on_upload(&self, file_name: &str, _media_type: MediaType) {
        self.status(format!(
            "{} File uploaded successfully: {}",
            green("✔"),
            bold(file_name)
        ));
    }

    fn on_rasterized(&self, media_type: MediaType, page_count: usize) {
        if media_type == MediaType::Pdf {
            self.status(format!(
                "{} Converted PDF to {} image(s)",
                green("✔"),
                page_count
            ));
        }
    }

    fn on_preview(&self, page: &PageImage, caption: &str) {
        self.status(format!(
            "  {} {}",
            bold(caption),
            dim(&format!("{}×{} px", page.width, page.height))
        ));

        let Some(ref path) = self.preview_path else {
            return;
        };
        match canonical_png(page).and_then(|png| {
            std::fs::write(path, png).map_err(|e| OcrError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })
        }) {
            Ok(()) => self.status(format!("  preview saved to {}", path.display())),
            Err(e) => warn!("Could not write preview: {}", e),
        }
    }

    fn on_recognition_start(&self, model: &str) {
        let message = format!("Processing with {model}...");
        if !self.show_spinner {
            self.status(message);
            return;
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(bar);
        }
    }

    fn on_text(&self, text: &str) {
        self.stop_spinner();
        if !self.echo_text {
            return;
        }
        self.status(bold("Extracted Text:"));

        let mut handle = io::stdout().lock();
        let mut written = handle.write_all(text.as_bytes());
        // Terminal nicety only; the text itself is untouched.
        if written.is_ok() && !text.ends_with('\n') {
            written = handle.write_all(b"\n");
        }
        if let Err(e) = written {
            warn!("Failed to write to stdout: {}", e);
        }
    }

    fn on_failure(&self, error: &OcrError) {
        self.show_failure(error);
    }
}

fn failure_headline(error: &OcrError) -> &'static str {
    match error {
        OcrError::Recognition { source, .. } => source.category().headline(),
        OcrError::UnsupportedType { .. } => "Unsupported file type",
        OcrError::ConversionFailed { .. }
        | OcrError::PasswordRequired { .. }
        | OcrError::WrongPassword { .. }
        | OcrError::InvalidImage { .. } => "Could not convert the document to an image",
        OcrError::EncodingFailed { .. } => "Could not encode the image",
        _ => "Extraction failed",
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract text from a scanned PDF (first page)
  ocr-extract scan.pdf

  # From an image, saving the text to a file
  ocr-extract receipt.jpg -o receipt.txt

  # Keep the preview image that was sent to the model
  ocr-extract --preview page1.png contract.pdf

  # Different model, JSON output with timings and token counts
  ocr-extract --model gemini-2.0-flash --json scan.pdf > result.json

  # Page count and first-page size only (no API key needed)
  ocr-extract --inspect-only scan.pdf

SUPPORTED INPUT:
  .pdf  .png  .jpg  .jpeg   (local path or http/https URL)

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY    Gemini API key (GEMINI_API_KEY is also accepted)
  GEMINI_MODEL      Override model ID
  PDFIUM_LIB_PATH   Path to libpdfium (otherwise next to the binary, ./, or system)
  RUST_LOG          Override log filter
"#;

/// Extract text from a PDF or image using a Gemini vision model.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-extract",
    version,
    about = "Extract text from a PDF or image using a Gemini vision model",
    long_about = "Upload a PDF, PNG or JPEG (local file or URL). The first page is rendered, \
previewed, encoded as PNG and sent once to a Gemini vision model; the extracted text is printed \
exactly as returned.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL (.pdf, .png, .jpg, .jpeg).
    input: String,

    /// Write the extracted text to this file instead of stdout.
    #[arg(short, long, env = "OCR_OUTPUT")]
    output: Option<PathBuf>,

    /// Gemini model ID.
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API key (falls back to GEMINI_API_KEY).
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the Gemini API.
    #[arg(long, env = "OCR_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Instruction sent with the image.
    #[arg(long, env = "OCR_PROMPT")]
    prompt: Option<String>,

    /// Save the first page (as sent to the model) to this PNG file.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OCR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Longest edge of rendered PDF pages in pixels.
    #[arg(long, env = "OCR_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(100..=10000))]
    max_pixels: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OCR_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Recognition call timeout in seconds (unset waits for the transport).
    #[arg(long, env = "OCR_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Output structured JSON (ExtractionOutput) instead of plain text.
    #[arg(long, env = "OCR_JSON")]
    json: bool,

    /// Print page count and first-page size only, no recognition.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the spinner.
    #[arg(long, env = "OCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the text and errors.
    #[arg(short, long, env = "OCR_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Keep library logs out of the way while the spinner is drawn.
    let show_spinner = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_spinner {
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

    let observer = CliObserver::new(&cli);
    let config = build_config(&cli, Arc::clone(&observer))?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect input")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
            );
        } else {
            println!("File:         {}", info.file_name);
            println!("Type:         {}", info.media_type);
            println!("Size:         {} bytes", info.size_bytes);
            println!("Pages:        {}", info.page_count);
            println!(
                "First page:   {}×{} px",
                info.first_page_dimensions.0, info.first_page_dimensions.1
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    // The credential is checked before the input is touched.
    config
        .resolve_api_key()
        .context("Set GOOGLE_API_KEY (or GEMINI_API_KEY), or pass --api-key")?;

    // ── Run extraction ───────────────────────────────────────────────────
    let result = match cli.output {
        Some(ref path) => extract_to_file(&cli.input, path, &config).await,
        None => extract(&cli.input, &config).await,
    };

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            // Intake errors happen before a session exists.
            if !observer.failure_shown() {
                observer.show_failure(&e);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if let Some(ref path) = cli.output {
        if !cli.quiet {
            eprintln!(
                "{}  {} chars  {}ms  →  {}",
                green("✔"),
                output.text.chars().count(),
                output.stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
    }

    if !cli.quiet && !cli.json {
        let tokens = match (output.stats.input_tokens, output.stats.output_tokens) {
            (Some(i), Some(o)) => format!("{i} tokens in  /  {o} tokens out  ·  "),
            _ => String::new(),
        };
        eprintln!(
            "   {}",
            dim(&format!("{tokens}{}ms total", output.stats.total_duration_ms))
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, observer: Arc<CliObserver>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .model(&cli.model)
        .endpoint(&cli.endpoint)
        .max_rendered_pixels(cli.max_pixels)
        .download_timeout_secs(cli.download_timeout)
        .observer(observer);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref prompt) = cli.prompt {
        builder = builder.prompt(prompt);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }

    builder.build().context("Invalid configuration")
}
