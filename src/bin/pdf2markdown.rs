//! CLI binary for pdf2markdown.
//!
//! A thin shim over the library crate: reads a PDF or image from stdin (or
//! `--input`), maps flags and environment to `ConversionConfig`, and writes
//! Markdown to stdout (or `--output`). Nothing reaches stdout unless the whole
//! conversion succeeded.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2markdown::convert::write_atomic;
use pdf2markdown::{
    convert_bytes, inspect_bytes, ConversionConfig, ConversionProgressCallback, PageSelection,
    PageSeparator, ProgressCallback, ProviderConfig, SourceFormat,
};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar on stderr plus one log
/// line per page. Pages may complete out of order with `--concurrency > 1`.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// The bar starts as a spinner; `on_conversion_start` sets its length.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.entry(page_num).or_insert_with(Instant::now);
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_retry(&self, page_num: usize, attempt: u32, error: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}  retry {}  {}",
            yellow("↻"),
            page_num,
            attempt,
            dim(&truncate(error, 80)),
        ));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.abandon();
    }

    fn on_conversion_complete(&self, total_pages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages converted",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole document (hosted model, OPENAI_API_KEY set)
  pdf2markdown < document.pdf > document.md

  # Pages 1 through 5
  pdf2markdown 5 < document.pdf

  # Pages 3 through 7, separated by horizontal rules
  pdf2markdown 3 7 --separator hr < document.pdf

  # A scanned page image on a local Ollama server
  pdf2markdown --provider ollama --model llava < scan.png

  # Any edgequake-llm provider
  pdf2markdown --provider anthropic --model claude-sonnet-4-20250514 -i paper.pdf -o paper.md

  # Inspect metadata (no API key needed)
  pdf2markdown --inspect-only < document.pdf

ENVIRONMENT VARIABLES (a .env file in the working directory is loaded):
  PDF2MD_PROVIDER       openai (default), ollama, or an edgequake-llm provider name
  PDF2MD_MODEL          Model for any provider
  OPENAI_API_KEY        Hosted API key
  OPENAI_API_BASE       Hosted base URL (default https://api.openai.com/v1)
  OPENAI_DEFAULT_MODEL  Hosted model (default gpt-4o-mini)
  OLLAMA_BASE_URL       Local base URL (default http://localhost:11434/v1)
  OLLAMA_MODEL          Local model (default llama3.2-vision)
  PDFIUM_LIB_PATH       Path to libpdfium (file or directory); skips the download
  PDFIUM_AUTO_CACHE_DIR Cache directory for the downloaded libpdfium
  RUST_LOG              Log filter, e.g. pdf2markdown=debug
"#;

/// Transcribe PDF pages and images to Markdown with multimodal models.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2markdown",
    version,
    about = "Transcribe PDF pages and images to Markdown with multimodal models",
    long_about = "Reads a PDF, PNG, JPEG or BMP document from stdin, renders each selected page \
to an image, asks a multimodal model to transcribe it, and writes the Markdown to stdout. \
Works with OpenAI-compatible hosted APIs, local Ollama servers, and any edgequake-llm provider.",
    allow_negative_numbers = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// First page (1-based). With only one number given, the last page.
    page_start: Option<i64>,

    /// Last page (1-based, inclusive).
    page_end: Option<i64>,

    /// Read the document from this file instead of stdin.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write Markdown to this file instead of stdout (atomic write).
    #[arg(short, long, env = "PDF2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Provider: openai, ollama, or an edgequake-llm provider name.
    #[arg(long)]
    provider: Option<String>,

    /// Model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Override the provider base URL.
    #[arg(long)]
    base_url: Option<String>,

    /// API key for hosted providers (prefer OPENAI_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDF2MD_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Longest edge of a rendered page, in pixels.
    #[arg(long, env = "PDF2MD_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Pages transcribed at once.
    #[arg(short, long, env = "PDF2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Page separator: none, hr, comment, or a custom string.
    #[arg(long, env = "PDF2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// Extra formatting instructions added to every page prompt.
    #[arg(long, env = "PDF2MD_HINTS")]
    hints: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max output tokens per page (local models are capped at 2048).
    #[arg(long, env = "PDF2MD_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDF2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on transient model failures.
    #[arg(long, env = "PDF2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "PDF2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2MD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Prepend YAML front-matter with document metadata.
    #[arg(long)]
    metadata: bool,

    /// Emit an empty page instead of failing when the model returns nothing.
    #[arg(long)]
    allow_empty_pages: bool,

    /// Skip Markdown post-processing; emit model output as returned.
    #[arg(long)]
    raw: bool,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long)]
    json: bool,

    /// Print document metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is the normal case.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs when it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && io::stderr().is_terminal();
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

    let bytes = read_input(&cli).await?;

    // ── PDF engine ───────────────────────────────────────────────────────
    // Only PDFs need pdfium. On the first run it is downloaded (~30 MB) to
    // the pdfium-auto cache; later runs just check the path.
    if SourceFormat::sniff(&bytes) == Some(SourceFormat::Pdf) && !pdfium_auto::is_pdfium_cached()
    {
        prepare_pdfium(cli.quiet);
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect_bytes(bytes, cli.password.as_deref())
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
            );
        } else {
            println!("Format:       {}", meta.format);
            println!("Pages:        {}", meta.page_count);
            let fields = [
                ("Title", &meta.title),
                ("Author", &meta.author),
                ("Subject", &meta.subject),
                ("Creator", &meta.creator),
                ("Producer", &meta.producer),
                ("Created", &meta.creation_date),
                ("Modified", &meta.modification_date),
            ];
            for (label, value) in fields {
                if let Some(v) = value {
                    println!("{:<13} {}", format!("{label}:"), v);
                }
            }
            if !meta.pdf_version.is_empty() {
                println!("PDF Version:  {}", meta.pdf_version);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert_bytes(bytes, &config)
        .await
        .context("Conversion failed")?;

    let rendered = if cli.json {
        serde_json::to_string_pretty(&output).context("Failed to serialise output")?
    } else {
        output.markdown.clone()
    };

    if let Some(ref path) = cli.output {
        let mut contents = rendered;
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        write_atomic(path, &contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").context("Failed to write to stdout")?;
        }
        handle.flush().context("Failed to write to stdout")?;
    }

    if !cli.quiet {
        let stats = &output.stats;
        let target = cli
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{}  {}/{} pages  {}ms{}",
            green("✔"),
            stats.processed_pages,
            stats.total_pages,
            stats.total_duration_ms,
            target,
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  /  {} retries",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            dim(&stats.total_retries.to_string()),
        );
    }

    Ok(())
}

/// Download pdfium into the cache, with a byte progress bar unless quiet.
///
/// A failed download is not fatal: binding falls back to the system library
/// and reports its own error if that is missing too.
fn prepare_pdfium(quiet: bool) {
    let result = if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
    } else {
        let dl_bar = ProgressBar::new(0);
        dl_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&TICKS),
        );
        dl_bar.set_prefix("PDF engine");
        dl_bar.set_message("Connecting…");
        dl_bar.enable_steady_tick(Duration::from_millis(80));

        let bar = dl_bar.clone();
        let result = tokio::task::block_in_place(|| {
            pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                if let Some(t) = total {
                    if bar.length() != Some(t) {
                        bar.set_length(t);
                    }
                }
                bar.set_position(downloaded);
            }))
        });
        match result {
            Ok(_) => dl_bar.finish_with_message("ready ✓"),
            Err(_) => dl_bar.abandon(),
        }
        result
    };

    if let Err(e) = result {
        tracing::warn!("PDFium download failed ({}), falling back to the system library", e);
    }
}

/// Read the whole document from `--input` or stdin.
async fn read_input(cli: &Cli) -> Result<Vec<u8>> {
    if let Some(ref path) = cli.input {
        return tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()));
    }

    if io::stdin().is_terminal() {
        bail!(
            "No input data received.\n\
             Usage: pdf2markdown [page_start] [page_end] < input.pdf"
        );
    }

    let bytes = tokio::task::spawn_blocking(|| {
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf).map(|_| buf)
    })
    .await
    .context("stdin reader panicked")?
    .context("Failed to read stdin")?;

    Ok(bytes)
}

/// Map CLI args and environment to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let system_prompt = match cli.system_prompt {
        Some(ref path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {}", path.display()))?,
        ),
        None => None,
    };

    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .concurrency(cli.concurrency)
        .provider(provider_config(cli))
        .pages(page_selection(cli.page_start, cli.page_end)?)
        .page_separator(PageSeparator::parse(&cli.separator))
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .include_metadata(cli.metadata)
        .allow_empty_pages(cli.allow_empty_pages)
        .postprocess(!cli.raw);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref hints) = cli.hints {
        builder = builder.hints(hints);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Environment first, then flags on top. `--provider` re-reads the
/// environment as if `PDF2MD_PROVIDER` had been set to its value, so the
/// matching `*_BASE_URL` / `*_MODEL` variables still apply.
fn provider_config(cli: &Cli) -> ProviderConfig {
    let mut provider = match cli.provider {
        Some(ref name) => ProviderConfig::from_lookup(|key| {
            if key == "PDF2MD_PROVIDER" {
                Some(name.clone())
            } else {
                std::env::var(key).ok()
            }
        }),
        None => ProviderConfig::from_env(),
    };

    if let Some(ref model) = cli.model {
        provider.model = Some(model.clone());
    }
    if let Some(ref url) = cli.base_url {
        provider.base_url = Some(url.clone());
    }
    if let Some(ref key) = cli.api_key {
        provider.api_key = Some(key.clone());
    }
    provider
}

/// Positional page arguments: none → all pages, `N` → 1..=N, `S E` → S..=E.
fn page_selection(start: Option<i64>, end: Option<i64>) -> Result<PageSelection> {
    let selection = match (start, end) {
        (None, _) => PageSelection::All,
        (Some(last), None) => PageSelection::from_bounds(1, last)?,
        (Some(first), Some(last)) => PageSelection::from_bounds(first, last)?,
    };
    Ok(selection)
}
