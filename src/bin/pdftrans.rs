//! CLI binary for edgequake-pdf-translate.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TranslationConfig`, wires the Google provider and optional storage, and
//! turns the result into an exit code.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf_translate::{
    GoogleTranslate, HttpObjectStore, JsonlMetadataStore, MismatchPolicy, OutputMode, Pipeline,
    PipelineResult, ProgressCallback, ResponseKind, TranslateError, TranslationConfig,
    TranslationProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner until the block count is known,
/// then a bar advanced once per finished block.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_blocks: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} blocks  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_blocks as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Translating");
        self.bar.reset_eta();
    }

    fn on_block_start(&self, page_index: usize, block_index: usize) {
        self.bar
            .set_message(format!("page {} block {}", page_index + 1, block_index));
    }

    fn on_block_complete(&self, _page_index: usize, _block_index: usize, _translated_len: usize) {
        self.bar.inc(1);
    }

    fn on_block_error(&self, page_index: usize, block_index: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3} block {:<3}  {}",
            red("✗"),
            page_index + 1,
            block_index,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _total_blocks: usize, _translated: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # English PDF to a Vietnamese DOCX in ./docs
  pdftrans report.pdf

  # Keep the layout: French text on a toggleable layer
  pdftrans --to fr --mode overlay report.pdf

  # Japanese source, translate from a URL, write elsewhere
  pdftrans --from ja --to en -o out/ https://example.com/paper.pdf

  # Skip blocks in other languages instead of stopping
  pdftrans --collect-warnings mixed.pdf

  # Upload the result and keep a record of every file
  pdftrans --upload-url https://files.example.com/translated \
           --records files.jsonl report.pdf

EXIT CODES:
  0   translated
  1   internal error (disk, bug)
  2   language mismatch: fix the document or --from
  3   translation or detection service failed: retry later
  4   unsupported file: abandon
  64  bad arguments

ENVIRONMENT VARIABLES:
  GOOGLE_TRANSLATE_API_KEY  Cloud Translation API key (GCP_API_KEY also accepted)
  PDFTRANS_*                Every flag has an env fallback, see --help
  RUST_LOG                  Override log filter (e.g. edgequake_pdf_translate=debug)
"#;

/// Translate PDF files and URLs into DOCX or layered PDF.
#[derive(Parser, Debug)]
#[command(
    name = "pdftrans",
    version,
    about = "Translate PDF files and URLs into DOCX or layered PDF",
    long_about = "Translate PDF documents (local files or URLs) block by block. Every block is \
checked against the source language first. Output is either a DOCX that keeps each block's font, \
or the original PDF with translations drawn on a toggleable layer.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Expected language of the document (code or name).
    #[arg(short = 's', long = "from", env = "PDFTRANS_SOURCE", default_value = "en")]
    source: String,

    /// Language to translate into (code or name).
    #[arg(short = 't', long = "to", env = "PDFTRANS_TARGET", default_value = "vi")]
    target: String,

    /// Output form: flow (.docx) or overlay (.pdf).
    #[arg(short, long, env = "PDFTRANS_MODE", value_enum, default_value = "flow")]
    mode: ModeArg,

    /// Directory for translated documents.
    #[arg(short, long, env = "PDFTRANS_OUTPUT_DIR", default_value = "docs")]
    output_dir: PathBuf,

    /// Cloud Translation API key.
    #[arg(long, env = "GOOGLE_TRANSLATE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Cloud Translation v2 base URL.
    #[arg(long, env = "PDFTRANS_ENDPOINT")]
    endpoint: Option<String>,

    /// Characters per translation request.
    #[arg(long, env = "PDFTRANS_MAX_CHARS", default_value_t = 5000)]
    max_chars: usize,

    /// Blocks validated and translated at once.
    #[arg(short, long, env = "PDFTRANS_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Leave out blocks in another language and report them, instead of stopping.
    #[arg(long, env = "PDFTRANS_COLLECT_WARNINGS")]
    collect_warnings: bool,

    /// Upload results with PUT to this base URL.
    #[arg(long, env = "PDFTRANS_UPLOAD_URL")]
    upload_url: Option<String>,

    /// Bearer token for --upload-url.
    #[arg(long, env = "PDFTRANS_UPLOAD_TOKEN", hide_env_values = true)]
    upload_token: Option<String>,

    /// Append a JSON record per source and output file to this file.
    #[arg(long, env = "PDFTRANS_RECORDS")]
    records: Option<PathBuf>,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "PDFTRANS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFTRANS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFTRANS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFTRANS_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFTRANS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call detection and translation timeout in seconds.
    #[arg(long, env = "PDFTRANS_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Flow,
    Overlay,
}

impl From<ModeArg> for OutputMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Flow => OutputMode::Flow,
            ModeArg::Overlay => OutputMode::Overlay,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v is given.
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

    let code = match run(&cli, show_progress).await {
        Ok(kind) => kind.exit_code(),
        Err(err) => {
            eprintln!("{} {:#}", red("error:"), err);
            err.downcast_ref::<TranslateError>()
                .map(|e| e.response_kind())
                .unwrap_or(ResponseKind::InvalidRequest)
                .exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: &Cli, show_progress: bool) -> Result<ResponseKind> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn TranslationProgressCallback>)
    } else {
        None
    };
    let config = build_config(cli, progress)?;
    let pipeline = build_pipeline(cli, &config)?;

    let result = pipeline.process(&cli.input, &config).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        print_summary(&result);
    }
    Ok(result.response_kind())
}

/// Map CLI args to `TranslationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranslationConfig> {
    let policy = if cli.collect_warnings {
        MismatchPolicy::CollectWarnings
    } else {
        MismatchPolicy::FailFast
    };
    let mut builder = TranslationConfig::builder()
        .source_language(&cli.source)
        .target_language(&cli.target)
        .output_mode(cli.mode.into())
        .output_dir(&cli.output_dir)
        .max_chars(cli.max_chars)
        .concurrency(cli.concurrency)
        .mismatch_policy(policy)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    Ok(builder.build()?)
}

fn build_pipeline(cli: &Cli, config: &TranslationConfig) -> Result<Pipeline> {
    let api_key = cli
        .api_key
        .clone()
        .or_else(|| std::env::var("GCP_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            TranslateError::InvalidConfig(
                "no API key: set GOOGLE_TRANSLATE_API_KEY or pass --api-key".to_string(),
            )
        })?;

    let timeout = Duration::from_secs(config.api_timeout_secs);
    let mut google = GoogleTranslate::new(api_key, timeout)?;
    if let Some(endpoint) = &cli.endpoint {
        google = google.with_endpoint(endpoint);
    }
    let google = Arc::new(google);
    let mut pipeline = Pipeline::new(google.clone(), google);

    if let Some(url) = &cli.upload_url {
        let mut store = HttpObjectStore::new(url, Duration::from_secs(config.download_timeout_secs))
            .context("Failed to set up upload client")?;
        if let Some(token) = &cli.upload_token {
            store = store.with_bearer_token(token);
        }
        pipeline = pipeline.with_object_store(Arc::new(store));
    }
    if let Some(path) = &cli.records {
        pipeline = pipeline.with_metadata_store(Arc::new(JsonlMetadataStore::new(path)));
    }
    Ok(pipeline)
}

fn print_summary(result: &PipelineResult) {
    match result {
        PipelineResult::Success {
            output_path,
            cloud_url,
            warnings,
            storage_errors,
            stats,
        } => {
            eprintln!(
                "{}  {}/{} blocks  {} pages  {}ms  →  {}",
                green("✔"),
                stats.blocks_translated,
                stats.blocks_total,
                stats.pages,
                stats.duration_ms,
                bold(&output_path.display().to_string()),
            );
            if let Some(url) = cloud_url {
                eprintln!("   uploaded to {}", dim(url));
            }
            if stats.layout_skipped > 0 {
                eprintln!(
                    "   {} {} blocks did not fit their box and were left blank",
                    yellow("⚠"),
                    stats.layout_skipped
                );
            }
            for w in warnings {
                eprintln!("   {} skipped: {}", yellow("⚠"), w);
            }
            for e in storage_errors {
                eprintln!("   {} {}", yellow("⚠"), e);
            }
        }
        PipelineResult::Failure { warnings } => {
            for w in warnings {
                eprintln!("{} {}", red("✘"), w);
            }
            eprintln!(
                "   {}",
                dim("Nothing was written. Check the document or pass the right --from language.")
            );
        }
    }
}
