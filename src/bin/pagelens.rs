//! pagelens CLI: OCR documents from the command line.
//!
//! Single file → text on stdout (or `-o FILE`). Multiple files → batch mode
//! with per-document isolation; each output lands next to its input as
//! `<stem>.md` (or inside `-o DIR`).

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pagelens::{
    BatchProcessor, OcrClient, OcrConfigBuilder, OcrMode, PageSelection, ParseOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pagelens",
    version,
    about = "OCR documents with a vision-language model API",
    after_help = "Environment: PAGELENS_API_KEY, PAGELENS_BASE_URL, PAGELENS_MODEL, …\n\
                  (every config knob has a PAGELENS_* variable; flags win over env)"
)]
struct Cli {
    /// Input files (PDF or image). More than one enables batch mode.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// API key (falls back to PAGELENS_API_KEY).
    #[arg(long, env = "PAGELENS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat-completions endpoint URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Model identifier.
    #[arg(long)]
    model: Option<String>,

    /// OCR mode: free_ocr, grounding, or ocr_image.
    #[arg(long, default_value = "free_ocr")]
    mode: OcrMode,

    /// Rendering DPI (150, 200, or 300).
    #[arg(long)]
    dpi: Option<u32>,

    /// Pages to process: "3", "2-7", or "1,3,5". Default: all.
    #[arg(long)]
    pages: Option<String>,

    /// Output file (single input) or directory (batch mode).
    /// Default: stdout for a single input, "<stem>.md" next to each input in
    /// batch mode.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pages processed in flight per document.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Minimum seconds between requests (fractional allowed).
    #[arg(long)]
    request_delay: Option<f64>,

    /// Maximum retries on HTTP 429.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Disable the per-page quality fallback.
    #[arg(long)]
    no_fallback: bool,

    /// Documents processed in flight in batch mode.
    #[arg(long, default_value_t = 3)]
    batch_concurrency: usize,

    /// Whole-document retries per file in batch mode.
    #[arg(long, default_value_t = 1)]
    batch_retries: u32,

    /// Verbose logging (-v: info, -vv: debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "pagelens=warn",
        1 => "pagelens=info",
        _ => "pagelens=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

/// Parse "3", "2-7", or "1,3,5" into a page selection.
fn parse_page_selection(spec: &str) -> Result<PageSelection> {
    let spec = spec.trim();
    if let Some((start, end)) = spec.split_once('-') {
        let start: usize = start.trim().parse().context("invalid range start")?;
        let end: usize = end.trim().parse().context("invalid range end")?;
        return Ok(PageSelection::Range(start, end));
    }
    if spec.contains(',') {
        let pages = spec
            .split(',')
            .map(|p| p.trim().parse::<usize>().context("invalid page number"))
            .collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }
    let page: usize = spec.parse().context("invalid page number")?;
    Ok(PageSelection::Single(page))
}

fn build_client(cli: &Cli) -> Result<OcrClient> {
    let mut builder = OcrConfigBuilder::from_env()?;
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.as_str());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.as_str());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model_name(model.as_str());
    }
    if let Some(dpi) = cli.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(delay) = cli.request_delay {
        builder = builder.request_delay(Duration::from_secs_f64(delay));
    }
    if let Some(n) = cli.max_retries {
        builder = builder.max_rate_limit_retries(n);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if cli.no_fallback {
        builder = builder.fallback_enabled(false);
    }
    Ok(OcrClient::new(builder.build()?)?)
}

fn parse_options(cli: &Cli) -> Result<ParseOptions> {
    let pages = match cli.pages {
        Some(ref spec) => parse_page_selection(spec)?,
        None => PageSelection::All,
    };
    Ok(ParseOptions {
        mode: cli.mode,
        dpi: None, // DPI goes through the config so it is validated once
        pages,
        timeout: None,
    })
}

async fn run_single(client: &OcrClient, cli: &Cli) -> Result<()> {
    let input = &cli.inputs[0];
    let text = client
        .parse(input, parse_options(cli)?)
        .await
        .with_context(|| format!("failed to process {}", input.display()))?;

    match cli.output {
        Some(ref path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

async fn run_batch(client: OcrClient, cli: &Cli) -> Result<()> {
    if cli.pages.is_some() {
        bail!("--pages applies to a single input, not batch mode");
    }
    if let Some(ref out) = cli.output {
        if !out.is_dir() {
            bail!("in batch mode --output must be an existing directory");
        }
    }

    let processor = BatchProcessor::new(Arc::new(client), cli.batch_concurrency, cli.batch_retries);

    let bar = ProgressBar::new_spinner().with_message(format!(
        "Processing {} documents ({} in flight)…",
        cli.inputs.len(),
        cli.batch_concurrency
    ));
    bar.set_style(ProgressStyle::default_spinner());
    bar.enable_steady_tick(Duration::from_millis(120));

    let summary = processor.process_batch(&cli.inputs, cli.mode).await;
    bar.finish_and_clear();

    for result in summary.results.iter().filter(|r| r.succeeded()) {
        let out_path = match cli.output {
            Some(ref dir) => dir.join(result.file_path.file_stem().map_or_else(
                || PathBuf::from("output.md"),
                |stem| PathBuf::from(stem).with_extension("md"),
            )),
            None => result.file_path.with_extension("md"),
        };
        std::fs::write(&out_path, result.text.as_deref().unwrap_or_default())
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        eprintln!("Wrote {}", out_path.display());
    }

    eprint!("{}", summary.report());
    if summary.failed > 0 {
        bail!("{} of {} documents failed", summary.failed, summary.total);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let client = build_client(&cli)?;
    if cli.inputs.len() == 1 {
        run_single(&client, &cli).await
    } else {
        run_batch(client, &cli).await
    }
}
