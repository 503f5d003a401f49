//! The OCR client: document → pages → dispatcher → assembled text.
//!
//! [`OcrClient::parse`] is the primary entry point. It renders the selected
//! pages, runs each through the rate-limited dispatcher, applies the per-page
//! quality fallback, and joins the cleaned page texts with the configured
//! separator.
//!
//! ## Execution strategies
//!
//! `concurrency = 1` (the default) processes pages strictly one at a time.
//! Higher values fan pages out with bounded parallelism via
//! `futures::stream::buffered`, which yields results in input order no matter
//! which request finishes first — so both strategies produce byte-identical
//! output. The rate limiter paces the actual network calls either way;
//! concurrency only bounds how many requests are in flight.
//!
//! ## Failure policy
//!
//! Any page's unrecoverable failure fails the whole document — a silently
//! truncated document is worse than an error. The one exception is the
//! fallback pass: a failed fallback keeps the first-pass text and is only
//! logged, because a quality upgrade must never turn a successful page into
//! a document failure.

use crate::config::{OcrConfig, ALLOWED_DPI};
use crate::error::OcrError;
use crate::output::{PageResult, ParseOutput, ParseStats};
use crate::pipeline::clean;
use crate::pipeline::dispatch::{ChatMessage, ChatRequest, ChatResponse, Dispatcher, TokenUsage};
use crate::pipeline::render;
use crate::prompts::OcrMode;
use crate::{config::PageSelection, limiter::RateLimiter};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-call options for [`OcrClient::parse`].
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// OCR mode for the first pass. Default: [`OcrMode::FreeOcr`].
    pub mode: OcrMode,
    /// DPI override for this call. Must be one of [`ALLOWED_DPI`];
    /// `None` uses the configured DPI.
    pub dpi: Option<u32>,
    /// Which pages to process. Default: all.
    pub pages: PageSelection,
    /// Timeout override for this call's requests. `None` uses the configured
    /// timeout.
    pub timeout: Option<Duration>,
}

impl ParseOptions {
    /// Options with everything default except the mode.
    pub fn with_mode(mode: OcrMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Client for a vision-language OCR endpoint.
///
/// # Example
/// ```rust,no_run
/// use pagelens::{OcrClient, OcrConfig, ParseOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = OcrClient::new(OcrConfig::builder().api_key("sk-…").build()?)?;
///     let text = client.parse("document.pdf", ParseOptions::default()).await?;
///     println!("{text}");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct OcrClient {
    config: OcrConfig,
    dispatcher: Dispatcher,
}

impl OcrClient {
    /// Create a client from a validated configuration.
    pub fn new(config: OcrConfig) -> Result<Self, OcrError> {
        let limiter = RateLimiter::new(
            config.request_delay,
            config.max_rate_limit_retries,
            config.rate_limit_retry_delay,
        );
        let dispatcher = Dispatcher::new(limiter, config.enable_rate_limit_retry)?;
        info!("Initialized OCR client with model: {}", config.model_name);
        Ok(Self { config, dispatcher })
    }

    /// Create a client from `PAGELENS_*` environment variables.
    pub fn from_env() -> Result<Self, OcrError> {
        Self::new(OcrConfig::from_env()?)
    }

    /// The client's configuration. Immutable for the client's lifetime.
    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Parse a document and return its text.
    ///
    /// Shorthand for [`OcrClient::parse_detailed`] when only the joined text
    /// is needed.
    pub async fn parse(
        &self,
        path: impl AsRef<Path>,
        options: ParseOptions,
    ) -> Result<String, OcrError> {
        self.parse_detailed(path, options).await.map(|o| o.text)
    }

    /// Parse a document, returning per-page results and usage counters.
    ///
    /// # Errors
    /// - [`OcrError::InvalidConfig`] — DPI override outside [`ALLOWED_DPI`]
    /// - [`OcrError::FileProcessing`] — missing file, empty document, bad
    ///   page selection
    /// - [`OcrError::Timeout`] / [`OcrError::RateLimited`] /
    ///   [`OcrError::Api`] — any page's dispatch failing; no partial
    ///   document is returned
    pub async fn parse_detailed(
        &self,
        path: impl AsRef<Path>,
        options: ParseOptions,
    ) -> Result<ParseOutput, OcrError> {
        let path = path.as_ref();
        let dpi = match options.dpi {
            Some(d) if !ALLOWED_DPI.contains(&d) => {
                return Err(OcrError::InvalidConfig(format!(
                    "DPI must be one of {ALLOWED_DPI:?}, got {d}"
                )));
            }
            Some(d) => d,
            None => self.config.dpi,
        };

        info!(
            "Processing {} with mode={} and dpi={}",
            path.display(),
            options.mode,
            dpi
        );
        let images = render::file_to_base64(path, dpi, &options.pages).await?;
        info!("Converted to {} page image(s)", images.len());

        let output = self.parse_images(&images, &options).await?;
        info!(
            "Successfully processed {}: {} page(s), {} chars",
            path.display(),
            output.pages.len(),
            output.text.chars().count()
        );
        Ok(output)
    }

    /// Run pre-rendered page images through the OCR pipeline.
    ///
    /// `images` are base64-encoded PNGs, one per page, in page order — the
    /// format produced by the rendering stage. This is the entry point for
    /// callers that already hold page images (or render them elsewhere).
    pub async fn parse_images(
        &self,
        images: &[String],
        options: &ParseOptions,
    ) -> Result<ParseOutput, OcrError> {
        let start = Instant::now();
        let total = images.len();
        let timeout = options.timeout.unwrap_or(self.config.timeout);

        let pages: Vec<PageResult> = if self.config.concurrency <= 1 {
            let mut out = Vec::with_capacity(total);
            for (i, image) in images.iter().enumerate() {
                out.push(
                    self.process_page(i + 1, total, image, options.mode, timeout)
                        .await?,
                );
            }
            out
        } else {
            // `buffered` keeps input order regardless of completion order;
            // `try_collect` fails the whole document on the first page error,
            // dropping in-flight siblings.
            stream::iter(
                images
                    .iter()
                    .enumerate()
                    .map(|(i, image)| self.process_page(i + 1, total, image, options.mode, timeout)),
            )
            .buffered(self.config.concurrency)
            .try_collect()
            .await?
        };

        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.config.page_separator);

        let stats = ParseStats {
            pages_processed: pages.len(),
            fallback_pages: pages.iter().filter(|p| p.fallback_applied).count(),
            prompt_tokens: pages
                .iter()
                .filter_map(|p| p.usage.and_then(|u| u.prompt_tokens))
                .sum(),
            completion_tokens: pages
                .iter()
                .filter_map(|p| p.usage.and_then(|u| u.completion_tokens))
                .sum(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        Ok(ParseOutput { text, pages, stats })
    }

    /// Synchronous wrapper around [`OcrClient::parse`].
    ///
    /// Creates a temporary Tokio runtime internally; do not call from within
    /// an async context.
    pub fn parse_sync(
        &self,
        path: impl AsRef<Path>,
        options: ParseOptions,
    ) -> Result<String, OcrError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.parse(path, options))
    }

    /// Process one page: first pass, optional fallback pass, cleaning.
    async fn process_page(
        &self,
        page_num: usize,
        total: usize,
        image_b64: &str,
        mode: OcrMode,
        timeout: Duration,
    ) -> Result<PageResult, OcrError> {
        let start = Instant::now();
        debug!("Processing page {page_num}/{total}");

        let response = self.request_page(image_b64, mode, timeout).await?;
        if response.choices.is_empty() {
            return Err(OcrError::Api {
                status: 200,
                body: "Invalid API response: no choices returned".to_string(),
            });
        }

        let mut text = clean::clean_output(response.content().unwrap_or_default());
        let mut usage = response.usage;
        let mut mode_used = mode;
        let mut fallback_applied = false;

        // Quality gate: only the fast default mode falls back, and only once.
        if self.config.fallback_enabled
            && mode == OcrMode::FreeOcr
            && text.chars().count() < self.config.min_output_threshold
        {
            warn!(
                "Page {page_num} output too short ({} chars), falling back to {}",
                text.chars().count(),
                self.config.fallback_mode
            );
            match self
                .request_page(image_b64, self.config.fallback_mode, timeout)
                .await
            {
                Ok(fb) if !fb.choices.is_empty() => {
                    text = clean::clean_output(fb.content().unwrap_or_default());
                    usage = merge_usage(usage, fb.usage);
                    mode_used = self.config.fallback_mode;
                    fallback_applied = true;
                    info!(
                        "Page {page_num} fallback successful: {} chars",
                        text.chars().count()
                    );
                }
                Ok(_) => {
                    warn!("Page {page_num} fallback returned no choices, using original result");
                }
                Err(e) => {
                    // Fallback is strictly best-effort: the first-pass text
                    // stands and the error stops here.
                    warn!("Page {page_num} fallback failed: {e}, using original result");
                }
            }
        }

        Ok(PageResult {
            page_num,
            text,
            mode_used,
            fallback_applied,
            usage,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// One dispatcher call for one page image with the prompt for `mode`.
    async fn request_page(
        &self,
        image_b64: &str,
        mode: OcrMode,
        timeout: Duration,
    ) -> Result<ChatResponse, OcrError> {
        let payload = ChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![ChatMessage::user_page(image_b64, mode.prompt())],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        self.dispatcher
            .send(&self.config.base_url, &self.config.api_key, &payload, timeout)
            .await
    }
}

fn merge_usage(a: Option<TokenUsage>, b: Option<TokenUsage>) -> Option<TokenUsage> {
    match (a, b) {
        (Some(a), Some(b)) => Some(TokenUsage {
            prompt_tokens: sum_opt(a.prompt_tokens, b.prompt_tokens),
            completion_tokens: sum_opt(a.completion_tokens, b.completion_tokens),
            total_tokens: sum_opt(a.total_tokens, b.total_tokens),
        }),
        (a, b) => a.or(b),
    }
}

fn sum_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> OcrClient {
        OcrClient::new(
            OcrConfig::builder()
                .api_key("test_key")
                .base_url("http://test.invalid")
                .build()
                .unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn dpi_override_is_validated_before_touching_the_file() {
        let client = test_client();
        let err = client
            .parse(
                "/definitely/not/here.pdf",
                ParseOptions {
                    dpi: Some(72),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        // DPI failure, not file-not-found: validation runs first.
        assert!(matches!(err, OcrError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn empty_image_list_yields_empty_document() {
        let client = test_client();
        let output = client
            .parse_images(&[], &ParseOptions::default())
            .await
            .unwrap();
        assert_eq!(output.text, "");
        assert!(output.pages.is_empty());
        assert_eq!(output.stats.pages_processed, 0);
    }

    #[test]
    fn merge_usage_sums_fields() {
        let a = TokenUsage {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: Some(15),
        };
        let b = TokenUsage {
            prompt_tokens: Some(20),
            completion_tokens: None,
            total_tokens: Some(20),
        };
        let merged = merge_usage(Some(a), Some(b)).unwrap();
        assert_eq!(merged.prompt_tokens, Some(30));
        assert_eq!(merged.completion_tokens, Some(5));
        assert_eq!(merged.total_tokens, Some(35));

        assert!(merge_usage(None, None).is_none());
        assert_eq!(merge_usage(Some(a), None).unwrap().prompt_tokens, Some(10));
    }

    #[test]
    fn with_mode_sets_only_the_mode() {
        let opts = ParseOptions::with_mode(OcrMode::Grounding);
        assert_eq!(opts.mode, OcrMode::Grounding);
        assert!(opts.dpi.is_none());
        assert_eq!(opts.pages, PageSelection::All);
    }
}
