//! Configuration types for the OCR client.
//!
//! All client behaviour is controlled through [`OcrConfig`], built via
//! [`OcrConfigBuilder`]. Keeping every knob in one immutable struct makes it
//! trivial to share a client across tasks and to diff two runs to understand
//! why their outputs differ.
//!
//! Settings are layered the way the SDK's users expect: builder setters
//! override environment variables, which override the built-in defaults.
//! [`OcrConfigBuilder::from_env`] seeds a builder from `PAGELENS_*` variables;
//! plain [`OcrConfig::builder`] ignores the environment entirely.

use crate::error::OcrError;
use crate::prompts::OcrMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// DPI values accepted by the OCR endpoint.
///
/// The model is trained on renders at these densities; other values degrade
/// recognition enough that the original service rejects them outright.
pub const ALLOWED_DPI: [u32; 3] = [150, 200, 300];

/// Default page separator joining per-page text into one document string.
pub const DEFAULT_PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Immutable per-client settings for [`crate::OcrClient`].
///
/// Built via [`OcrConfig::builder()`] or [`OcrConfig::from_env()`].
///
/// # Example
/// ```rust
/// use pagelens::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .api_key("sk-test")
///     .dpi(300)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Bearer token sent with every request.
    pub api_key: String,

    /// Full chat-completions endpoint URL.
    pub base_url: String,

    /// Model identifier placed in the request payload.
    pub model_name: String,

    /// Per-request timeout. A timed-out attempt fails immediately; it is
    /// never retried by the dispatcher.
    pub timeout: Duration,

    /// Maximum tokens the model may generate per page.
    pub max_tokens: u32,

    /// Sampling temperature. 0.0 keeps the model deterministic, which is
    /// what transcription wants.
    pub temperature: f32,

    /// Minimum spacing between any two outbound requests from this client.
    /// Zero disables pacing. Raise this if the provider keeps returning 429.
    pub request_delay: Duration,

    /// Whether HTTP 429 responses are retried with exponential backoff.
    pub enable_rate_limit_retry: bool,

    /// Maximum number of 429 retries before giving up.
    pub max_rate_limit_retries: u32,

    /// Base backoff delay; retry `n` waits `rate_limit_retry_delay * 2^n`.
    pub rate_limit_retry_delay: Duration,

    /// Rendering DPI for PDF pages. Must be one of [`ALLOWED_DPI`].
    /// 200 is the recommended balance of sharpness and payload size.
    pub dpi: u32,

    /// Re-run a page with [`OcrConfig::fallback_mode`] when the fast mode's
    /// output is shorter than [`OcrConfig::min_output_threshold`].
    pub fallback_enabled: bool,

    /// Mode used for the quality fallback pass.
    pub fallback_mode: OcrMode,

    /// Minimum first-pass output length (in characters) below which the
    /// fallback kicks in.
    pub min_output_threshold: usize,

    /// Literal string joining per-page text into the final document.
    pub page_separator: String,

    /// Number of pages processed in flight at once. 1 = strictly sequential.
    /// The rate limiter still paces the actual network calls, so this bounds
    /// in-flight requests without bypassing `request_delay`.
    pub concurrency: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.siliconflow.cn/v1/chat/completions".to_string(),
            model_name: "deepseek-ai/DeepSeek-OCR".to_string(),
            timeout: Duration::from_secs(60),
            max_tokens: 4000,
            temperature: 0.0,
            request_delay: Duration::ZERO,
            enable_rate_limit_retry: true,
            max_rate_limit_retries: 3,
            rate_limit_retry_delay: Duration::from_secs(5),
            dpi: 200,
            fallback_enabled: true,
            fallback_mode: OcrMode::Grounding,
            min_output_threshold: 500,
            page_separator: DEFAULT_PAGE_SEPARATOR.to_string(),
            concurrency: 1,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model_name", &self.model_name)
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("request_delay", &self.request_delay)
            .field("enable_rate_limit_retry", &self.enable_rate_limit_retry)
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .field("rate_limit_retry_delay", &self.rate_limit_retry_delay)
            .field("dpi", &self.dpi)
            .field("fallback_enabled", &self.fallback_enabled)
            .field("fallback_mode", &self.fallback_mode)
            .field("min_output_threshold", &self.min_output_threshold)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder seeded with the built-in defaults.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a config from `PAGELENS_*` environment variables.
    pub fn from_env() -> Result<OcrConfig, OcrError> {
        OcrConfigBuilder::from_env()?.build()
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    /// Seed a builder from the environment. Recognised variables:
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `PAGELENS_API_KEY` | `api_key` |
    /// | `PAGELENS_BASE_URL` | `base_url` |
    /// | `PAGELENS_MODEL` | `model_name` |
    /// | `PAGELENS_TIMEOUT` | `timeout` (seconds, integer) |
    /// | `PAGELENS_MAX_TOKENS` | `max_tokens` |
    /// | `PAGELENS_TEMPERATURE` | `temperature` |
    /// | `PAGELENS_REQUEST_DELAY` | `request_delay` (seconds, fractional) |
    /// | `PAGELENS_ENABLE_RATE_LIMIT_RETRY` | `enable_rate_limit_retry` |
    /// | `PAGELENS_MAX_RATE_LIMIT_RETRIES` | `max_rate_limit_retries` |
    /// | `PAGELENS_RATE_LIMIT_RETRY_DELAY` | `rate_limit_retry_delay` (seconds, fractional) |
    /// | `PAGELENS_DPI` | `dpi` |
    /// | `PAGELENS_FALLBACK_ENABLED` | `fallback_enabled` |
    /// | `PAGELENS_FALLBACK_MODE` | `fallback_mode` |
    /// | `PAGELENS_MIN_OUTPUT_THRESHOLD` | `min_output_threshold` |
    /// | `PAGELENS_PAGE_SEPARATOR` | `page_separator` |
    /// | `PAGELENS_CONCURRENCY` | `concurrency` |
    ///
    /// Unset or empty variables leave the default in place; malformed values
    /// are an [`OcrError::InvalidConfig`].
    pub fn from_env() -> Result<Self, OcrError> {
        let mut config = OcrConfig::default();

        if let Some(v) = env_string("PAGELENS_API_KEY") {
            config.api_key = v;
        }
        if let Some(v) = env_string("PAGELENS_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = env_string("PAGELENS_MODEL") {
            config.model_name = v;
        }
        if let Some(v) = env_parse::<u64>("PAGELENS_TIMEOUT")? {
            config.timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u32>("PAGELENS_MAX_TOKENS")? {
            config.max_tokens = v;
        }
        if let Some(v) = env_parse::<f32>("PAGELENS_TEMPERATURE")? {
            config.temperature = v;
        }
        if let Some(v) = env_secs("PAGELENS_REQUEST_DELAY")? {
            config.request_delay = v;
        }
        if let Some(v) = env_bool("PAGELENS_ENABLE_RATE_LIMIT_RETRY") {
            config.enable_rate_limit_retry = v;
        }
        if let Some(v) = env_parse::<u32>("PAGELENS_MAX_RATE_LIMIT_RETRIES")? {
            config.max_rate_limit_retries = v;
        }
        if let Some(v) = env_secs("PAGELENS_RATE_LIMIT_RETRY_DELAY")? {
            config.rate_limit_retry_delay = v;
        }
        if let Some(v) = env_parse::<u32>("PAGELENS_DPI")? {
            config.dpi = v;
        }
        if let Some(v) = env_bool("PAGELENS_FALLBACK_ENABLED") {
            config.fallback_enabled = v;
        }
        if let Some(v) = env_string("PAGELENS_FALLBACK_MODE") {
            config.fallback_mode = v.parse()?;
        }
        if let Some(v) = env_parse::<usize>("PAGELENS_MIN_OUTPUT_THRESHOLD")? {
            config.min_output_threshold = v;
        }
        if let Some(v) = env_string("PAGELENS_PAGE_SEPARATOR") {
            config.page_separator = v;
        }
        if let Some(v) = env_parse::<usize>("PAGELENS_CONCURRENCY")? {
            config.concurrency = v;
        }

        Ok(Self { config })
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.config.model_name = model.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.config.request_delay = delay;
        self
    }

    pub fn enable_rate_limit_retry(mut self, enabled: bool) -> Self {
        self.config.enable_rate_limit_retry = enabled;
        self
    }

    pub fn max_rate_limit_retries(mut self, n: u32) -> Self {
        self.config.max_rate_limit_retries = n;
        self
    }

    pub fn rate_limit_retry_delay(mut self, delay: Duration) -> Self {
        self.config.rate_limit_retry_delay = delay;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.config.fallback_enabled = enabled;
        self
    }

    pub fn fallback_mode(mut self, mode: OcrMode) -> Self {
        self.config.fallback_mode = mode;
        self
    }

    pub fn min_output_threshold(mut self, chars: usize) -> Self {
        self.config.min_output_threshold = chars;
        self
    }

    pub fn page_separator(mut self, sep: impl Into<String>) -> Self {
        self.config.page_separator = sep.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.api_key.is_empty() {
            return Err(OcrError::InvalidConfig(
                "API key is required. Set PAGELENS_API_KEY or pass api_key.".into(),
            ));
        }
        if c.base_url.is_empty() {
            return Err(OcrError::InvalidConfig("base_url must not be empty".into()));
        }
        if c.timeout.is_zero() {
            return Err(OcrError::InvalidConfig("timeout must be > 0".into()));
        }
        if c.max_tokens == 0 {
            return Err(OcrError::InvalidConfig("max_tokens must be > 0".into()));
        }
        if !ALLOWED_DPI.contains(&c.dpi) {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be one of {:?}, got {}. 200 is the recommended balance.",
                ALLOWED_DPI, c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(OcrError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Env helpers (shared with the VLM flavor) ─────────────────────────────

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, OcrError>
where
    T::Err: fmt::Display,
{
    match env_string(key) {
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| OcrError::InvalidConfig(format!("{key}: {e}"))),
        None => Ok(None),
    }
}

pub(crate) fn env_secs(key: &str) -> Result<Option<Duration>, OcrError> {
    match env_parse::<f64>(key)? {
        Some(secs) if secs < 0.0 => Err(OcrError::InvalidConfig(format!(
            "{key} must be ≥ 0, got {secs}"
        ))),
        Some(secs) => Ok(Some(Duration::from_secs_f64(secs))),
        None => Ok(None),
    }
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
}

// ── Page selection ───────────────────────────────────────────────────────

/// Which pages of a document to process. All variants are 1-indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process every page (default).
    #[default]
    All,
    /// Process a single page.
    Single(usize),
    /// Process a contiguous inclusive range.
    Range(usize, usize),
    /// Process specific pages in the order given; duplicates are dropped
    /// keeping the first occurrence.
    Set(Vec<usize>),
}

impl PageSelection {
    /// Resolve the selection against a document with `total_pages` pages,
    /// returning 0-indexed page numbers in selection order.
    ///
    /// Out-of-range pages and an empty `Set` are errors — silently skipping
    /// a requested page would return a document the caller did not ask for.
    pub fn resolve(&self, total_pages: usize) -> Result<Vec<usize>, OcrError> {
        let check = |p: usize| -> Result<usize, OcrError> {
            if p < 1 || p > total_pages {
                Err(OcrError::FileProcessing(format!(
                    "Page {p} out of range. Page numbers are 1-indexed (valid range: 1 to {total_pages})"
                )))
            } else {
                Ok(p - 1)
            }
        };

        match self {
            PageSelection::All => Ok((0..total_pages).collect()),
            PageSelection::Single(p) => Ok(vec![check(*p)?]),
            PageSelection::Range(start, end) => {
                if start > end {
                    return Err(OcrError::FileProcessing(format!(
                        "Invalid page range {start}-{end}: start must not exceed end"
                    )));
                }
                let s = check(*start)?;
                let e = check(*end)?;
                Ok((s..=e).collect())
            }
            PageSelection::Set(pages) => {
                if pages.is_empty() {
                    return Err(OcrError::FileProcessing(
                        "Pages list cannot be empty. Use PageSelection::All to process all pages."
                            .into(),
                    ));
                }
                let mut seen = std::collections::HashSet::new();
                let mut indices = Vec::with_capacity(pages.len());
                for &p in pages {
                    let idx = check(p)?;
                    if seen.insert(idx) {
                        indices.push(idx);
                    }
                }
                Ok(indices)
            }
        }
    }
}
