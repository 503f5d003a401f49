//! Generic vision-language client.
//!
//! [`VlmClient`] is the prompt-driven sibling of [`crate::OcrClient`]: the
//! caller supplies the prompt text instead of picking an OCR mode, there is
//! no quality fallback, and DPI is unrestricted (default 72 — higher DPI
//! inflates the image token count quadratically, and past ~200 the model
//! starts rejecting oversized prompts).
//!
//! Both flavors share the same rate limiter and dispatcher core, so pacing,
//! 429 retry, and the error taxonomy behave identically.

use crate::config::{
    env_bool, env_parse, env_secs, env_string, PageSelection, DEFAULT_PAGE_SEPARATOR,
};
use crate::error::OcrError;
use crate::limiter::RateLimiter;
use crate::pipeline::dispatch::{ChatMessage, ChatRequest, ChatResponse, Dispatcher};
use crate::pipeline::render;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Immutable per-client settings for [`VlmClient`].
///
/// Unlike [`crate::OcrConfig`] there is no default endpoint: generic VLM
/// deployments vary, so `base_url` must be provided. A URL ending in `/v1`
/// (OpenAI style) is normalised by appending `chat/completions`.
#[derive(Clone)]
pub struct VlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_name: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_delay: Duration,
    pub enable_rate_limit_retry: bool,
    pub max_rate_limit_retries: u32,
    pub rate_limit_retry_delay: Duration,
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            model_name: "Qwen3-VL-8B".to_string(),
            timeout: Duration::from_secs(60),
            max_tokens: 8192,
            temperature: 0.0,
            request_delay: Duration::ZERO,
            enable_rate_limit_retry: true,
            max_rate_limit_retries: 3,
            rate_limit_retry_delay: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for VlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VlmConfig")
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
            .finish()
    }
}

impl VlmConfig {
    /// Create a new builder seeded with the built-in defaults.
    pub fn builder() -> VlmConfigBuilder {
        VlmConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a config from `PAGELENS_VLM_*` environment variables, falling
    /// back to `PAGELENS_API_KEY` / `PAGELENS_BASE_URL` for the two required
    /// fields.
    pub fn from_env() -> Result<VlmConfig, OcrError> {
        VlmConfigBuilder::from_env()?.build()
    }
}

/// Builder for [`VlmConfig`].
#[derive(Debug)]
pub struct VlmConfigBuilder {
    config: VlmConfig,
}

impl VlmConfigBuilder {
    /// Seed a builder from the environment (`PAGELENS_VLM_*` variables).
    pub fn from_env() -> Result<Self, OcrError> {
        let mut config = VlmConfig::default();

        if let Some(v) =
            env_string("PAGELENS_VLM_API_KEY").or_else(|| env_string("PAGELENS_API_KEY"))
        {
            config.api_key = v;
        }
        if let Some(v) =
            env_string("PAGELENS_VLM_BASE_URL").or_else(|| env_string("PAGELENS_BASE_URL"))
        {
            config.base_url = v;
        }
        if let Some(v) = env_string("PAGELENS_VLM_MODEL") {
            config.model_name = v;
        }
        if let Some(v) = env_parse::<u64>("PAGELENS_VLM_TIMEOUT")? {
            config.timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u32>("PAGELENS_VLM_MAX_TOKENS")? {
            config.max_tokens = v;
        }
        if let Some(v) = env_parse::<f32>("PAGELENS_VLM_TEMPERATURE")? {
            config.temperature = v;
        }
        if let Some(v) = env_secs("PAGELENS_VLM_REQUEST_DELAY")? {
            config.request_delay = v;
        }
        if let Some(v) = env_bool("PAGELENS_VLM_ENABLE_RATE_LIMIT_RETRY") {
            config.enable_rate_limit_retry = v;
        }
        if let Some(v) = env_parse::<u32>("PAGELENS_VLM_MAX_RATE_LIMIT_RETRIES")? {
            config.max_rate_limit_retries = v;
        }
        if let Some(v) = env_secs("PAGELENS_VLM_RATE_LIMIT_RETRY_DELAY")? {
            config.rate_limit_retry_delay = v;
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

    /// Build the configuration, validating constraints and normalising the
    /// endpoint URL.
    pub fn build(self) -> Result<VlmConfig, OcrError> {
        let mut config = self.config;
        if config.api_key.is_empty() {
            return Err(OcrError::InvalidConfig(
                "VLM API key is required. Set PAGELENS_VLM_API_KEY or pass api_key.".into(),
            ));
        }
        if config.base_url.is_empty() {
            return Err(OcrError::InvalidConfig(
                "VLM base_url is required. Set PAGELENS_VLM_BASE_URL or pass base_url.".into(),
            ));
        }
        if config.timeout.is_zero() {
            return Err(OcrError::InvalidConfig("timeout must be > 0".into()));
        }
        if config.max_tokens == 0 {
            return Err(OcrError::InvalidConfig("max_tokens must be > 0".into()));
        }

        // OpenAI-style roots are common; point them at the completions
        // endpoint so callers can pass either form.
        if config.base_url.ends_with("/v1") {
            config.base_url = format!("{}/chat/completions", config.base_url);
        } else if config.base_url.ends_with("/v1/") {
            config.base_url = format!("{}chat/completions", config.base_url);
        }

        Ok(config)
    }
}

/// Per-call options for [`VlmClient::chat_completion`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Model override for this call.
    pub model: Option<String>,
    /// Temperature override for this call.
    pub temperature: Option<f32>,
    /// Max-tokens override for this call.
    pub max_tokens: Option<u32>,
    /// Timeout override for this call.
    pub timeout: Option<Duration>,
}

/// Per-call options for [`VlmClient::parse`].
#[derive(Debug, Clone)]
pub struct VlmParseOptions {
    /// Model override for this call.
    pub model: Option<String>,
    /// Rendering DPI. Unrestricted; higher values cost dramatically more
    /// tokens per page.
    pub dpi: u32,
    /// Which pages to process. Default: all.
    pub pages: PageSelection,
    /// Timeout override for this call.
    pub timeout: Option<Duration>,
}

impl Default for VlmParseOptions {
    fn default() -> Self {
        Self {
            model: None,
            dpi: 72,
            pages: PageSelection::All,
            timeout: None,
        }
    }
}

/// Client for a generic vision-language chat-completion endpoint.
///
/// # Example
/// ```rust,no_run
/// use pagelens::{VlmClient, VlmConfig, VlmParseOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = VlmClient::new(
///         VlmConfig::builder()
///             .api_key("sk-…")
///             .base_url("https://api.example.com/v1")
///             .build()?,
///     )?;
///     let text = client
///         .parse("scan.pdf", "Transcribe this page.", VlmParseOptions::default())
///         .await?;
///     println!("{text}");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct VlmClient {
    config: VlmConfig,
    dispatcher: Dispatcher,
}

impl VlmClient {
    /// Create a client from a validated configuration.
    pub fn new(config: VlmConfig) -> Result<Self, OcrError> {
        let limiter = RateLimiter::new(
            config.request_delay,
            config.max_rate_limit_retries,
            config.rate_limit_retry_delay,
        );
        let dispatcher = Dispatcher::new(limiter, config.enable_rate_limit_retry)?;
        info!("Initialized VLM client with model: {}", config.model_name);
        Ok(Self { config, dispatcher })
    }

    /// Create a client from `PAGELENS_VLM_*` environment variables.
    pub fn from_env() -> Result<Self, OcrError> {
        Self::new(VlmConfig::from_env()?)
    }

    /// The client's configuration. Immutable for the client's lifetime.
    pub fn config(&self) -> &VlmConfig {
        &self.config
    }

    /// Issue one rate-limited chat-completion call with caller-built
    /// messages.
    ///
    /// This is the low-level surface; [`VlmClient::parse`] builds the
    /// per-page messages for you.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: &CallOptions,
    ) -> Result<ChatResponse, OcrError> {
        let payload = ChatRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.config.model_name.clone()),
            messages,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
        };
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        self.dispatcher
            .send(&self.config.base_url, &self.config.api_key, &payload, timeout)
            .await
    }

    /// OCR a document with a caller-supplied prompt.
    ///
    /// Pages are processed sequentially and joined with a horizontal-rule
    /// separator. A page whose response has no choices contributes an empty
    /// string rather than failing the document.
    pub async fn parse(
        &self,
        path: impl AsRef<Path>,
        prompt: &str,
        options: VlmParseOptions,
    ) -> Result<String, OcrError> {
        let path = path.as_ref();
        info!(
            "Processing {} with dpi={}, pages={:?}",
            path.display(),
            options.dpi,
            options.pages
        );
        let images = render::file_to_base64(path, options.dpi, &options.pages).await?;
        info!("Converted to {} images for processing", images.len());

        let call_options = CallOptions {
            model: options.model.clone(),
            timeout: options.timeout,
            ..Default::default()
        };

        let mut all_texts = Vec::with_capacity(images.len());
        for (page_idx, image_b64) in images.iter().enumerate() {
            debug!("Processing page {}/{}", page_idx + 1, images.len());
            let messages = vec![ChatMessage::user_page(image_b64, prompt)];
            let result = self.chat_completion(messages, &call_options).await?;
            all_texts.push(result.content().unwrap_or_default().to_string());
        }

        Ok(all_texts.join(DEFAULT_PAGE_SEPARATOR))
    }

    /// Synchronous wrapper around [`VlmClient::parse`].
    pub fn parse_sync(
        &self,
        path: impl AsRef<Path>,
        prompt: &str,
        options: VlmParseOptions,
    ) -> Result<String, OcrError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.parse(path, prompt, options))
    }
}
