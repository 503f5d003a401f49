//! # pagelens
//!
//! OCR documents with a vision-language model API.
//!
//! ## Why this crate?
//!
//! Vision-language OCR endpoints read a page the way a human would, which
//! makes them dramatically better than classical OCR on tables, multi-column
//! layouts, and mixed scripts. What they do *not* give you is a well-behaved
//! client: requests must be paced, 429 responses retried with backoff, and
//! thin pages re-run in a higher-fidelity mode. This crate is that client.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image
//!  │
//!  ├─ 1. Render    rasterise selected pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Encode    PNG → base64 data URI
//!  ├─ 3. Dispatch  rate-limited chat-completion POST, 429 retry with backoff
//!  ├─ 4. Fallback  re-run thin pages with the grounded mode
//!  └─ 5. Assemble  cleaned page texts joined with the page separator
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagelens::{OcrClient, OcrConfig, ParseOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads PAGELENS_API_KEY etc. from the environment.
//!     let client = OcrClient::from_env()?;
//!     let text = client.parse("document.pdf", ParseOptions::default()).await?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```
//!
//! ## Two client flavors
//!
//! | Client | Prompting | Fallback | DPI |
//! |--------|-----------|----------|-----|
//! | [`OcrClient`] | fixed mode catalog ([`OcrMode`]) | automatic per-page | 150 / 200 / 300 |
//! | [`VlmClient`] | caller-supplied prompt | none | unrestricted, default 72 |
//!
//! Both share the same rate limiter, dispatcher, and error taxonomy
//! ([`OcrError`]); they differ only in the prompting surface.
//!
//! ## Rate limiting and retries
//!
//! `request_delay` enforces a minimum spacing between any two requests from
//! one client, even when pages are processed concurrently. HTTP 429 responses
//! are retried up to `max_rate_limit_retries` times with exponential backoff
//! (`rate_limit_retry_delay * 2^attempt`). Timeouts and other API errors are
//! never retried — see [`OcrError`] for the full taxonomy.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod limiter;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod vlm;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchProcessor, BatchResult, BatchSummary};
pub use client::{OcrClient, ParseOptions};
pub use config::{OcrConfig, OcrConfigBuilder, PageSelection, ALLOWED_DPI, DEFAULT_PAGE_SEPARATOR};
pub use error::OcrError;
pub use limiter::RateLimiter;
pub use output::{PageResult, ParseOutput, ParseStats};
pub use pipeline::dispatch::{
    ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageSource, TokenUsage,
};
pub use prompts::OcrMode;
pub use vlm::{CallOptions, VlmClient, VlmConfig, VlmConfigBuilder, VlmParseOptions};
