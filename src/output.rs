//! Result types returned by [`crate::OcrClient`].

use crate::pipeline::dispatch::TokenUsage;
use crate::prompts::OcrMode;
use serde::{Deserialize, Serialize};

/// Outcome of one page's OCR pass (including any fallback pass).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed position within the processed page sequence.
    pub page_num: usize,
    /// Cleaned page text.
    pub text: String,
    /// The mode whose output was kept (the fallback mode if it replaced the
    /// first pass).
    pub mode_used: OcrMode,
    /// Whether the fallback pass ran and its output was kept.
    pub fallback_applied: bool,
    /// Combined token usage across the page's dispatcher calls, when the API
    /// reported it.
    pub usage: Option<TokenUsage>,
    /// Wall-clock time spent on this page, including retries and fallback.
    pub duration_ms: u64,
}

/// Aggregate counters for a document parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseStats {
    /// Pages processed.
    pub pages_processed: usize,
    /// Pages where the fallback output was kept.
    pub fallback_pages: usize,
    /// Total prompt tokens reported by the API.
    pub prompt_tokens: u64,
    /// Total completion tokens reported by the API.
    pub completion_tokens: u64,
    /// Wall-clock duration of the whole parse.
    pub duration_ms: u64,
}

/// Full result of a document parse.
///
/// `text` is the per-page text joined with the configured page separator, in
/// original page order. The per-page breakdown is in `pages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutput {
    pub text: String,
    pub pages: Vec<PageResult>,
    pub stats: ParseStats,
}
