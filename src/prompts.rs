//! OCR modes and their prompt catalog.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the mode → prompt mapping is the entire
//!    behavioural difference between OCR modes; changing it touches exactly
//!    one place.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    a live endpoint, so prompt regressions are caught cheaply.

use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OCR processing mode, selecting which prompt is sent with each page image.
///
/// | Mode | Output | Use for |
/// |------|--------|---------|
/// | `FreeOcr` | plain Markdown | most documents (fastest) |
/// | `Grounding` | Markdown with layout grounding | complex tables, sparse pages |
/// | `OcrImage` | word-level detail | edge cases only (slowest) |
///
/// `FreeOcr` is the default; when its output for a page falls below the
/// configured length threshold, the client re-runs that page with the
/// configured fallback mode (normally `Grounding`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    /// Fast free-form OCR returning pure Markdown.
    #[default]
    FreeOcr,
    /// Grounded conversion; better on complex layouts, slower.
    Grounding,
    /// Detailed image OCR with word-level grounding.
    OcrImage,
}

impl OcrMode {
    /// The prompt string sent to the model for this mode.
    pub fn prompt(&self) -> &'static str {
        match self {
            OcrMode::FreeOcr => "Free OCR.",
            OcrMode::Grounding => "<|grounding|>Convert the document to markdown.",
            OcrMode::OcrImage => "<|grounding|>OCR this image.",
        }
    }

    /// Stable string name, matching what [`FromStr`] accepts.
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMode::FreeOcr => "free_ocr",
            OcrMode::Grounding => "grounding",
            OcrMode::OcrImage => "ocr_image",
        }
    }
}

impl fmt::Display for OcrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrMode {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free_ocr" => Ok(OcrMode::FreeOcr),
            "grounding" => Ok(OcrMode::Grounding),
            "ocr_image" => Ok(OcrMode::OcrImage),
            other => Err(OcrError::InvalidConfig(format!(
                "Unknown OCR mode '{other}' (expected free_ocr, grounding, or ocr_image)"
            ))),
        }
    }
}
