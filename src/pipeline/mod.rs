//! Pipeline stages for document OCR.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and replaceable:
//!
//! ```text
//! file ──▶ render ──▶ encode ──▶ dispatch ──▶ clean
//! (path)   (pdfium)   (base64)   (HTTP+retry)  (strip markers)
//! ```
//!
//! 1. [`render`]   — rasterise selected PDF pages (or pass a raster image
//!    through); runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`]   — PNG-encode and base64-wrap each page image
//! 3. [`dispatch`] — the only stage with network I/O: rate-limited,
//!    429-retried chat-completion POST
//! 4. [`clean`]    — strip model-internal markers from the returned text

pub mod clean;
pub mod dispatch;
pub mod encode;
pub mod render;
