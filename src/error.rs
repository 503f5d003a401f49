//! Error types for the pagelens library.
//!
//! One closed enum covers every failure the SDK can produce, so callers can
//! match on the kind instead of string-sniffing messages:
//!
//! * [`OcrError::InvalidConfig`] — raised at client construction, never
//!   retried.
//! * [`OcrError::FileProcessing`] — input/renderer failures, fatal per call.
//! * [`OcrError::Timeout`] — transport timeout; deliberately not retried by
//!   the dispatcher (retrying a slow endpoint only piles up more slow calls).
//! * [`OcrError::RateLimited`] — HTTP 429, retried with exponential backoff
//!   until retries are exhausted or retry is disabled.
//! * [`OcrError::Api`] — any other non-success status, or a 200 whose body
//!   does not decode. Fatal per attempt.
//!
//! Rate-limit and API errors carry the HTTP status and raw response body so
//! callers can diagnose provider-side failures without re-issuing the request.

use thiserror::Error;

/// All errors returned by the pagelens library.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Client settings failed validation at construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The input file could not be turned into page images
    /// (missing file, empty document, out-of-range page selection, …).
    #[error("Failed to process input file: {0}")]
    FileProcessing(String),

    /// The HTTP request exceeded its timeout. Not retried.
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The HTTP request could not be completed at all
    /// (connection refused, DNS failure, TLS handshake, …).
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// The API returned HTTP 429 and retries were disabled or exhausted.
    #[error("Rate limit exceeded (HTTP {status}): {body}")]
    RateLimited { status: u16, body: String },

    /// The API returned a non-success status, or a success body that could
    /// not be decoded as a chat-completion response.
    #[error("API request failed (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// Unexpected internal error (runtime construction, task join, …).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            OcrError::RateLimited { status, .. } | OcrError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body associated with this error, if any.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            OcrError::RateLimited { body, .. } | OcrError::Api { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display_carries_status_and_body() {
        let e = OcrError::RateLimited {
            status: 429,
            body: "slow down".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("429"), "got: {msg}");
        assert!(msg.contains("slow down"));
        assert_eq!(e.status(), Some(429));
        assert_eq!(e.response_body(), Some("slow down"));
    }

    #[test]
    fn api_display_carries_status() {
        let e = OcrError::Api {
            status: 503,
            body: "overloaded".into(),
        };
        assert!(e.to_string().contains("503"));
        assert_eq!(e.status(), Some(503));
    }

    #[test]
    fn timeout_display() {
        let e = OcrError::Timeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
        assert_eq!(e.status(), None);
    }

    #[test]
    fn config_display() {
        let e = OcrError::InvalidConfig("api_key is required".into());
        assert!(e.to_string().contains("api_key"));
        assert_eq!(e.response_body(), None);
    }
}
