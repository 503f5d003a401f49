//! Request dispatch: one HTTP POST per attempt, 429 retry loop, status
//! interpretation.
//!
//! This is the only module with network I/O. Every outbound call goes through
//! [`Dispatcher::send`], which pairs the rate limiter's pacing gate with the
//! retry policy so no code path can bypass either.
//!
//! ## Retry policy
//!
//! Only HTTP 429 is retried, with exponential backoff
//! (`rate_limit_retry_delay * 2^attempt`). Timeouts are *not* retried: a
//! timeout means the endpoint is saturated or the page is pathological, and
//! re-sending the same multi-megabyte payload just burns another timeout
//! window. Other non-200 statuses (auth failures, bad requests, 5xx) fail
//! immediately and carry the status and raw body for diagnosis.

use crate::error::OcrError;
use crate::limiter::RateLimiter;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

// ── Wire types ───────────────────────────────────────────────────────────

/// Chat-completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A single message in the request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// A user message with arbitrary content parts.
    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }

    /// The standard page message: one base64 PNG followed by the prompt text.
    pub fn user_page(image_b64: &str, prompt: &str) -> Self {
        Self::user(vec![ContentPart::image(image_b64), ContentPart::text(prompt)])
    }
}

/// One element of a multimodal message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageSource },
    Text { text: String },
}

impl ContentPart {
    /// An image part wrapping base64 PNG data as a data URI.
    pub fn image(b64: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageSource {
                url: format!("data:image/png;base64,{b64}"),
            },
        }
    }

    /// A plain-text part.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

/// The `image_url` object of an image content part.
#[derive(Debug, Clone, Serialize)]
pub struct ImageSource {
    pub url: String,
}

/// Decoded chat-completion response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    /// Text of the first choice, if the response has one.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
}

/// Token usage reported by the API. Informational only — logged, never
/// load-bearing.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

// ── Dispatcher ───────────────────────────────────────────────────────────

/// Issues rate-limited, retried chat-completion requests for one client.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    http: reqwest::Client,
    limiter: RateLimiter,
    retry_enabled: bool,
}

impl Dispatcher {
    /// Build a dispatcher around an existing limiter.
    ///
    /// The reqwest client carries no default timeout; the effective timeout
    /// is applied per request so callers can override it per call.
    pub(crate) fn new(limiter: RateLimiter, retry_enabled: bool) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| OcrError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            limiter,
            retry_enabled,
        })
    }

    /// POST `payload` to `url`, retrying on 429 per the configured policy.
    ///
    /// Returns the decoded response on HTTP 200. All other outcomes map to
    /// the error taxonomy: timeout → [`OcrError::Timeout`] (no retry),
    /// 429 → retried then [`OcrError::RateLimited`], anything else →
    /// [`OcrError::Api`].
    pub(crate) async fn send(
        &self,
        url: &str,
        api_key: &str,
        payload: &ChatRequest,
        timeout: Duration,
    ) -> Result<ChatResponse, OcrError> {
        for attempt in 0..=self.limiter.max_retries() {
            self.limiter.acquire().await;

            let result = self
                .http
                .post(url)
                .bearer_auth(api_key)
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            let response = match result {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => {
                    return Err(OcrError::Timeout {
                        secs: timeout.as_secs(),
                    });
                }
                Err(e) => return Err(OcrError::Transport(e.to_string())),
            };

            let status = response.status().as_u16();

            if status == 429 {
                let body = response.text().await.unwrap_or_default();
                if !self.limiter.should_retry(attempt, self.retry_enabled) {
                    return Err(OcrError::RateLimited { status: 429, body });
                }
                let backoff = self.limiter.backoff_delay(attempt);
                warn!(
                    "Rate limit hit (429), retrying in {:.1?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    self.limiter.max_retries()
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            if status != 200 {
                let body = response.text().await.unwrap_or_default();
                return Err(OcrError::Api { status, body });
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) if e.is_timeout() => {
                    return Err(OcrError::Timeout {
                        secs: timeout.as_secs(),
                    });
                }
                Err(e) => return Err(OcrError::Transport(e.to_string())),
            };

            return match serde_json::from_str::<ChatResponse>(&body) {
                Ok(parsed) => {
                    if let Some(usage) = parsed.usage {
                        debug!(
                            "API usage: prompt_tokens={:?}, completion_tokens={:?}, total_tokens={:?}",
                            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                        );
                    }
                    Ok(parsed)
                }
                Err(e) => {
                    debug!("Failed to decode response body: {e}");
                    Err(OcrError::Api { status: 200, body })
                }
            };
        }

        // Unreachable given the loop above; kept as a defensive terminal state.
        Err(OcrError::RateLimited {
            status: 429,
            body: "Rate limit retries exhausted".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_message_serialises_to_wire_shape() {
        let msg = ChatMessage::user_page("QUJD", "Free OCR.");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "image_url");
        assert_eq!(
            json["content"][0]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
        assert_eq!(json["content"][1]["type"], "text");
        assert_eq!(json["content"][1]["text"], "Free OCR.");
    }

    #[test]
    fn request_serialises_all_fields() {
        let req = ChatRequest {
            model: "deepseek-ai/DeepSeek-OCR".to_string(),
            messages: vec![ChatMessage::user_page("QUJD", "Free OCR.")],
            temperature: 0.0,
            max_tokens: 4000,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "deepseek-ai/DeepSeek-OCR");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["max_tokens"], 4000);
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn response_decodes_with_and_without_usage() {
        let with: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        )
        .unwrap();
        assert_eq!(with.content(), Some("hello"));
        assert_eq!(with.usage.unwrap().total_tokens, Some(15));

        let without: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(without.content(), Some("hi"));
        assert!(without.usage.is_none());
    }

    #[test]
    fn empty_choices_has_no_content() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(resp.content(), None);
    }
}
