//! Rate-limiting and retry behaviour of the dispatcher, exercised through
//! [`VlmClient::chat_completion`] against a mock HTTP server.
//!
//! Timing assertions use generous tolerances (≥ 80% of the nominal delay)
//! so they stay stable on loaded CI machines.

use pagelens::{CallOptions, ChatMessage, OcrError, VlmClient, VlmConfig};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "Qwen3-VL-8B",
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }
        ],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
}

fn client(server: &MockServer, configure: impl FnOnce(pagelens::VlmConfigBuilder) -> pagelens::VlmConfigBuilder) -> VlmClient {
    let builder = VlmConfig::builder()
        .api_key("test_key")
        .base_url(format!("{}/v1", server.uri()));
    VlmClient::new(configure(builder).build().unwrap()).unwrap()
}

fn page_messages() -> Vec<ChatMessage> {
    vec![ChatMessage::user_page("aW1hZ2U=", "Transcribe this page.")]
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn request_delay_spaces_consecutive_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("test content")))
        .mount(&server)
        .await;

    let client = client(&server, |b| b.request_delay(Duration::from_millis(300)));

    let start = Instant::now();
    client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap();
    client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(250),
        "second call should be delayed, elapsed {elapsed:?}"
    );
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn rate_limit_429_retries_with_backoff_then_succeeds() {
    let server = MockServer::start().await;
    // First two calls get 429, everything after falls through to the 200 mock.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("success")))
        .mount(&server)
        .await;

    let client = client(&server, |b| {
        b.max_rate_limit_retries(2)
            .rate_limit_retry_delay(Duration::from_millis(100))
    });

    let start = Instant::now();
    let response = client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(response.content(), Some("success"));
    assert_eq!(request_count(&server).await, 3);
    // Backoff sequence: 100ms + 200ms.
    assert!(
        elapsed >= Duration::from_millis(250),
        "expected exponential backoff, elapsed {elapsed:?}"
    );
}

#[tokio::test]
async fn rate_limit_429_fails_immediately_when_retry_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
        .mount(&server)
        .await;

    let client = client(&server, |b| b.enable_rate_limit_retry(false));

    let err = client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap_err();

    match err {
        OcrError::RateLimited { status, body } => {
            assert_eq!(status, 429);
            assert!(body.contains("Rate limit exceeded"));
        }
        other => panic!("expected RateLimited, got: {other:?}"),
    }
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn rate_limit_429_fails_after_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
        .mount(&server)
        .await;

    let client = client(&server, |b| {
        b.max_rate_limit_retries(1)
            .rate_limit_retry_delay(Duration::from_millis(50))
    });

    let err = client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, OcrError::RateLimited { status: 429, .. }));
    // Initial attempt + 1 retry.
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let client = client(&server, |b| b);

    let err = client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap_err();

    match err {
        OcrError::Api { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("Internal Server Error"));
        }
        other => panic!("expected Api, got: {other:?}"),
    }
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn timeout_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("too late"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = client(&server, |b| b.timeout(Duration::from_millis(300)));

    let start = Instant::now();
    let err = client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, OcrError::Timeout { .. }), "got: {err:?}");
    // Failed at the timeout, without waiting out the 5s response or retrying.
    assert!(elapsed < Duration::from_secs(2), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn per_call_timeout_overrides_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("slow but fine"))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    // Config timeout would fail; the per-call override allows the delay.
    let client = client(&server, |b| b.timeout(Duration::from_millis(50)));

    let response = client
        .chat_completion(
            page_messages(),
            &CallOptions {
                timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(response.content(), Some("slow but fine"));
}

#[tokio::test]
async fn malformed_success_body_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let client = client(&server, |b| b);

    let err = client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap_err();

    match err {
        OcrError::Api { status, body } => {
            assert_eq!(status, 200);
            assert!(body.contains("not json"));
        }
        other => panic!("expected Api, got: {other:?}"),
    }
}

#[tokio::test]
async fn bearer_token_and_payload_reach_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .mount(&server)
        .await;

    let client = client(&server, |b| b.model_name("my-model"));
    client
        .chat_completion(page_messages(), &CallOptions::default())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let auth = request
        .headers
        .get("authorization")
        .expect("Authorization header present");
    assert_eq!(auth.to_str().unwrap(), "Bearer test_key");

    let body: serde_json::Value = request.body_json().unwrap();
    assert_eq!(body["model"], "my-model");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"][0]["type"], "image_url");
    assert_eq!(
        body["messages"][0]["content"][0]["image_url"]["url"],
        "data:image/png;base64,aW1hZ2U="
    );
    assert_eq!(body["messages"][0]["content"][1]["type"], "text");
}
