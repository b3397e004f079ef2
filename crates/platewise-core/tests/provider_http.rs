//! HTTP behaviour of the concrete provider adapters against a mock server.

use platewise_core::provider::{
    AnthropicAdapter, DispatchSettings, OllamaAdapter, OpenAiAdapter, PromptOptions,
    ProviderAdapter, ProviderRequest,
};
use platewise_core::{AnalysisInput, ErrorKind, HealthTracker};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> DispatchSettings {
    DispatchSettings {
        priority: 1,
        max_retries: 0,
        timeout: Duration::from_secs(5),
    }
}

fn image_request() -> ProviderRequest {
    let input = AnalysisInput::image(vec![0xFF, 0xD8, 0xFF, 0xE0], "jpeg");
    ProviderRequest::for_input(&input, PromptOptions::default())
}

fn text_request() -> ProviderRequest {
    ProviderRequest::for_input(&AnalysisInput::text("two fried eggs"), PromptOptions::default())
}

fn anthropic(server: &MockServer) -> AnthropicAdapter {
    AnthropicAdapter::new("sk-ant-test", "claude-test", settings(), HealthTracker::default())
        .with_endpoint(&format!("{}/v1", server.uri()))
}

fn openai(server: &MockServer) -> OpenAiAdapter {
    OpenAiAdapter::new("sk-test", "gpt-test", settings(), HealthTracker::default())
        .with_endpoint(&format!("{}/v1", server.uri()))
}

fn anthropic_body(text: &str) -> serde_json::Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "model": "claude-test",
        "usage": {"input_tokens": 100, "output_tokens": 20}
    })
}

#[tokio::test]
async fn test_anthropic_success_parses_fenced_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_body(
            "```json\n{\"foods\": [{\"name\": \"egg\", \"calories\": 90}]}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = anthropic(&server);
    let response = adapter.analyze(&image_request()).await.unwrap();

    assert_eq!(response.data["foods"][0]["name"], "egg");
    assert_eq!(response.tokens_used, Some(120));
    assert_eq!(response.model, "claude-test");
    assert_eq!(adapter.health().snapshot().request_count, 1);
}

#[tokio::test]
async fn test_anthropic_sends_image_block_before_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"model": "claude-test", "max_tokens": 1024})))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_body("{\"foods\": []}")))
        .expect(1)
        .mount(&server)
        .await;

    let response = anthropic(&server).analyze(&image_request()).await;
    assert!(response.is_ok());

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let content = &body["messages"][0]["content"];
    assert_eq!(content[0]["type"], "image");
    assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
    assert_eq!(content[1]["type"], "text");
}

#[tokio::test]
async fn test_anthropic_overloaded_is_server_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let adapter = anthropic(&server);
    let err = adapter.analyze(&text_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerFault);
    assert_eq!(err.status_code, Some(529));
    assert_eq!(adapter.health().snapshot().error_count, 1);
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after_and_gates_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "30")
                .set_body_json(json!({
                    "error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}
                })),
        )
        .mount(&server)
        .await;

    let adapter = openai(&server);
    let err = adapter.analyze(&text_request()).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::RateLimit);
    assert_eq!(err.retry_after, Some(Duration::from_secs(30)));
    assert!(!adapter.is_available());
    let health = adapter.health().snapshot();
    assert!(health.cooldown_until.is_some());
}

#[tokio::test]
async fn test_openai_prose_answer_is_analysis_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "I'm sorry, I can't help with that."}}],
            "model": "gpt-test",
            "usage": {"total_tokens": 12}
        })))
        .mount(&server)
        .await;

    let adapter = openai(&server);
    let err = adapter.analyze(&image_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AnalysisFault);

    let health = adapter.health().snapshot();
    assert_eq!(health.request_count, 1);
    assert_eq!(health.error_count, 0);
}

#[tokio::test]
async fn test_openai_bad_request_is_analysis_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Invalid image", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let err = openai(&server).analyze(&image_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AnalysisFault);
    assert_eq!(err.message, "HTTP 400: Invalid image");
}

#[tokio::test]
async fn test_unauthorized_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = openai(&server).analyze(&text_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unknown);
    assert!(!err.retryable());
}

#[tokio::test]
async fn test_slow_response_times_out_as_server_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({"choices": [], "model": "gpt-test"})),
        )
        .mount(&server)
        .await;

    let adapter = openai(&server);
    let mut request = text_request();
    request.timeout = Duration::from_millis(50);

    let err = adapter.analyze(&request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerFault);
    assert!(err.message.contains("timed out"));
    assert_eq!(adapter.health().snapshot().error_count, 1);
}

#[tokio::test]
async fn test_connection_refused_is_server_fault() {
    let adapter = OpenAiAdapter::new("sk-test", "gpt-test", settings(), HealthTracker::default())
        .with_endpoint("http://127.0.0.1:1/v1");
    let err = adapter.analyze(&text_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerFault);
}

#[tokio::test]
async fn test_ollama_text_request_omits_images() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llava", "stream": false, "format": "json"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "{\"foods\": [{\"name\": \"egg\"}, {\"name\": \"egg\"}]}",
            "prompt_eval_count": 30,
            "eval_count": 15
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new(&server.uri(), "llava", settings(), HealthTracker::default());
    let response = adapter.analyze(&text_request()).await.unwrap();
    assert_eq!(response.data["foods"].as_array().map(Vec::len), Some(2));
    assert_eq!(response.tokens_used, Some(45));

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("images").is_none());
}

#[tokio::test]
async fn test_health_check_lists_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ollama = OllamaAdapter::new(&server.uri(), "llava", settings(), HealthTracker::default());
    assert!(ollama.health_check().await.healthy);

    let check = openai(&server).health_check().await;
    assert!(!check.healthy);
    assert_eq!(check.detail.as_deref(), Some("HTTP 503"));
    assert_eq!(check.provider, "openai");
}
