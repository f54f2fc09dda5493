//! OpenAI-compatible backend contract tests.
//!
//! These verify request format, response parsing, and HTTP error mapping
//! against a mock server, plus fallback across two live endpoints.

use interlocutor::config::{BackendConfig, GenerationConfig};
use interlocutor::conversation::ConversationTurn;
use interlocutor::llm::api::OpenAiCompatBackend;
use interlocutor::llm::backend::{BackendInput, GenerationBackend};
use interlocutor::llm::error::{BackendError, GenerationError};
use interlocutor::llm::{GenerationLedger, GenerationRequest, ResponseGenerator};
use serde_json::json;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_config(name: &str, url: &str) -> BackendConfig {
    BackendConfig {
        name: name.to_owned(),
        api_url: url.to_owned(),
        model: "test-model".to_owned(),
        api_key: "test-key".to_owned(),
        ..BackendConfig::default()
    }
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "id": "cmpl-1",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}

async fn generate_once(server: &MockServer) -> Result<String, BackendError> {
    let backend = OpenAiCompatBackend::from_config(&backend_config("mock", &server.uri())).unwrap();
    let history = [ConversationTurn::user("hi"), ConversationTurn::agent("hello")];
    let input = BackendInput {
        system_prompt: "Be brief.",
        history: &history,
        prompt: "what should I plant",
        language: "hi-IN",
    };
    backend.generate(&input).await
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_carries_model_history_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": false,
            "messages": [
                {"role": "system"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "what should I plant"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Tomatoes.")))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(generate_once(&server).await.unwrap(), "Tomatoes.");
}

#[tokio::test]
async fn trailing_v1_in_api_url_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/v1/", server.uri());
    let backend = OpenAiCompatBackend::from_config(&backend_config("mock", &url)).unwrap();
    let input = BackendInput {
        system_prompt: "",
        history: &[],
        prompt: "ping",
        language: "en-US",
    };
    assert_eq!(backend.generate(&input).await.unwrap(), "ok");
}

// ────────────────────────────────────────────────────────────────────────────
// Error mapping
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "invalid api key"}})),
        )
        .mount(&server)
        .await;

    let err = generate_once(&server).await.unwrap_err();
    assert!(matches!(err, BackendError::Auth(_)), "got {err:?}");
    assert!(err.message().contains("invalid api key"));
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = generate_once(&server).await.unwrap_err();
    assert_eq!(err.code(), "RATE_LIMITED");
}

#[tokio::test]
async fn server_error_maps_to_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = generate_once(&server).await.unwrap_err();
    assert!(matches!(err, BackendError::Provider(_)), "got {err:?}");
}

#[tokio::test]
async fn missing_content_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = generate_once(&server).await.unwrap_err();
    assert!(matches!(err, BackendError::Malformed(_)), "got {err:?}");
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = generate_once(&server).await.unwrap_err();
    assert!(matches!(err, BackendError::Malformed(_)), "got {err:?}");
}

// ────────────────────────────────────────────────────────────────────────────
// Fallback over HTTP
// ────────────────────────────────────────────────────────────────────────────

fn request(ledger: &mut GenerationLedger) -> GenerationRequest {
    GenerationRequest {
        id: ledger.issue(),
        prompt: "what should I plant".to_owned(),
        history: Vec::new(),
        language: "en-US".to_owned(),
        issued_at: Instant::now(),
    }
}

#[tokio::test]
async fn generator_falls_back_to_second_endpoint() {
    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&down)
        .await;
    let up = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Basil.  ")))
        .expect(1)
        .mount(&up)
        .await;

    let config = GenerationConfig {
        backends: vec![
            backend_config("primary", &down.uri()),
            backend_config("secondary", &up.uri()),
        ],
        ..GenerationConfig::default()
    };
    let generator = ResponseGenerator::from_config(&config).unwrap();
    assert_eq!(generator.backend_names(), vec!["primary", "secondary"]);

    let mut ledger = GenerationLedger::new();
    let text = generator
        .generate(&request(&mut ledger), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(text, "Basil.");
}

#[tokio::test]
async fn generator_reports_last_failure_when_all_endpoints_fail() {
    let first = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&first)
        .await;
    let second = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&second)
        .await;

    let config = GenerationConfig {
        backends: vec![
            backend_config("primary", &first.uri()),
            backend_config("secondary", &second.uri()),
        ],
        ..GenerationConfig::default()
    };
    let generator = ResponseGenerator::from_config(&config).unwrap();
    let mut ledger = GenerationLedger::new();
    let err = generator
        .generate(&request(&mut ledger), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        GenerationError::Exhausted {
            attempts,
            backend,
            last,
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(backend, "secondary");
            assert!(matches!(last, BackendError::Auth(_)));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}
