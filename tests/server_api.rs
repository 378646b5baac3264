//! HTTP contract of the screening endpoint, exercised through the router without a socket.

use std::sync::{ Arc, Mutex };

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{ Request, StatusCode };
use http_body_util::BodyExt;
use serde_json::{ json, Value };
use tower::ServiceExt;

use screening_agent::config::prompt::PromptConfig;
use screening_agent::llm::chat::{
    BackendError,
    ChatClient,
    CompletionRequest,
    CompletionResponse,
    LlmRole,
};
use screening_agent::orchestrator::{ OrchestratorSettings, PromptOrchestrator };
use screening_agent::server::api::{ build_router, AppState };

struct StubClient {
    reply: Result<&'static str, u16>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl StubClient {
    fn replying(text: &'static str) -> Arc<Self> {
        Arc::new(Self { reply: Ok(text), calls: Mutex::new(Vec::new()) })
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self { reply: Err(status), calls: Mutex::new(Vec::new()) })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for StubClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.reply {
            Ok(text) => Ok(CompletionResponse { response: Some(text.to_string()) }),
            Err(status) => {
                let status = reqwest::StatusCode::from_u16(status).unwrap();
                Err(BackendError::from_status(status, "provider said no".into()))
            }
        }
    }

    fn get_model(&self) -> String {
        "stub".into()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

fn app(client: Option<Arc<StubClient>>) -> axum::Router {
    let orchestrator = PromptOrchestrator::new(
        client.map(|c| c as Arc<dyn ChatClient>),
        Arc::new(PromptConfig::default()),
        OrchestratorSettings::default()
    );
    build_router(AppState { orchestrator: Arc::new(orchestrator), prompts_path: None })
}

fn post_chat(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn chat_returns_backend_reply() {
    let client = StubClient::replying("Nice to meet you, Dana! What's your email address?");
    let body = json!({ "message": "My name is Dana", "chatHistory": [] }).to_string();

    let (status, json) = send(app(Some(client.clone())), post_chat(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Nice to meet you, Dana! What's your email address?");
    assert_eq!(json["isEnding"], false);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn chat_forwards_history_after_system_prompt() {
    let client = StubClient::replying("How many years of experience do you have?");
    let body = json!({
        "message": "dana@example.com",
        "chatHistory": [
            { "role": "user", "content": "Dana" },
            { "role": "assistant", "content": "What's your email address?", "timestamp": "10:02" }
        ]
    }).to_string();

    let (status, _) = send(app(Some(client.clone())), post_chat(body)).await;
    assert_eq!(status, StatusCode::OK);
    let calls = client.calls.lock().unwrap();
    assert_eq!(calls[0].messages.len(), 4);
    assert_eq!(calls[0].messages[3].content, "dana@example.com");
}

#[tokio::test]
async fn system_entries_in_history_are_forwarded() {
    let client = StubClient::replying("Understood.");
    let body = json!({
        "message": "Hello",
        "chatHistory": [
            { "role": "system", "content": "Candidate applied via referral." },
            { "role": "assistant", "content": "What's your full name?" }
        ]
    }).to_string();

    let (status, _) = send(app(Some(client.clone())), post_chat(body)).await;
    assert_eq!(status, StatusCode::OK);
    let calls = client.calls.lock().unwrap();
    assert_eq!(calls[0].messages.len(), 4);
    assert_eq!(calls[0].messages[1].role, LlmRole::System);
    assert_eq!(calls[0].messages[1].content, "Candidate applied via referral.");
}

#[tokio::test]
async fn get_is_method_not_allowed() {
    let request = Request::builder().method("GET").uri("/api/chat").body(Body::empty()).unwrap();
    let (status, json) = send(app(Some(StubClient::replying("x"))), request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json["message"], "Method not allowed");
}

#[tokio::test]
async fn missing_message_is_bad_request() {
    for body in [json!({ "chatHistory": [] }).to_string(), json!({ "message": "   " }).to_string(), String::new()] {
        let client = StubClient::replying("x");
        let (status, json) = send(app(Some(client.clone())), post_chat(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Message is required");
        assert_eq!(client.call_count(), 0);
    }
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (status, json) = send(app(Some(StubClient::replying("x"))), post_chat("{ not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid request body");
}

#[tokio::test]
async fn missing_credential_is_configuration_error() {
    for message in ["My name is Dana", "goodbye"] {
        let body = json!({ "message": message }).to_string();
        let (status, json) = send(app(None), post_chat(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], "Server configuration error. Please contact support.");
    }
}

#[tokio::test]
async fn ending_keyword_closes_without_backend_call() {
    let client = StubClient::replying("unused");
    let body = json!({ "message": "ok, goodbye", "chatHistory": [] }).to_string();

    let (status, json) = send(app(Some(client.clone())), post_chat(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isEnding"], true);
    assert!(json["message"].as_str().unwrap().contains("Thank you"));
    assert_eq!(json["stage"], "summary");
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn backend_failures_are_classified() {
    let cases = [
        (401, "Authentication failed"),
        (429, "Too many requests"),
        (503, "Server error"),
    ];
    for (upstream, expected) in cases {
        let body = json!({ "message": "Hello" }).to_string();
        let (status, json) = send(app(Some(StubClient::failing(upstream))), post_chat(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let text = json["message"].as_str().unwrap();
        assert!(text.starts_with("I apologize, but I'm experiencing technical difficulties."));
        assert!(text.contains(expected), "{}", text);
        assert!(!text.contains("provider said no"));
    }
}

#[tokio::test]
async fn health_and_reload_without_prompt_file() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app(None).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder().uri("/api/reload-prompts").body(Body::empty()).unwrap();
    let (status, json) = send(app(None), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
}
