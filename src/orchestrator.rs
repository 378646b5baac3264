use log::{ error, info, warn };
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError, DEFAULT_PROMPT_CONFIG };
use crate::llm::chat::{
    new_client as new_chat_client,
    BackendError,
    ChatClient,
    CompletionRequest,
    LlmMessage,
    LlmRole,
};
use crate::llm::LlmConfig;
use crate::models::chat::{ ChatRequest, ChatResponse, Message, Role };
use crate::progress::{ classify_text, Stage };

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

const MISSING_MESSAGE: &str = "Message is required";
const CONFIGURATION_MESSAGE: &str = "Server configuration error. Please contact support.";
const BACKEND_FAILURE_PREFIX: &str = "I apologize, but I'm experiencing technical difficulties. ";

#[derive(Debug, ThisError)]
pub enum OrchestratorError {
    #[error("request carried no message")]
    MissingMessage,
    #[error("no backend credential configured")]
    Configuration,
    #[error("backend call failed: {0}")]
    Backend(#[from] BackendError),
}

impl OrchestratorError {
    /// Text safe to show the candidate. Never includes provider response bodies.
    pub fn user_message(&self) -> String {
        match self {
            OrchestratorError::MissingMessage => MISSING_MESSAGE.to_string(),
            OrchestratorError::Configuration => CONFIGURATION_MESSAGE.to_string(),
            OrchestratorError::Backend(e) => {
                let hint = match e {
                    BackendError::Authentication { .. } =>
                        "Authentication failed. Please check API configuration.",
                    BackendError::RateLimited => "Too many requests. Please try again in a moment.",
                    BackendError::Server { .. } => "Server error. Please try again later.",
                    BackendError::Timeout => "The request timed out. Please try again in a moment.",
                    _ => "Please try again in a moment.",
                };
                format!("{}{}", BACKEND_FAILURE_PREFIX, hint)
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, OrchestratorError::MissingMessage)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub backend_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

/// Server side of a screening turn: fixed instructions in, one reply out.
pub struct PromptOrchestrator {
    chat_client: Option<Arc<dyn ChatClient>>,
    prompt_config: RwLock<Arc<PromptConfig>>,
    settings: OrchestratorSettings,
}

impl PromptOrchestrator {
    pub fn new(
        chat_client: Option<Arc<dyn ChatClient>>,
        prompt_config: Arc<PromptConfig>,
        settings: OrchestratorSettings
    ) -> Self {
        Self {
            chat_client,
            prompt_config: RwLock::new(prompt_config),
            settings,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_client = match args.effective_api_key() {
            Some(api_key) => {
                let chat_config = LlmConfig {
                    llm_type: args.chat_llm_type.parse()?,
                    api_key: Some(api_key),
                    completion_model: args.chat_model.clone(),
                    base_url: args.chat_base_url.clone(),
                };
                let client = new_chat_client(&chat_config)?;
                info!(
                    "Chat client configured: Type={}, Model={}, BaseURL={}",
                    chat_config.llm_type,
                    client.get_model(),
                    client.get_base_url().as_deref().unwrap_or("adapter default")
                );
                Some(client)
            }
            None => {
                warn!(
                    "No chat API key configured. Every chat request will fail with a configuration error."
                );
                None
            }
        };

        let prompt_config = match &args.prompts_path {
            Some(path) => {
                let config = prompt::load_prompts(path)?;
                info!("Loaded prompts from: {}", path);
                config
            }
            None => Arc::clone(&DEFAULT_PROMPT_CONFIG),
        };

        let settings = OrchestratorSettings {
            temperature: args.chat_temperature,
            max_tokens: args.chat_max_tokens,
            backend_timeout: Duration::from_secs(args.backend_timeout_secs),
        };

        Ok(Self::new(chat_client, prompt_config, settings))
    }

    pub async fn prompt_config(&self) -> Arc<PromptConfig> {
        Arc::clone(&*self.prompt_config.read().await)
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, OrchestratorError> {
        let request_id = Uuid::new_v4();
        let message = match request.message.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => {
                warn!("[{}] Rejected chat request without a message", request_id);
                return Err(OrchestratorError::MissingMessage);
            }
        };
        info!(
            "[{}] Chat request received (history={} messages)",
            request_id,
            request.chat_history.len()
        );

        let chat_client = match &self.chat_client {
            Some(client) => Arc::clone(client),
            None => {
                error!("[{}] Chat API key not configured", request_id);
                return Err(OrchestratorError::Configuration);
            }
        };

        let config = self.prompt_config().await;
        if config.is_ending_message(&message) {
            info!("[{}] Ending keyword detected, closing conversation", request_id);
            return Ok(ChatResponse {
                message: config.closing_message.clone(),
                is_ending: true,
                stage: Some(Stage::last()),
            });
        }

        let completion_request = CompletionRequest {
            messages: assemble_messages(&config, &request.chat_history, &message),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let outcome = tokio::time::timeout(
            self.settings.backend_timeout,
            chat_client.complete(&completion_request)
        ).await;
        let completion = match outcome {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => {
                error!("[{}] Backend call failed: {}", request_id, e);
                return Err(e.into());
            }
            Err(_) => {
                error!(
                    "[{}] Backend call exceeded {:?}",
                    request_id,
                    self.settings.backend_timeout
                );
                return Err(BackendError::Timeout.into());
            }
        };

        let reply = completion.response
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| {
                warn!("[{}] Backend returned no content, using fallback", request_id);
                config.fallback_message.clone()
            });
        info!("[{}] Backend response received successfully", request_id);

        Ok(ChatResponse {
            stage: classify_text(&reply),
            message: reply,
            is_ending: false,
        })
    }

    pub async fn reload_prompts_if_changed<P: AsRef<Path>>(
        &self,
        path: P
    ) -> Result<bool, PromptError> {
        let mut guard = self.prompt_config.write().await;
        match prompt::reload_prompts_if_changed(path, &guard)? {
            Some(new_config) => {
                *guard = new_config;
                info!("Prompts successfully reloaded");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// System instructions, then the caller's transcript, then the new user turn.
pub fn assemble_messages(
    config: &PromptConfig,
    history: &[Message],
    message: &str
) -> Vec<LlmMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(LlmMessage::new(LlmRole::System, config.system_prompt.clone()));
    messages.extend(
        history.iter().map(|m| {
            let role = match m.role {
                Role::User => LlmRole::User,
                Role::Assistant => LlmRole::Assistant,
                Role::System => LlmRole::System,
            };
            LlmMessage::new(role, m.content.clone())
        })
    );
    messages.push(LlmMessage::new(LlmRole::User, message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::CompletionResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    enum Script {
        Reply(Option<&'static str>),
        Fail(fn() -> BackendError),
        Hang,
    }

    struct ScriptedClient {
        script: Script,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self { script, calls: Mutex::new(Vec::new()) })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(
            &self,
            request: &CompletionRequest
        ) -> Result<CompletionResponse, BackendError> {
            self.calls.lock().unwrap().push(request.clone());
            match &self.script {
                Script::Reply(text) => Ok(CompletionResponse { response: text.map(String::from) }),
                Script::Fail(make) => Err(make()),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(CompletionResponse { response: None })
                }
            }
        }

        fn get_model(&self) -> String {
            "scripted".to_string()
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    fn orchestrator(client: Option<Arc<ScriptedClient>>) -> PromptOrchestrator {
        PromptOrchestrator::new(
            client.map(|c| c as Arc<dyn ChatClient>),
            Arc::new(PromptConfig::default()),
            OrchestratorSettings::default()
        )
    }

    fn request(message: &str, history: Vec<Message>) -> ChatRequest {
        ChatRequest { message: Some(message.to_string()), chat_history: history }
    }

    #[tokio::test]
    async fn forwards_system_history_and_message_in_order() {
        let client = ScriptedClient::new(Script::Reply(Some("Nice to meet you, Dana!")));
        let orch = orchestrator(Some(client.clone()));
        let history = vec![
            Message::user("Hi"),
            Message::assistant("Hello! What's your full name?")
        ];

        let response = orch.handle(request("My name is Dana", history)).await.unwrap();
        assert_eq!(response.message, "Nice to meet you, Dana!");
        assert!(!response.is_ending);

        let calls = client.calls.lock().unwrap();
        let sent = &calls[0];
        assert_eq!(sent.messages.len(), 4);
        assert_eq!(sent.messages[0].role, LlmRole::System);
        assert_eq!(sent.messages[1], LlmMessage::new(LlmRole::User, "Hi"));
        assert_eq!(sent.messages[2].role, LlmRole::Assistant);
        assert_eq!(sent.messages[3], LlmMessage::new(LlmRole::User, "My name is Dana"));
        assert_eq!(sent.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(sent.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn ending_keyword_short_circuits_without_backend_call() {
        let client = ScriptedClient::new(Script::Reply(Some("unused")));
        let orch = orchestrator(Some(client.clone()));

        let response = orch.handle(request("ok, goodbye", vec![])).await.unwrap();
        assert!(response.is_ending);
        assert_eq!(response.message, PromptConfig::default().closing_message);
        assert_eq!(response.stage, Some(Stage::Summary));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_credential_is_reported_before_keywords() {
        let orch = orchestrator(None);
        for text in ["My name is Dana", "bye", "I'd like to EXIT now"] {
            let err = orch.handle(request(text, vec![])).await.unwrap_err();
            assert!(matches!(err, OrchestratorError::Configuration));
            assert_eq!(err.user_message(), CONFIGURATION_MESSAGE);
        }
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let orch = orchestrator(Some(ScriptedClient::new(Script::Reply(Some("x")))));
        let err = orch.handle(request("   ", vec![])).await.unwrap_err();
        assert!(err.is_client_error());
        let err = orch.handle(ChatRequest::default()).await.unwrap_err();
        assert_eq!(err.user_message(), MISSING_MESSAGE);
    }

    #[tokio::test]
    async fn empty_backend_content_uses_fallback() {
        for script in [Script::Reply(None), Script::Reply(Some("  "))] {
            let orch = orchestrator(Some(ScriptedClient::new(script)));
            let response = orch.handle(request("Hello", vec![])).await.unwrap();
            assert_eq!(response.message, PromptConfig::default().fallback_message);
            assert!(!response.is_ending);
        }
    }

    #[tokio::test]
    async fn reply_is_tagged_with_detected_stage() {
        let client = ScriptedClient::new(
            Script::Reply(Some("Great! What technologies do you work with?"))
        );
        let response = orchestrator(Some(client)).handle(request("5 years", vec![])).await.unwrap();
        assert_eq!(response.stage, Some(Stage::Tech));
    }

    #[tokio::test]
    async fn backend_failures_are_classified_without_leaking_details() {
        let cases: [(fn() -> BackendError, &str); 4] = [
            (|| BackendError::Authentication { status: 401 }, "Authentication failed"),
            (|| BackendError::RateLimited, "Too many requests"),
            (
                || BackendError::Server { status: 500, body: "secret stack trace".into() },
                "Server error",
            ),
            (|| BackendError::Transport("dns failure for api.groq.com".into()), "try again in a moment"),
        ];
        for (make, expected) in cases {
            let orch = orchestrator(Some(ScriptedClient::new(Script::Fail(make))));
            let err = orch.handle(request("Hello", vec![])).await.unwrap_err();
            let text = err.user_message();
            assert!(text.starts_with(BACKEND_FAILURE_PREFIX), "{}", text);
            assert!(text.contains(expected), "{}", text);
            assert!(!text.contains("secret"));
            assert!(!text.contains("groq"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_backend_times_out() {
        let client = ScriptedClient::new(Script::Hang);
        let orch = PromptOrchestrator::new(
            Some(client as Arc<dyn ChatClient>),
            Arc::new(PromptConfig::default()),
            OrchestratorSettings { backend_timeout: Duration::from_secs(5), ..Default::default() }
        );
        let err = orch.handle(request("Hello", vec![])).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Backend(BackendError::Timeout)));
        assert!(err.user_message().contains("timed out"));
    }

    #[tokio::test]
    async fn reload_swaps_prompt_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{ "ending_keywords": ["done"] }"#).unwrap();

        let client = ScriptedClient::new(Script::Reply(Some("ok")));
        let orch = orchestrator(Some(client.clone()));
        assert!(orch.reload_prompts_if_changed(&path).await.unwrap());
        assert!(!orch.reload_prompts_if_changed(&path).await.unwrap());

        let response = orch.handle(request("I'm done", vec![])).await.unwrap();
        assert!(response.is_ending);
        let response = orch.handle(request("bye", vec![])).await.unwrap();
        assert!(!response.is_ending);
        assert_eq!(client.call_count(), 1);
    }
}
