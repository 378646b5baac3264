use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::Client as HttpClient;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

use crate::models::chat::{ ChatRequest, ChatResponse, ErrorResponse };
use crate::orchestrator::{ OrchestratorError, PromptOrchestrator };

const GENERIC_RETRY_MESSAGE: &str =
    "I'm sorry, I couldn't reach the screening service. Please try sending your message again.";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach screening service: {0}")]
    Transport(String),
    #[error("screening service did not answer in time")]
    Timeout,
    #[error("screening service answered HTTP {status}")]
    Server {
        status: u16,
        /// User-safe text from the service's `{ message }` error body, when it sent one.
        message: Option<String>,
    },
    #[error("unreadable screening service response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Server { message: Some(message), .. } => message.clone(),
            _ => GENERIC_RETRY_MESSAGE.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

/// Whatever answers a screening turn for the conversation controller.
#[async_trait]
pub trait ScreeningBackend: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;
}

/// Talks to `POST /api/chat` on a running server.
pub struct HttpScreeningClient {
    http: HttpClient,
    endpoint: String,
}

impl HttpScreeningClient {
    pub fn new(
        server_url: &str,
        timeout: Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/chat", server_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ScreeningBackend for HttpScreeningClient {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        debug!("POST {} (history={})", self.endpoint, request.chat_history.len());
        let resp = self.http.post(&self.endpoint).json(request).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<ChatResponse>().await?);
        }

        let message = match resp.json::<ErrorResponse>().await {
            Ok(body) => Some(body.message),
            Err(e) => {
                warn!("Error response from {} had no readable body: {}", self.endpoint, e);
                None
            }
        };
        Err(ClientError::Server { status: status.as_u16(), message })
    }
}

/// Runs the orchestrator in-process, mapping its errors to the status codes the HTTP
/// endpoint would have used.
#[async_trait]
impl ScreeningBackend for PromptOrchestrator {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        self.handle(request.clone()).await.map_err(|e: OrchestratorError| {
            let status = if e.is_client_error() { 400 } else { 500 };
            ClientError::Server { status, message: Some(e.user_message()) }
        })
    }
}
