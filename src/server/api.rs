use crate::models::chat::{ ChatRequest, ErrorResponse };
use crate::orchestrator::PromptOrchestrator;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    body::Bytes,
    routing::{ get, post },
    Router,
    extract::State,
    response::{ IntoResponse, Response },
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn };

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    details: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PromptOrchestrator>,
    pub prompts_path: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TlsPaths {
    pub cert_path: String,
    pub key_path: String,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat_handler).fallback(method_not_allowed))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: SocketAddr,
    state: AppState,
    tls: Option<TlsPaths>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = build_router(state);

    match tls {
        Some(tls) => {
            let _ = rustls::crypto::ring::default_provider().install_default();
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &tls.cert_path,
                &tls.key_path
            ).await?;
            info!("HTTPS server listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
        }
        None => {
            let listener = tokio::net::TcpListener
                ::bind(addr).await
                .map_err(|e| format!("Failed to bind HTTP server to {}: {}", addr, e))?;
            info!("HTTP server listening on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { message: message.into() })).into_response()
}

async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ChatRequest::default()
    } else {
        match serde_json::from_slice::<ChatRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected malformed chat request body: {}", e);
                return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
            }
        }
    };

    match state.orchestrator.handle(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, e.user_message())
        }
    }
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let path = match &state.prompts_path {
        Some(path) => path,
        None => {
            return (
                StatusCode::OK,
                Json(ReloadResponse {
                    success: true,
                    message: "Reload complete".into(),
                    details: Some(vec!["Built-in prompts in use, nothing to reload".into()]),
                }),
            );
        }
    };

    let (ok, detail) = match state.orchestrator.reload_prompts_if_changed(path).await {
        Ok(true) => (true, "Local reloaded".to_string()),
        Ok(false) => (true, "Local unchanged".to_string()),
        Err(e) => {
            warn!("Prompt reload from {} failed: {}", path, e);
            (false, format!("Local error: {}", e))
        }
    };

    let code = if ok { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    (
        code,
        Json(ReloadResponse {
            success: ok,
            message: if ok { "Reload complete".into() } else { "Reload errors".into() },
            details: Some(vec![detail]),
        }),
    )
}
