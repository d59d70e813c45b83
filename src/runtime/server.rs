use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::models::{ChatMessage, MessageRole, ModelCatalog, ModelClient};
use crate::session::Session;
use crate::utils::SessionError;

/// Shared, read-only server state. Conversations are never stored here.
#[derive(Clone)]
pub struct ServerState {
    client: Arc<dyn ModelClient>,
    catalog: Arc<ModelCatalog>,
}

impl ServerState {
    pub fn new(client: Arc<dyn ModelClient>, catalog: Arc<ModelCatalog>) -> Self {
        Self { client, catalog }
    }
}

/// Body of `POST /api/chat`: the full history, ending with the new user message
#[derive(Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
}

/// A history entry as clients post it
///
/// Either `{ role, text }` or the Gemini shape `{ role, parts: [{ text }] }`.
#[derive(Debug, Deserialize, Serialize)]
pub struct WireMessage {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WirePart {
    #[serde(default)]
    pub text: String,
}

impl From<WireMessage> for ChatMessage {
    fn from(msg: WireMessage) -> Self {
        let text = match msg.text {
            Some(text) => text,
            None => msg.parts.into_iter().map(|part| part.text).collect(),
        };
        ChatMessage {
            role: msg.role,
            text,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error reply with a status code and `{ "error": ... }` body
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::Busy => StatusCode::CONFLICT,
            ref e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Build the API router
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/chat", post(chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: ServerState, host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    let addr = listener.local_addr()?;

    info!("Server running on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn list_models(State(state): State<ServerState>) -> Json<ModelCatalog> {
    Json(state.catalog.as_ref().clone())
}

async fn chat(
    State(state): State<ServerState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(ChatRequest { model, messages }) = payload?;
    let mut messages: Vec<ChatMessage> = messages.into_iter().map(ChatMessage::from).collect();

    let text = match messages.pop() {
        Some(last) if last.role == MessageRole::User => last.text,
        _ => return Err(ApiError::bad_request("Last message must be a user message")),
    };

    // Each request rebuilds its own session from the caller's history
    let session = Session::with_history(state.client, state.catalog, &model, messages)?;
    let reply = session.send_turn(&text).await.map_err(|e| {
        warn!(model = %model, error = %e, "Chat request failed");
        ApiError::from(e)
    })?;

    Ok(Json(ChatResponse { text: reply.text }))
}
