//! HTTP routes: callback webhook, backend registration and the conversation API

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, BridgeError};
use crate::config::WEBHOOK_PATH;
use crate::correlator::CorrelatorHandle;
use crate::dispatch::{Utterance, parse_url};
use crate::inbound::{AckStatus, InboundReceiver};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub bridge: Bridge,
    pub receiver: InboundReceiver,
    pub correlator: CorrelatorHandle,
    pub webhook_id: Arc<str>,
}

/// Error body returned by every route
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        let status = match &e {
            BridgeError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::Transport { .. } | BridgeError::Backend { .. } => StatusCode::BAD_GATEWAY,
            BridgeError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::EmptyUtterance => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    callback_url: Option<String>,
}

/// Body of `POST /api/conversation`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl ConversationRequest {
    fn timeout(&self) -> Result<Option<Duration>, ApiError> {
        match self.timeout_secs {
            None => Ok(None),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|_| ApiError::bad_request(format!("Invalid timeout_secs: {}", secs))),
        }
    }

    fn into_utterance(self) -> Utterance {
        Utterance {
            text: self.text,
            language: self.language,
            sender_id: self.sender_id,
            conversation_id: self.conversation_id,
            device_id: self.device_id,
        }
    }
}

/// Build the router for all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/metrics", get(metrics))
        .route("/api/register", post(register))
        .route("/api/conversation", post(conversation))
        .route(&format!("{}/:webhook_id", WEBHOOK_PATH), post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let target = state.bridge.dispatcher().target();
    Json(serde_json::json!({
        "status": "ok",
        "agent": state.bridge.agent_name(),
        "version": env!("CARGO_PKG_VERSION"),
        "backend": target.current(),
        "backend_registered_at": target.registered_at(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let metrics = state
        .correlator
        .metrics()
        .await
        .map_err(|e| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok(Json(metrics).into_response())
}

async fn webhook(State(state): State<AppState>, Path(webhook_id): Path<String>, body: Bytes) -> Response {
    if !webhook_id_matches(&webhook_id, &state.webhook_id) {
        warn!("Callback for unknown webhook id");
        return ApiError::new(StatusCode::NOT_FOUND, "Unknown webhook").into_response();
    }

    let ack = state.receiver.deliver(&body).await;
    debug!(ack = ack.label(), "webhook: acknowledged");
    let status = StatusCode::from_u16(ack.http_status()).unwrap_or(StatusCode::OK);
    let body = match &ack {
        AckStatus::Malformed(e) => serde_json::json!({ "status": ack.label(), "error": e.to_string() }),
        _ => serde_json::json!({ "status": ack.label() }),
    };
    (status, Json(body)).into_response()
}

/// Compare webhook ids without leaking how many leading bytes matched
fn webhook_id_matches(given: &str, expected: &str) -> bool {
    bool::from(given.as_bytes().ct_eq(expected.as_bytes()))
}

async fn register(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: RegisterRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;

    let url = request
        .callback_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing callback_url"))?;
    parse_url(url).map_err(|e| ApiError::bad_request(e.to_string()))?;

    state.bridge.dispatcher().target().register(url);
    info!(%url, "Backend registered");
    Ok(Json(serde_json::json!({ "status": "ok" })).into_response())
}

async fn conversation(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: ConversationRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;
    let timeout = request.timeout()?;
    debug!(?timeout, "conversation: called");

    let reply = state
        .bridge
        .process_utterance(request.into_utterance(), timeout)
        .await?;
    Ok(Json(reply).into_response())
}
