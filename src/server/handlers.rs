// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::chat::normalize::{is_multipart, normalize_json, normalize_multipart, MultipartForm};
use crate::chat::ChatReply;
use crate::error::{ChatError, Result, MSG_INVALID_MULTIPART};
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

const MSG_UNREADABLE_BODY: &str = "Invalid request body.";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    // Conversation session
    let session_check = match state.gateway.session() {
        Some(session) => HealthCheck {
            status: "ok".to_string(),
            message: format!("Session ready, model {}", session.model()),
        },
        None => {
            overall_status = HealthStatus::Degraded;
            HealthCheck {
                status: "error".to_string(),
                message: "No API key configured or session construction failed".to_string(),
            }
        }
    };
    checks.insert("conversation_session".to_string(), session_check);

    // Upload limits and storage
    let upload_check = HealthCheck {
        status: "ok".to_string(),
        message: format!(
            "Max upload {} bytes, media root {}",
            state.gateway.limits().max_upload_bytes,
            state.config.upload.media_root
        ),
    };
    checks.insert("uploads".to_string(), upload_check);

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Prometheus scrape endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

/// Handler for the chat endpoint.
///
/// Accepts `multipart/form-data` (`message`, `image`) or a legacy JSON body
/// (`{"message", "image"}` with a base64 or data-URL image). Always answers
/// with `{"response": ..., "image_url"?: ...}`.
pub async fn chat_send_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();

    let (outcome, response) = match process_chat(&state, request).await {
        Ok(reply) => {
            let outcome = if reply == ChatReply::nothing_to_send() {
                "empty"
            } else {
                "success"
            };
            (outcome, Json(reply).into_response())
        }
        Err(e) => (e.kind(), e.into_response()),
    };

    crate::metrics::record_chat_request(
        outcome,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

async fn process_chat(state: &AppState, request: Request) -> Result<ChatReply> {
    // Cheapest check first: without a session nothing else matters
    state.gateway.ensure_available()?;

    let max_upload_bytes = state.gateway.limits().max_upload_bytes;
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let turn = if is_multipart(content_type.as_deref()) {
        debug!("Reading multipart chat request");
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| body_error(e.status(), MSG_INVALID_MULTIPART, &e.body_text(), max_upload_bytes))?;
        normalize_multipart(MultipartForm::read(multipart, max_upload_bytes).await?)
    } else {
        debug!("Reading JSON chat request");
        let body = Bytes::from_request(request, state)
            .await
            .map_err(|e| body_error(e.status(), MSG_UNREADABLE_BODY, &e.body_text(), max_upload_bytes))?;
        normalize_json(&body)?
    };

    state.gateway.handle_turn(turn).await
}

/// Map an extractor rejection. Only an image can push a chat body past the
/// transport cap, so that case reports the image limit.
fn body_error(status: StatusCode, message: &str, detail: &str, max_upload_bytes: usize) -> ChatError {
    debug!("Rejecting request body ({}): {}", status, detail);
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ChatError::BodyTooLarge {
            limit_bytes: max_upload_bytes,
        }
    } else {
        ChatError::MalformedInput(message.to_string())
    }
}

/// Render a handler panic as the generic internal-error payload.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    crate::metrics::record_chat_request("panic", 500, 0.0);
    ChatError::InternalError(format!("Handler panicked: {}", detail)).into_response()
}
