// Error types for gemchat
// Author: kelexine (https://github.com/kelexine)

use crate::chat::ImageOrigin;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

pub const MSG_SERVICE_UNAVAILABLE: &str = "AI service is unavailable due to configuration error.";
pub const MSG_PROVIDER_ERROR: &str = "Sorry, the AI assistant encountered an error. Please try again.";
pub const MSG_INTERNAL_ERROR: &str = "Internal server error.";
pub const MSG_INVALID_JSON: &str = "Invalid JSON format.";
pub const MSG_INVALID_BASE64: &str = "Invalid base64 image data.";
pub const MSG_INVALID_MULTIPART: &str = "Invalid multipart form data.";
pub const MSG_INVALID_FILE_TYPE: &str = "Invalid file type. Only images are allowed.";

#[derive(Error, Debug)]
pub enum ChatError {
    /// Unparseable body, multipart form or base64 payload. Carries the user-facing reason.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    #[error("Image of {size} bytes exceeds the {limit_bytes} byte limit")]
    FileTooLarge { size: usize, limit_bytes: usize },

    /// The body hit the transport cap before the image could be measured.
    #[error("Request body over the transport cap (image limit {limit_bytes} bytes)")]
    BodyTooLarge { limit_bytes: usize },

    #[error("Unreadable {origin:?} image: {detail}")]
    UnreadableImage { origin: ImageOrigin, detail: String },

    #[error("Conversation session is not configured")]
    ServiceUnavailable,

    #[error("Gemini API error: {0}")]
    ProviderError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::MalformedInput(_)
            | ChatError::InvalidFileType(_)
            | ChatError::FileTooLarge { .. }
            | ChatError::BodyTooLarge { .. }
            | ChatError::UnreadableImage { .. } => StatusCode::BAD_REQUEST,
            ChatError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the end user. Never includes provider or IO detail.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::MalformedInput(reason) => reason.clone(),
            ChatError::InvalidFileType(_) => MSG_INVALID_FILE_TYPE.to_string(),
            ChatError::FileTooLarge { limit_bytes, .. } | ChatError::BodyTooLarge { limit_bytes } => {
                format!("Image too large (max {}MB).", limit_bytes / (1024 * 1024))
            }
            ChatError::UnreadableImage { origin, .. } => match origin {
                ImageOrigin::Upload => "Failed to process uploaded image.".to_string(),
                ImageOrigin::Inline => "Failed to decode image.".to_string(),
            },
            ChatError::ServiceUnavailable => MSG_SERVICE_UNAVAILABLE.to_string(),
            ChatError::ProviderError(_) => MSG_PROVIDER_ERROR.to_string(),
            _ => MSG_INTERNAL_ERROR.to_string(),
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::MalformedInput(_) => "malformed_input",
            ChatError::InvalidFileType(_) => "invalid_file_type",
            ChatError::FileTooLarge { .. } | ChatError::BodyTooLarge { .. } => "file_too_large",
            ChatError::UnreadableImage { .. } => "unreadable_image",
            ChatError::ServiceUnavailable => "service_unavailable",
            ChatError::ProviderError(_) => "provider_error",
            _ => "internal_error",
        }
    }
}

// Convert ChatError to the endpoint's JSON contract for Axum
impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "{}", self);
        } else {
            warn!(kind = self.kind(), "{}", self);
        }

        let body = json!({ "response": self.user_message() });
        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
