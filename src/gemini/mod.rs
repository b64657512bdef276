// Gemini conversation session module
// Author: kelexine (https://github.com/kelexine)

mod client;
pub mod models;

pub use client::GeminiSession;

use crate::config::GeminiConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One element of a multimodal user message. Order is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Text(String),
    Image { mime_type: String, bytes: Vec<u8> },
}

/// A provider reply: the direct answer text when the response carried one,
/// plus the raw response body.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub text: Option<String>,
    pub raw: Value,
}

impl ProviderReply {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: Value::String(text.clone()),
            text: Some(text),
        }
    }

    /// Reply text, never empty. Tries the direct text, then a top-level
    /// `text` entry of the raw body, then the raw body rendered as a string.
    pub fn reply_text(&self) -> String {
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            return text.to_string();
        }

        if let Some(text) = self
            .raw
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            return text.to_string();
        }

        match &self.raw {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::String(_) => "\"\"".to_string(),
            other => other.to_string(),
        }
    }
}

/// A stateful conversation with the AI provider. Every call appends to the
/// same history.
#[async_trait]
pub trait ConversationSession: Send + Sync {
    /// Send one user turn and return the model's reply.
    async fn submit(&self, parts: Vec<MessagePart>) -> Result<ProviderReply>;

    /// Model name, for logs and health reporting.
    fn model(&self) -> &str;
}

/// Build the process-wide session once at startup.
///
/// Returns `None` when no API key is configured or the client cannot be
/// constructed; the server then runs in degraded mode.
pub fn bootstrap(config: &GeminiConfig) -> Option<Arc<dyn ConversationSession>> {
    let Some(api_key) = config.api_key.as_ref().filter(|k| !k.is_empty()) else {
        warn!("GEMINI_API_KEY not configured. Chat functionality will not work.");
        return None;
    };

    match GeminiSession::new(config, api_key.clone()) {
        Ok(session) => {
            info!("Gemini session initialized with model {}", session.model());
            Some(Arc::new(session))
        }
        Err(e) => {
            error!("Error initializing Gemini session: {}", e);
            None
        }
    }
}
