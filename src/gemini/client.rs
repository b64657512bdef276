// Gemini conversation session over the generateContent API
// Author: kelexine (https://github.com/kelexine)

use super::models::{Content, GenerateContentRequest, GenerateContentResponse, InlineData, Part};
use super::{ConversationSession, MessagePart, ProviderReply};
use crate::config::{ApiKey, GeminiConfig};
use crate::error::{ChatError, Result};
use crate::utils::logging::sanitize;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// A single Gemini chat that keeps its own history.
///
/// Submissions are serialized by the history lock, which is held for the whole
/// provider call: concurrent requests queue up instead of interleaving turns.
/// History only grows when a call succeeds.
pub struct GeminiSession {
    http_client: Client,
    config: GeminiConfig,
    api_key: ApiKey,
    history: Mutex<Vec<Content>>,
}

impl GeminiSession {
    /// Create a session with an empty history. Makes no network calls.
    pub fn new(config: &GeminiConfig, api_key: ApiKey) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        debug!("Created HTTP client for {}", config.api_base_url);

        Ok(Self {
            http_client,
            config: config.clone(),
            api_key,
            history: Mutex::new(Vec::new()),
        })
    }

    /// Number of recorded contents (user and model turns).
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Call `generateContent`, retrying transient failures.
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<(GenerateContentResponse, Value)> {
        let url = self.endpoint();
        debug!("Calling generateContent for model {} with {} contents", self.config.model, request.contents.len());

        let client = &self.http_client;
        let api_key = self.api_key.expose();
        let url = url.as_str();

        let response_text = crate::utils::retry::with_retry(
            "generateContent",
            self.config.max_retries + 1,
            move || async move {
                let response = client
                    .post(url)
                    .header("x-goog-api-key", api_key)
                    .header("Content-Type", "application/json")
                    .json(request)
                    .send()
                    .await
                    .map_err(|e| (500, format!("HTTP error: {}", e)))?;

                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| (500, format!("Body read error: {}", e)))?;

                if !status.is_success() {
                    return Err((status.as_u16(), body));
                }

                Ok(body)
            },
        )
        .await
        .map_err(|(status, body)| {
            let message = Self::extract_error_message(&body).unwrap_or(body);
            error!("Gemini API error: HTTP {} - {}", status, sanitize(&message));
            ChatError::ProviderError(format!("HTTP {}: {}", status, sanitize(&message)))
        })?;

        debug!(
            "Raw Gemini response (first 500 chars): {}",
            response_text.chars().take(500).collect::<String>()
        );

        let raw: Value = serde_json::from_str(&response_text).map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            ChatError::ProviderError(format!("Response parsing error: {}", e))
        })?;

        if let Some(message) = Self::extract_error_message(&response_text) {
            return Err(ChatError::ProviderError(sanitize(&message)));
        }

        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ChatError::ProviderError(format!("Unexpected response shape: {}", e)))?;

        Ok((parsed, raw))
    }

    /// Extract error message from API response JSON
    fn extract_error_message(response_text: &str) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(serde::Deserialize)]
        struct ErrorDetail {
            message: Option<String>,
            status: Option<String>,
        }

        let error = serde_json::from_str::<ErrorResponse>(response_text).ok()?.error?;
        error.message.or(error.status).or_else(|| Some("unknown error".to_string()))
    }
}

fn to_wire_part(part: MessagePart) -> Part {
    match part {
        MessagePart::Text(text) => Part::text(text),
        MessagePart::Image { mime_type, bytes } => Part::InlineData {
            inline_data: InlineData {
                mime_type,
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        },
    }
}

#[async_trait]
impl ConversationSession for GeminiSession {
    async fn submit(&self, parts: Vec<MessagePart>) -> Result<ProviderReply> {
        let user_turn = Content {
            role: "user".to_string(),
            parts: parts.into_iter().map(to_wire_part).collect(),
        };

        let mut history = self.history.lock().await;

        let mut contents = history.clone();
        contents.push(user_turn.clone());
        let request = GenerateContentRequest { contents };

        let start = Instant::now();
        let result = self.generate_content(&request).await;
        crate::metrics::record_gemini_call(
            &self.config.model,
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        let (response, raw) = result?;

        // Blocked prompts and partless MAX_TOKENS replies have no usable model
        // turn; recording only the user turn would break the alternation.
        if let Some(model_turn) = response.model_content() {
            history.push(user_turn);
            history.push(model_turn);
        }

        if let Some(usage) = &response.usage_metadata {
            debug!(
                "Token usage: prompt={:?} candidates={:?} total={:?}",
                usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
            );
        }

        Ok(ProviderReply {
            text: response.text(),
            raw,
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
