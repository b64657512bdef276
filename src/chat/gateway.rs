// Session gateway: dispatches validated turns to the shared conversation
// Author: kelexine (https://github.com/kelexine)

use super::validate::{validate_turn, ValidationLimits, ValidationOutcome};
use super::{ChatTurn, ImageOrigin, ValidatedImage, ValidatedTurn};
use crate::error::{ChatError, Result};
use crate::gemini::{ConversationSession, MessagePart};
use crate::storage::BlobStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const MSG_NOTHING_TO_SEND: &str = "Please send text or an image.";

/// Stored name for images that arrived as base64 inside JSON.
const INLINE_IMAGE_NAME: &str = "uploaded_from_json.png";

/// Successful endpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ChatReply {
    pub fn nothing_to_send() -> Self {
        Self {
            response: MSG_NOTHING_TO_SEND.to_string(),
            image_url: None,
        }
    }
}

/// Owns the handle to the process-wide conversation session.
///
/// `session` is `None` when startup could not construct one; every turn is
/// then refused with `ServiceUnavailable`.
#[derive(Clone)]
pub struct SessionGateway {
    session: Option<Arc<dyn ConversationSession>>,
    blob_store: Arc<dyn BlobStore>,
    limits: ValidationLimits,
}

impl SessionGateway {
    pub fn new(
        session: Option<Arc<dyn ConversationSession>>,
        blob_store: Arc<dyn BlobStore>,
        limits: ValidationLimits,
    ) -> Self {
        Self {
            session,
            blob_store,
            limits,
        }
    }

    pub fn is_available(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Arc<dyn ConversationSession>> {
        self.session.as_ref()
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Fail fast when running without a session.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(ChatError::ServiceUnavailable)
        }
    }

    /// Validate a normalized turn and, if accepted, send it to the session.
    pub async fn handle_turn(&self, turn: ChatTurn) -> Result<ChatReply> {
        let session = self.session.clone().ok_or(ChatError::ServiceUnavailable)?;

        match validate_turn(turn, &self.limits) {
            ValidationOutcome::Empty => {
                debug!("Nothing to send");
                Ok(ChatReply::nothing_to_send())
            }
            ValidationOutcome::Rejected(e) => Err(e),
            ValidationOutcome::Accepted(turn) => self.dispatch(session, turn).await,
        }
    }

    async fn dispatch(
        &self,
        session: Arc<dyn ConversationSession>,
        turn: ValidatedTurn,
    ) -> Result<ChatReply> {
        let parts = build_parts(&turn);
        info!(
            "Dispatching turn: text_chars={}, image={}",
            turn.text.chars().count(),
            turn.image.as_ref().map(|i| i.mime_type()).unwrap_or("none")
        );

        // Run the exchange to completion even if the client goes away, so the
        // shared history never sees a half-applied turn.
        let exchange = tokio::spawn(async move { session.submit(parts).await });

        let reply = match exchange.await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                return Err(match e {
                    ChatError::ProviderError(_) => e,
                    other => ChatError::ProviderError(other.to_string()),
                });
            }
            Err(e) => {
                return Err(ChatError::InternalError(format!("Session task failed: {}", e)));
            }
        };

        let image_url = match &turn.image {
            Some(image) => self.persist(image).await,
            None => None,
        };

        Ok(ChatReply {
            response: reply.reply_text(),
            image_url,
        })
    }

    /// Best-effort: a storage failure is logged and never fails the reply.
    async fn persist(&self, image: &ValidatedImage) -> Option<String> {
        let name = stored_name(image);
        match self.blob_store.store(image.bytes(), &name).await {
            Ok(asset) => {
                crate::metrics::record_blob_write(true);
                Some(asset.url)
            }
            Err(e) => {
                crate::metrics::record_blob_write(false);
                error!("Error saving uploaded image {}: {}", name, e);
                None
            }
        }
    }
}

/// Provider message for a turn: text first, then the image.
pub fn build_parts(turn: &ValidatedTurn) -> Vec<MessagePart> {
    let mut parts = Vec::with_capacity(2);
    if !turn.text.is_empty() {
        parts.push(MessagePart::Text(turn.text.clone()));
    }
    if let Some(image) = &turn.image {
        parts.push(MessagePart::Image {
            mime_type: image.mime_type().to_string(),
            bytes: image.bytes().to_vec(),
        });
    }
    parts
}

fn stored_name(image: &ValidatedImage) -> String {
    match image.upload.origin {
        ImageOrigin::Inline => INLINE_IMAGE_NAME.to_string(),
        ImageOrigin::Upload => match image.upload.file_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                let ext = image.format.extensions_str().first().copied().unwrap_or("img");
                warn!("Upload has no file name; storing as upload.{}", ext);
                format!("upload.{}", ext)
            }
        },
    }
}
