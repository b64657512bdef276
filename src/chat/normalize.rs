// Request normalization: multipart and legacy JSON bodies into a ChatTurn
// Author: kelexine (https://github.com/kelexine)

use super::{ChatTurn, ImageOrigin, ImageUpload};
use crate::error::{ChatError, Result, MSG_INVALID_BASE64, MSG_INVALID_JSON, MSG_INVALID_MULTIPART};
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::{alphabet, Engine};
use serde_json::Value;
use tracing::debug;

const MESSAGE_FIELD: &str = "message";
const IMAGE_FIELD: &str = "image";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Standard alphabet that tolerates non-zero trailing bits (`"QR=="`).
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Whether a `Content-Type` header selects the multipart path.
pub fn is_multipart(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// A file part from a multipart form.
#[derive(Debug, Clone, Default)]
pub struct FilePart {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

/// The fields of a multipart chat form that matter to us.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub message: Option<String>,
    pub image: Option<FilePart>,
}

impl MultipartForm {
    /// Drain a multipart body. Repeated fields keep the last value; unknown fields are skipped.
    ///
    /// An `image` part without a filename is a plain form value, not a file, and
    /// is skipped. Hitting the body cap is reported against `max_upload_bytes`.
    pub async fn read(mut multipart: Multipart, max_upload_bytes: usize) -> Result<Self> {
        let mut form = MultipartForm::default();
        let reject = |e: MultipartError| multipart_error(e, max_upload_bytes);

        while let Some(field) = multipart.next_field().await.map_err(reject)? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(MESSAGE_FIELD) => {
                    form.message = Some(field.text().await.map_err(reject)?);
                }
                Some(IMAGE_FIELD) if field.file_name().is_none() => {
                    debug!("Ignoring non-file image field");
                }
                Some(IMAGE_FIELD) => {
                    let content_type = field.content_type().map(str::to_owned);
                    let file_name = field.file_name().map(str::to_owned);
                    let bytes = field.bytes().await.map_err(reject)?;
                    form.image = Some(FilePart {
                        bytes: bytes.to_vec(),
                        content_type,
                        file_name,
                    });
                }
                other => {
                    debug!("Ignoring multipart field {:?}", other);
                }
            }
        }

        Ok(form)
    }
}

fn multipart_error(e: MultipartError, max_upload_bytes: usize) -> ChatError {
    debug!("Failed to read multipart body ({}): {}", e.status(), e.body_text());
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ChatError::BodyTooLarge {
            limit_bytes: max_upload_bytes,
        }
    } else {
        ChatError::MalformedInput(MSG_INVALID_MULTIPART.to_string())
    }
}

/// Normalize a parsed multipart form.
///
/// An `image` part with neither a file name nor content is what browsers send
/// for an untouched file input, so it counts as no image at all.
pub fn normalize_multipart(form: MultipartForm) -> ChatTurn {
    let text = form.message.as_deref().unwrap_or_default().trim().to_string();

    let image = form
        .image
        .filter(|part| {
            !(part.bytes.is_empty() && part.file_name.as_deref().unwrap_or_default().is_empty())
        })
        .map(|part| ImageUpload {
            bytes: part.bytes,
            declared_mime: Some(
                part.content_type
                    .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
            ),
            file_name: part.file_name,
            origin: ImageOrigin::Upload,
        });

    ChatTurn { text, image }
}

/// Normalize a legacy JSON body: `{"message"?: string, "image"?: string}`.
///
/// An empty body is treated as `{}`. The image may be a bare base64 payload or
/// a data URL; its MIME type is left unknown and sniffed later.
pub fn normalize_json(body: &[u8]) -> Result<ChatTurn> {
    let payload: Value = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body).map_err(|e| {
            debug!("Rejecting JSON body: {}", e);
            ChatError::MalformedInput(MSG_INVALID_JSON.to_string())
        })?
    };

    let object = payload
        .as_object()
        .ok_or_else(|| ChatError::MalformedInput(MSG_INVALID_JSON.to_string()))?;

    let text = match object.get(MESSAGE_FIELD) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(ChatError::MalformedInput(MSG_INVALID_JSON.to_string())),
    };

    let image = match object.get(IMAGE_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(ImageUpload {
            bytes: decode_base64_image(s)?,
            declared_mime: None,
            file_name: None,
            origin: ImageOrigin::Inline,
        }),
        Some(_) => return Err(ChatError::MalformedInput(MSG_INVALID_BASE64.to_string())),
    };

    Ok(ChatTurn { text, image })
}

/// Everything after the first comma, or the whole string when there is none.
pub fn strip_data_url_prefix(image: &str) -> &str {
    image.split_once(',').map(|(_, payload)| payload).unwrap_or(image)
}

/// Decode a bare base64 payload or a `data:<mime>;base64,<payload>` URL.
pub fn decode_base64_image(image: &str) -> Result<Vec<u8>> {
    let payload: String = strip_data_url_prefix(image)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    LENIENT_BASE64
        .decode(payload.as_bytes())
        .map_err(|e| {
            debug!("Rejecting base64 image: {}", e);
            ChatError::MalformedInput(MSG_INVALID_BASE64.to_string())
        })
}
