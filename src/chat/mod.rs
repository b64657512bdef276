//! Chat turn processing: normalization, validation and dispatch.
//!
//! A request moves through three stages before a JSON response is produced:
//!
//! - `normalize`: turns a multipart form or a legacy JSON/base64 body into a [`ChatTurn`].
//! - `validate`: checks the attached image and classifies the turn as a [`ValidationOutcome`].
//! - `gateway`: submits accepted turns to the shared conversation session.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod gateway;
pub mod normalize;
pub mod validate;

pub use gateway::{ChatReply, SessionGateway};
pub use normalize::{normalize_json, normalize_multipart, MultipartForm};
pub use validate::{validate_turn, ValidationLimits, ValidationOutcome};

use image::ImageFormat;

/// Where an image entered the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    /// A `multipart/form-data` file field.
    Upload,
    /// A base64 string (optionally a data URL) inside a JSON body.
    Inline,
}

/// Raw image bytes as received, before any checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// MIME type declared by the client. Always `None` for inline images.
    pub declared_mime: Option<String>,
    pub file_name: Option<String>,
    pub origin: ImageOrigin,
}

/// One unit of user input, in canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatTurn {
    /// Trimmed message text, possibly empty.
    pub text: String,
    pub image: Option<ImageUpload>,
}

impl ChatTurn {
    /// Whether there is anything to forward to the session.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.image.is_none()
    }
}

/// An image that passed every check, with its sniffed raster format.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub upload: ImageUpload,
    pub format: ImageFormat,
}

impl ValidatedImage {
    /// MIME type sent upstream: the sniffed format wins over the declared one.
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.upload.bytes
    }
}

/// A turn ready for dispatch.
#[derive(Debug, Clone)]
pub struct ValidatedTurn {
    pub text: String,
    pub image: Option<ValidatedImage>,
}
