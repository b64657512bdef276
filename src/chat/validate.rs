// Turn validation: image MIME type, size and decodability
// Author: kelexine (https://github.com/kelexine)

use super::{ChatTurn, ImageUpload, ValidatedImage, ValidatedTurn};
use crate::config::UploadConfig;
use crate::error::ChatError;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

const ALLOWED_IMAGE_PREFIX: &str = "image/";

/// Default maximum image size: 5 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    pub max_upload_bytes: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl From<&UploadConfig> for ValidationLimits {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Result of validating a turn. Rejections are ordinary values here.
#[derive(Debug)]
pub enum ValidationOutcome {
    Accepted(ValidatedTurn),
    /// Neither text nor image: answered with the "nothing to send" message.
    Empty,
    Rejected(ChatError),
}

/// Classify a turn. Image checks run in order: declared MIME, size, decodability.
pub fn validate_turn(turn: ChatTurn, limits: &ValidationLimits) -> ValidationOutcome {
    if turn.is_empty() {
        return ValidationOutcome::Empty;
    }

    let image = match turn.image {
        None => None,
        Some(upload) => match validate_image(upload, limits) {
            Ok(image) => Some(image),
            Err(e) => return ValidationOutcome::Rejected(e),
        },
    };

    ValidationOutcome::Accepted(ValidatedTurn {
        text: turn.text,
        image,
    })
}

fn validate_image(upload: ImageUpload, limits: &ValidationLimits) -> Result<ValidatedImage, ChatError> {
    if let Some(mime) = upload.declared_mime.as_deref() {
        if !mime.starts_with(ALLOWED_IMAGE_PREFIX) {
            return Err(ChatError::InvalidFileType(mime.to_string()));
        }
    }

    if upload.bytes.len() > limits.max_upload_bytes {
        return Err(ChatError::FileTooLarge {
            size: upload.bytes.len(),
            limit_bytes: limits.max_upload_bytes,
        });
    }

    let format = sniff_image(&upload.bytes).map_err(|detail| ChatError::UnreadableImage {
        origin: upload.origin,
        detail,
    })?;

    Ok(ValidatedImage { upload, format })
}

/// Detect the raster format from magic bytes and make sure the header decodes.
pub fn sniff_image(bytes: &[u8]) -> Result<ImageFormat, String> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?;

    let format = reader
        .format()
        .ok_or_else(|| "unrecognized image format".to_string())?;

    reader.into_dimensions().map_err(|e| e.to_string())?;

    Ok(format)
}
