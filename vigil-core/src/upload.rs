//! Upload validation and the per-attempt moderation request.

use chrono::{DateTime, Utc};
use image::ImageFormat;

use crate::error::{ModerationError, Result};
use crate::fingerprint::{fingerprint, ContentFingerprint};

/// Default maximum image size in bytes (2 MB)
pub const DEFAULT_MAX_IMAGE_SIZE: usize = 2 * 1024 * 1024;

/// Image formats accepted by the gate.
const ACCEPTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Gif,
];

/// Image bytes that passed validation.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl ImageUpload {
    /// Validate raw bytes as a supported image no larger than `max_size`.
    ///
    /// The format is sniffed from magic bytes; the image is never decoded.
    pub fn new(bytes: Vec<u8>, max_size: usize) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ModerationError::Validation("Image is empty".into()));
        }
        if bytes.len() > max_size {
            return Err(ModerationError::Validation(format!(
                "Image too large: {} bytes exceeds maximum of {} bytes",
                bytes.len(),
                max_size
            )));
        }

        let format = image::guess_format(&bytes)
            .map_err(|_| ModerationError::Validation("Upload is not a recognized image".into()))?;

        if !ACCEPTED_FORMATS.contains(&format) {
            return Err(ModerationError::Validation(format!(
                "Unsupported image format: {format:?}. Allowed: JPEG, PNG, WebP, GIF"
            )));
        }

        Ok(Self { bytes, format })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A single upload attempt. Lives only for the duration of one scan.
#[derive(Debug, Clone)]
pub struct ModerationRequest {
    pub fingerprint: ContentFingerprint,
    pub uploader_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl ModerationRequest {
    pub fn new(upload: &ImageUpload, uploader_id: &str) -> Result<Self> {
        let uploader_id = uploader_id.trim();
        if uploader_id.is_empty() {
            return Err(ModerationError::Validation("uploader_id is required".into()));
        }

        Ok(Self {
            fingerprint: fingerprint(upload.bytes()),
            uploader_id: uploader_id.to_string(),
            submitted_at: Utc::now(),
        })
    }
}
