//! Upload validation module
//!
//! Cheap request-level checks run before image bytes reach the moderation
//! core, which performs the authoritative format sniffing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::ApiError;

/// MIME types accepted for image uploads
const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
    "application/octet-stream",
];

/// Validates the Content-Type of an uploaded image
///
/// Accepts JPEG, PNG, WebP and GIF, plus `application/octet-stream` for
/// clients that do not label their uploads. Parameters such as `; charset`
/// are ignored.
pub fn validate_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    match content_type {
        Some(ct) => {
            let essence = ct.split(';').next().unwrap_or("").trim().to_lowercase();
            if ALLOWED_IMAGE_TYPES.contains(&essence.as_str()) {
                Ok(())
            } else {
                Err(ApiError::bad_request(format!(
                    "Unsupported Content-Type: '{ct}'. \
                     Allowed types: image/jpeg, image/png, image/webp, image/gif"
                )))
            }
        }
        // Allow missing Content-Type (treat as binary)
        None => Ok(()),
    }
}

/// Validates the size of an uploaded file
///
/// Returns an error if the file exceeds the maximum size.
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ApiError> {
    if size > max_size {
        Err(ApiError::bad_request(format!(
            "File too large: {} bytes exceeds maximum of {} bytes",
            size, max_size
        )))
    } else {
        Ok(())
    }
}

/// Validates an uploader id: trimmed, non-empty, at most 128 characters.
pub fn validate_uploader_id(uploader_id: Option<&str>) -> Result<String, ApiError> {
    let uploader_id = uploader_id.map(str::trim).unwrap_or("");
    if uploader_id.is_empty() {
        return Err(ApiError::bad_request("uploader_id is required"));
    }
    if uploader_id.chars().count() > 128 {
        return Err(ApiError::bad_request(
            "uploader_id must be at most 128 characters",
        ));
    }
    Ok(uploader_id.to_string())
}

/// Decodes a base64 image, stripping an optional `data:image/...;base64,` prefix.
pub fn decode_base64_image(encoded: &str, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let encoded = encoded.trim();
    let payload = match encoded.strip_prefix("data:") {
        Some(data_url) => {
            let (media_type, payload) = data_url
                .split_once(',')
                .ok_or_else(|| ApiError::bad_request("Malformed data URL"))?;
            let media_type = media_type.strip_suffix(";base64").ok_or_else(|| {
                ApiError::bad_request("Data URL must be base64-encoded")
            })?;
            validate_content_type(Some(media_type))?;
            payload
        }
        None => encoded,
    };

    // Base64 expands by 4/3; reject before allocating the decoded buffer
    validate_file_size(payload.len() / 4 * 3, max_size)?;

    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ApiError::bad_request(format!("Invalid base64 image: {}", e)))?;
    validate_file_size(bytes.len(), max_size)?;
    Ok(bytes)
}
