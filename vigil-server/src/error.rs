//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use vigil_core::ModerationError;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Moderation core error
    #[error("Moderation error: {0}")]
    Moderation(#[from] ModerationError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Moderation(ref e) => match e {
                // Client-provided invalid input → 400
                ModerationError::Validation(_) => StatusCode::BAD_REQUEST,

                ModerationError::NotFound(_) => StatusCode::NOT_FOUND,

                // Review already resolved → 409
                ModerationError::ReviewConflict { .. } => StatusCode::CONFLICT,

                // Providers exhausted or unreachable → 503, the upload is not published
                ModerationError::ScanUnavailable { .. }
                | ModerationError::ProviderTransient { .. }
                | ModerationError::ProviderFatal { .. }
                | ModerationError::CacheDegraded(_) => StatusCode::SERVICE_UNAVAILABLE,

                // Internal processing failures → 500
                ModerationError::Serialization(_) | ModerationError::Configuration(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Moderation(ref e) => match e {
                ModerationError::Validation(_) => "INVALID_INPUT",
                ModerationError::NotFound(_) => "NOT_FOUND",
                ModerationError::ReviewConflict { .. } => "REVIEW_CONFLICT",
                ModerationError::ScanUnavailable { .. }
                | ModerationError::ProviderTransient { .. }
                | ModerationError::ProviderFatal { .. } => "MODERATION_UNAVAILABLE",
                ModerationError::CacheDegraded(_) => "STORAGE_UNAVAILABLE",
                ModerationError::Serialization(_) => "SERIALIZATION_ERROR",
                ModerationError::Configuration(_) => "CONFIGURATION_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Provider names and upstream details stay in the logs
            Self::Moderation(ref e) => match e {
                ModerationError::Validation(msg) | ModerationError::NotFound(msg) => msg.clone(),
                ModerationError::ReviewConflict { state, .. } => {
                    format!("Review already resolved ({state})")
                }
                ModerationError::ScanUnavailable { .. }
                | ModerationError::ProviderTransient { .. }
                | ModerationError::ProviderFatal { .. } => {
                    "Image moderation is temporarily unavailable. Please try again shortly."
                        .to_string()
                }
                ModerationError::CacheDegraded(_) => "Storage temporarily unavailable".to_string(),
                ModerationError::Serialization(_) | ModerationError::Configuration(_) => {
                    "Internal server error".to_string()
                }
            },
            Self::BadRequest(_) => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Moderation(_) => "moderation",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                client_message = %client_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
