//! Image moderation handlers
//!
//! Handles POST /moderation/scan (multipart) and POST /moderation/scan/base64 (JSON).

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vigil_core::{ScanOutcome, Verdict};

use crate::error::ApiError;
use crate::multipart::MultipartFields;
use crate::state::AppState;
use crate::validation::{decode_base64_image, validate_uploader_id};

/// Response for a moderation scan
#[derive(Serialize, ToSchema)]
pub struct ScanResponse {
    /// SHA3-256 fingerprint of the image bytes (hex)
    #[schema(example = "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532")]
    pub fingerprint: String,
    /// Moderation verdict: approved, pending_review or rejected
    #[schema(example = "approved")]
    pub verdict: String,
    /// Whether the image may be published now
    #[schema(example = true)]
    pub approved: bool,
    /// Whether the image awaits a moderator
    #[schema(example = false)]
    pub pending: bool,
    /// Generic explanation for the uploader
    #[schema(example = "Image approved for upload.")]
    pub message: String,
    /// Whether the decision came from the cache
    #[schema(example = false)]
    pub cached: bool,
    /// Classifier that decided (moderent, hive or manual_review)
    #[schema(example = "moderent")]
    pub provider: String,
    /// Time spent moderating this request
    #[schema(example = 412)]
    pub scan_duration_ms: u64,
}

impl From<ScanOutcome> for ScanResponse {
    fn from(outcome: ScanOutcome) -> Self {
        let verdict = outcome.verdict();
        Self {
            fingerprint: outcome.decision.fingerprint.to_string(),
            verdict: verdict.to_string(),
            approved: verdict == Verdict::Approved,
            pending: verdict == Verdict::PendingReview,
            message: outcome.message.to_string(),
            cached: outcome.cached,
            provider: outcome.decision.provider.to_string(),
            scan_duration_ms: u64::try_from(outcome.scan_duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Moderate an uploaded image
///
/// Accepts multipart/form-data with:
/// - **file** (required): JPEG, PNG, WebP or GIF image
/// - **uploader_id** (required): Id of the uploading user
///
/// Identical images are scanned once and the decision is reused for 24 hours
/// (1 hour while pending review). The response never reveals which
/// categories were detected.
#[utoipa::path(
    post,
    path = "/moderation/scan",
    tag = "Moderation",
    request_body(
        content_type = "multipart/form-data",
        description = "Image file and uploader id"
    ),
    responses(
        (status = 200, description = "Image moderated", body = ScanResponse),
        (status = 400, description = "Invalid request (missing file, not an image, too large)"),
        (status = 503, description = "Moderation providers unavailable, image not published")
    )
)]
pub async fn scan_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ScanResponse>, ApiError> {
    let mut fields = MultipartFields::parse(&mut multipart, state.max_image_size).await?;
    let uploader_id = validate_uploader_id(fields.get_text("uploader_id"))?;
    let file = fields.take_file()?;

    tracing::debug!(
        uploader_id = %uploader_id,
        content_type = ?file.content_type,
        bytes = file.data.len(),
        "Multipart image received"
    );

    let outcome = state.moderation.scan(file.data, &uploader_id).await?;
    Ok(Json(outcome.into()))
}

/// Request for moderating a base64-encoded image
#[derive(Deserialize, ToSchema)]
pub struct ScanBase64Request {
    /// Base64 image, optionally as a `data:image/...;base64,` URL
    #[schema(example = "data:image/png;base64,iVBORw0KGgo...")]
    pub image_base64: String,
    /// Id of the uploading user
    #[schema(example = "user-42")]
    pub uploader_id: String,
}

/// Moderate a base64-encoded image
#[utoipa::path(
    post,
    path = "/moderation/scan/base64",
    tag = "Moderation",
    request_body = ScanBase64Request,
    responses(
        (status = 200, description = "Image moderated", body = ScanResponse),
        (status = 400, description = "Invalid request (bad base64, not an image, too large)"),
        (status = 503, description = "Moderation providers unavailable, image not published")
    )
)]
pub async fn scan_base64_handler(
    State(state): State<AppState>,
    Json(request): Json<ScanBase64Request>,
) -> Result<Json<ScanResponse>, ApiError> {
    let uploader_id = validate_uploader_id(Some(&request.uploader_id))?;
    let image = decode_base64_image(&request.image_base64, state.max_image_size)?;

    let outcome = state.moderation.scan(image, &uploader_id).await?;
    Ok(Json(outcome.into()))
}
