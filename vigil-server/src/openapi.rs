//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 specification for the Vigil moderation API.

use utoipa::OpenApi;

use crate::handlers::{
    DecisionSummary, HealthResponse, ModerationConfigResponse, ReadyResponse,
    ResolveReviewRequest, ReviewSummary, ScanBase64Request, ScanResponse, StatusResponse,
    ThresholdBand, ThresholdsBody, UploaderStatusResponse,
};

/// Vigil moderation API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vigil - Image Moderation API",
        version = "0.1.0",
        description = r#"
## Image Moderation Gate

Every uploaded image is checked by an external content classifier before it
can be published.

### How It Works

1. **Scan** an image via `POST /moderation/scan` (multipart) or
   `POST /moderation/scan/base64` (JSON)
2. The image is fingerprinted; identical bytes reuse a cached decision
3. Otherwise the primary classifier is tried up to 3 times, then the fallback
4. The verdict is `approved`, `pending_review` or `rejected`
5. Moderators resolve pending reviews via `POST /reviews/{fingerprint}/resolve`

Responses never reveal which categories were detected or their scores.
If both classifiers are unavailable the request fails with 503 and the
image is not published.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Moderation", description = "Scan uploaded images"),
        (name = "Status", description = "Moderation status by image or uploader"),
        (name = "Review", description = "Moderator resolution of pending reviews"),
        (name = "Policy", description = "Thresholds and moderation policy"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::scan::scan_handler,
        crate::handlers::scan::scan_base64_handler,
        crate::handlers::status::status_handler,
        crate::handlers::status::uploader_status_handler,
        crate::handlers::review::resolve_review_handler,
        crate::handlers::settings::get_config_handler,
        crate::handlers::settings::update_thresholds_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            ScanResponse,
            ScanBase64Request,
            StatusResponse,
            DecisionSummary,
            ReviewSummary,
            UploaderStatusResponse,
            ResolveReviewRequest,
            ModerationConfigResponse,
            ThresholdsBody,
            ThresholdBand,
        )
    )
)]
pub struct ApiDoc;
