//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod review;
pub mod scan;
pub mod settings;
pub mod status;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use review::{resolve_review_handler, ResolveReviewRequest};
pub use scan::{scan_base64_handler, scan_handler, ScanBase64Request, ScanResponse};
pub use settings::{
    get_config_handler, update_thresholds_handler, ModerationConfigResponse, ThresholdBand,
    ThresholdsBody,
};
pub use status::{
    status_handler, uploader_status_handler, DecisionSummary, ReviewSummary, StatusResponse,
    UploaderStatusResponse,
};
