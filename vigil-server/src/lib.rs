//! Vigil Server Library - REST API for the image moderation gate
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod error;
pub mod handlers;
pub mod multipart;
pub mod openapi;
pub mod review_store;
pub mod routes;
pub mod state;
pub mod validation;

pub use config::Config;
pub use error::ApiError;
pub use openapi::ApiDoc;
pub use review_store::{review_store_from_config, PostgresReviewStore, ReviewStoreError};
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;
