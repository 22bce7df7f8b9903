//! Review record storage
//!
//! Review records are durable: they are kept in PostgreSQL when
//! `DATABASE_URL` is set. Without it the server falls back to in-memory
//! storage (useful for development, but pending reviews are lost on restart).

mod postgres;

pub use postgres::PostgresReviewStore;

use std::sync::Arc;

use thiserror::Error;
use vigil_core::{MemoryReviewStore, ModerationError, ReviewStore};

use crate::config::Config;

/// Storage errors
#[derive(Debug, Error)]
pub enum ReviewStoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Corrupt review row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for ReviewStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ReviewStoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Migration(e.to_string())
    }
}

impl From<ReviewStoreError> for ModerationError {
    fn from(e: ReviewStoreError) -> Self {
        match e {
            ReviewStoreError::Corrupt(msg) => ModerationError::Serialization(msg),
            other => ModerationError::CacheDegraded(other.to_string()),
        }
    }
}

/// Create the review store from configuration
///
/// Uses PostgreSQL if a database URL is configured, otherwise falls back to in-memory.
pub async fn review_store_from_config(
    config: &Config,
) -> Result<Arc<dyn ReviewStore>, ReviewStoreError> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Using PostgreSQL review storage");
            let store = PostgresReviewStore::connect(url, config.database_max_connections).await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using in-memory review storage - pending reviews will be lost on restart!"
            );
            Ok(Arc::new(MemoryReviewStore::new()))
        }
    }
}
