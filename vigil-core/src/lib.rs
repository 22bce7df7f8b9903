//! Vigil Core - image moderation gate
//!
//! Decides whether an uploaded image may be published by asking an external
//! content classifier, with a fallback classifier, bounded retries and a
//! content-addressed decision cache.
//!
//! # Flow
//!
//! 1. The image is validated and fingerprinted (SHA3-256 of its bytes)
//! 2. A cached decision for the fingerprint is returned as-is
//! 3. Otherwise a single scan runs per fingerprint, however many uploads
//!    of the same bytes arrive concurrently
//! 4. The primary provider gets up to 3 attempts with a 5s deadline each,
//!    then the fallback provider gets its own 3
//! 5. Scores are mapped to `approved`, `pending_review` or `rejected`
//! 6. The decision is cached; `pending_review` opens a review record
//!
//! # Example
//!
//! ```no_run
//! use vigil_core::{ModerationService, ProviderPair, Verdict};
//!
//! # async fn example(image: Vec<u8>) -> vigil_core::Result<()> {
//! // Mock providers; use ProviderFactory::pair_from_env in production
//! let service = ModerationService::builder(ProviderPair::mock()).build()?;
//!
//! let outcome = service.scan(image, "user-42").await?;
//! if outcome.verdict() != Verdict::Approved {
//!     println!("{}", outcome.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod decision;
pub mod error;
pub mod fingerprint;
pub mod provider;
pub mod retry;
pub mod service;
pub mod status;
pub mod upload;

// Re-export main types for convenience
pub use cache::{KeyValueStore, MemoryKvStore, ModerationCache};
pub use decision::{
    user_message, CategoryThreshold, DecisionMapper, DecisionTtl, ModerationDecision, Thresholds,
    Verdict,
};
pub use error::{ModerationError, Result};
pub use fingerprint::{fingerprint, ContentFingerprint, FingerprintAlgorithm};
pub use provider::{
    MockOutcome, MockProvider, ModerationProvider, ProviderConfig, ProviderFactory, ProviderId,
    ProviderPair, RawScan,
};
#[cfg(feature = "network")]
pub use provider::{HiveConfig, HiveProvider, ModerentConfig, ModerentProvider};
pub use retry::{AttemptOutcome, ProviderAttempt, RetryController, RetryPolicy};
pub use service::{
    ModerationService, ModerationServiceBuilder, PolicySnapshot, ScanOutcome, StatusView,
};
pub use status::{
    review_priority, validate_moderator_id, MemoryReviewStore, PendingReviewRecord, ReviewState,
    ReviewStore,
};
pub use upload::{ImageUpload, ModerationRequest, DEFAULT_MAX_IMAGE_SIZE};
