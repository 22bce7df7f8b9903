//! Mock classifier for testing and local development.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sha3::{Digest, Sha3_256};

use super::{ModerationProvider, ProviderId, RawScan, DEFAULT_CATEGORIES};
use crate::error::{ModerationError, Result};

/// Upper bound for unscripted scores, below every sensible low threshold.
const UNSCRIPTED_SCORE_CEILING: f64 = 0.3;

/// Scripted result of one mock scan.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// Succeed with these scores
    Scores(BTreeMap<String, f64>),
    /// Fail with a retryable error (network blip, 5xx)
    Transient,
    /// Fail with a non-retryable error (4xx, auth)
    Fatal,
}

impl MockOutcome {
    pub fn scores<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self::Scores(
            pairs
                .into_iter()
                .map(|(label, score)| (label.to_string(), score))
                .collect(),
        )
    }
}

/// Mock classifier.
/// WARNING: Do not use in production - it performs no content analysis!
///
/// Scripted outcomes are consumed in order, one per call. Once the script is
/// empty, scores are derived deterministically from the image bytes and stay
/// below 0.3, so unscripted scans are always approved.
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<MockOutcome>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_script(
        name: impl Into<String>,
        outcomes: impl IntoIterator<Item = MockOutcome>,
    ) -> Self {
        let provider = Self::new(name);
        provider.script_mut().extend(outcomes);
        provider
    }

    /// Delay every call by `delay` before producing its outcome.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append an outcome to the script.
    pub fn push(&self, outcome: MockOutcome) {
        self.script_mut().push_back(outcome);
    }

    /// Number of scan calls started so far, including ones that timed out.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn script_mut(&self) -> std::sync::MutexGuard<'_, VecDeque<MockOutcome>> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn unscripted_scores(&self, image: &[u8]) -> BTreeMap<String, f64> {
        let mut hasher = Sha3_256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(image);
        let digest = hasher.finalize();

        DEFAULT_CATEGORIES
            .iter()
            .zip(digest.iter())
            .map(|(label, byte)| {
                let score = f64::from(*byte) / 256.0 * UNSCRIPTED_SCORE_CEILING;
                (label.to_string(), score)
            })
            .collect()
    }
}

#[async_trait]
impl ModerationProvider for MockProvider {
    async fn scan(&self, image: &[u8]) -> Result<RawScan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script_mut().pop_front();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let provider = self.provider_id().to_string();
        match outcome {
            Some(MockOutcome::Scores(scores)) => Ok(RawScan::new(self.provider_id(), scores)),
            Some(MockOutcome::Transient) => Err(ModerationError::transient(
                provider,
                "mock transient failure",
            )),
            Some(MockOutcome::Fatal) => Err(ModerationError::fatal(provider, "mock fatal failure")),
            None => Ok(RawScan::new(self.provider_id(), self.unscripted_scores(image))),
        }
    }

    fn provider_id(&self) -> ProviderId {
        ProviderId::Mock {
            name: self.name.clone(),
        }
    }
}
