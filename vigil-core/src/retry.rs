//! Bounded retry with per-attempt deadlines and a single fallback switch.
//!
//! A scan runs at most `max_attempts` against the primary provider. Only
//! transient failures and deadline expiries are retried. Once the primary
//! is exhausted (or fails fatally) the fallback gets its own bounded
//! sequence. Nothing is retried beyond that.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{ModerationError, Result};
use crate::provider::{ModerationProvider, ProviderId, RawScan};

/// Retry parameters for one provider sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per provider, including the first
    pub max_attempts: usize,
    /// Deadline for a single provider call
    pub attempt_timeout: Duration,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Relative jitter applied to each delay (0.2 = +/-20%)
    pub jitter: f64,
    /// Cap on a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            initial_delay: Duration::from_millis(200),
            multiplier: 2.0,
            jitter: 0.2,
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: self.jitter,
            multiplier: self.multiplier,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// How a single provider attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Error,
}

/// Audit record of one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: ProviderId,
    /// 1-based attempt number within this provider's sequence
    pub attempt: usize,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
    pub error: Option<String>,
}

/// Successful scan plus the attempts it took.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub scan: RawScan,
    pub attempts: Vec<ProviderAttempt>,
    pub used_fallback: bool,
}

/// Both providers exhausted.
#[derive(Debug, Clone)]
pub struct ScanExhausted {
    pub attempts: Vec<ProviderAttempt>,
    pub last_error: ModerationError,
}

impl From<ScanExhausted> for ModerationError {
    fn from(exhausted: ScanExhausted) -> Self {
        ModerationError::ScanUnavailable {
            attempts: exhausted.attempts.len(),
        }
    }
}

/// Drives provider calls under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one bounded sequence against `provider`, appending every attempt
    /// to `attempts`.
    ///
    /// Returns on the first success or the first non-retryable error.
    /// Timed-out calls are dropped, never awaited past the deadline.
    pub async fn invoke(
        &self,
        provider: &dyn ModerationProvider,
        image: &[u8],
        attempts: &mut Vec<ProviderAttempt>,
    ) -> Result<RawScan> {
        let provider_id = provider.provider_id();
        let mut backoff = self.policy.build_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();
            let result =
                tokio::time::timeout(self.policy.attempt_timeout, provider.scan(image)).await;
            let latency = start.elapsed();

            let (outcome, result) = match result {
                Ok(Ok(scan)) => (AttemptOutcome::Success, Ok(scan)),
                Ok(Err(e)) => (AttemptOutcome::Error, Err(e)),
                Err(_) => (
                    AttemptOutcome::Timeout,
                    Err(ModerationError::transient(
                        provider_id.to_string(),
                        format!("no response within {:?}", self.policy.attempt_timeout),
                    )),
                ),
            };

            let error = result.as_ref().err().map(ToString::to_string);
            info!(
                target: "audit",
                provider = %provider_id,
                attempt,
                outcome = ?outcome,
                latency_ms = latency.as_millis() as u64,
                error = error.as_deref(),
                "Provider attempt"
            );
            attempts.push(ProviderAttempt {
                provider: provider_id.clone(),
                attempt,
                outcome,
                latency,
                error,
            });

            let err = match result {
                Ok(scan) => return Ok(scan),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.policy.max_attempts {
                return Err(err);
            }

            let delay = backoff.next_backoff().unwrap_or(self.policy.max_delay);
            warn!(
                provider = %provider_id,
                error = %err,
                retry_after_ms = delay.as_millis() as u64,
                "Retry scheduled"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Scan with `primary`, switching to `fallback` exactly once when the
    /// primary sequence fails.
    pub async fn scan_with_fallback(
        &self,
        primary: &dyn ModerationProvider,
        fallback: &dyn ModerationProvider,
        image: &[u8],
    ) -> std::result::Result<ScanReport, ScanExhausted> {
        let mut attempts = Vec::new();

        let primary_err = match self.invoke(primary, image, &mut attempts).await {
            Ok(scan) => {
                return Ok(ScanReport {
                    scan,
                    attempts,
                    used_fallback: false,
                })
            }
            Err(e) => e,
        };

        warn!(
            primary = %primary.provider_id(),
            fallback = %fallback.provider_id(),
            error = %primary_err,
            "Primary provider failed, switching to fallback"
        );

        match self.invoke(fallback, image, &mut attempts).await {
            Ok(scan) => Ok(ScanReport {
                scan,
                attempts,
                used_fallback: true,
            }),
            Err(last_error) => Err(ScanExhausted {
                attempts,
                last_error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockOutcome, MockProvider};

    fn ok() -> MockOutcome {
        MockOutcome::scores([("nsfw", 0.1)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let primary = MockProvider::with_script(
            "primary",
            [
                MockOutcome::Transient,
                MockOutcome::Transient,
                MockOutcome::scores([("nsfw", 0.42), ("violence", 0.07)]),
            ],
        );
        let fallback = MockProvider::new("fallback");

        let report = RetryController::default()
            .scan_with_fallback(&primary, &fallback, b"img")
            .await
            .unwrap();

        assert!(!report.used_fallback);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.attempts[2].outcome, AttemptOutcome::Success);
        assert_eq!(report.scan.scores.len(), 2);
        assert_eq!(report.scan.scores["nsfw"], 0.42);
        assert_eq!(report.scan.scores["violence"], 0.07);
        assert_eq!(
            report.scan.provider,
            ProviderId::Mock {
                name: "primary".into()
            }
        );
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_exhausted_switches_to_fallback_once() {
        let primary = MockProvider::with_script("primary", vec![MockOutcome::Transient; 3]);
        let fallback = MockProvider::with_script("fallback", [ok()]);

        let report = RetryController::default()
            .scan_with_fallback(&primary, &fallback, b"img")
            .await
            .unwrap();

        assert!(report.used_fallback);
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(report.scan.provider, fallback.provider_id());
        assert_eq!(report.attempts.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_skips_remaining_attempts() {
        let primary = MockProvider::with_script("primary", [MockOutcome::Fatal]);
        let fallback = MockProvider::with_script("fallback", [ok()]);

        let report = RetryController::default()
            .scan_with_fallback(&primary, &fallback, b"img")
            .await
            .unwrap();

        assert!(report.used_fallback);
        assert_eq!(primary.calls(), 1);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let primary = MockProvider::new("primary").with_delay(Duration::from_secs(10));
        let fallback = MockProvider::with_script("fallback", [ok()]);

        let start = Instant::now();
        let report = RetryController::default()
            .scan_with_fallback(&primary, &fallback, b"img")
            .await
            .unwrap();

        assert_eq!(primary.calls(), 3);
        assert!(report
            .attempts
            .iter()
            .take(3)
            .all(|a| a.outcome == AttemptOutcome::Timeout));
        // 3 deadlines plus two backoff delays, each well under the call delay
        assert!(start.elapsed() < Duration::from_secs(3 * 5 + 2 * 2 + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_exhausted() {
        let primary = MockProvider::with_script("primary", vec![MockOutcome::Transient; 3]);
        let fallback = MockProvider::with_script("fallback", vec![MockOutcome::Transient; 3]);

        let exhausted = RetryController::default()
            .scan_with_fallback(&primary, &fallback, b"img")
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts.len(), 6);
        assert!(exhausted.last_error.is_retryable());
        assert_eq!(
            ModerationError::from(exhausted),
            ModerationError::ScanUnavailable { attempts: 6 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_grow() {
        let primary = MockProvider::with_script("primary", vec![MockOutcome::Transient; 3]);
        let mut attempts = Vec::new();

        let start = Instant::now();
        let result = RetryController::default()
            .invoke(&primary, b"img", &mut attempts)
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.len(), 3);
        // 200ms and 400ms, each within +/-20%
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(480), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(720), "{elapsed:?}");
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(5));
        assert_eq!(policy.initial_delay, Duration::from_millis(200));
    }
}
