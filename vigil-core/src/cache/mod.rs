//! Moderation cache: stored decisions plus in-flight scan coalescing.
//!
//! Decisions are keyed by content fingerprint and CBOR-encoded into a
//! [`KeyValueStore`]. While a scan for a fingerprint is running, later
//! requests for the same fingerprint subscribe to it instead of starting
//! another provider call.

mod kv;

pub use kv::{KeyValueStore, MemoryKvStore};

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::decision::ModerationDecision;
use crate::error::{ModerationError, Result};
use crate::fingerprint::ContentFingerprint;

const KEY_PREFIX: &str = "moderation:decision:";

type SharedOutcome = Option<Result<ModerationDecision>>;
type InFlightMap = DashMap<String, watch::Receiver<SharedOutcome>>;

/// Decision cache shared by all request handlers.
#[derive(Clone)]
pub struct ModerationCache {
    store: Arc<dyn KeyValueStore>,
    in_flight: Arc<InFlightMap>,
}

impl ModerationCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    fn key(fingerprint: &ContentFingerprint) -> String {
        format!("{KEY_PREFIX}{fingerprint}")
    }

    /// Stored, unexpired decision for `fingerprint`.
    ///
    /// Backend and decoding failures are logged and reported as a miss.
    pub async fn lookup(&self, fingerprint: &ContentFingerprint) -> Option<ModerationDecision> {
        let bytes = match self.store.get(&Self::key(fingerprint)).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Cache lookup failed, treating as miss"
                );
                return None;
            }
        };

        let decision: ModerationDecision = match ciborium::from_reader(bytes.as_slice()) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Undecodable cache entry, treating as miss"
                );
                return None;
            }
        };

        if decision.is_expired(Utc::now()) {
            debug!(fingerprint = %fingerprint, "Cached decision expired");
            return None;
        }
        Some(decision)
    }

    /// Store `decision` until its `expires_at`, overwriting any previous one.
    pub async fn store(&self, decision: &ModerationDecision) -> Result<()> {
        let ttl = match (decision.expires_at - Utc::now()).to_std() {
            Ok(ttl) if !ttl.is_zero() => ttl,
            _ => {
                debug!(
                    fingerprint = %decision.fingerprint,
                    "Decision already expired, not caching"
                );
                return Ok(());
            }
        };

        let mut bytes = Vec::new();
        ciborium::into_writer(decision, &mut bytes)
            .map_err(|e| ModerationError::Serialization(e.to_string()))?;

        self.store
            .put(&Self::key(&decision.fingerprint), bytes, ttl)
            .await
    }

    /// Run `compute` for `fingerprint` unless a computation for it is
    /// already in flight, in which case wait for that one.
    ///
    /// The computation runs on its own task: a caller that goes away does
    /// not cancel it for the others. Every concurrent caller receives the
    /// same outcome, error included.
    pub async fn coalesce<F, Fut>(
        &self,
        fingerprint: &ContentFingerprint,
        compute: F,
    ) -> Result<ModerationDecision>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ModerationDecision>> + Send + 'static,
    {
        let key = fingerprint.as_str().to_string();

        // The shard lock is released before anything is spawned or awaited
        let (mut rx, leader) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx.clone());
                (rx, Some(tx))
            }
        };

        match leader {
            Some(tx) => {
                debug!(fingerprint = %fingerprint, "Starting scan");
                let slot = InFlightSlot {
                    map: Arc::clone(&self.in_flight),
                    key,
                };
                let work = compute();
                tokio::spawn(async move {
                    let _slot = slot;
                    let outcome = work.await;
                    tx.send_replace(Some(outcome));
                });
            }
            None => debug!(fingerprint = %fingerprint, "Joining in-flight scan"),
        }

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            // Sender dropped without a result: the scan task panicked
            Err(_) => None,
        };
        outcome.unwrap_or(Err(ModerationError::ScanUnavailable { attempts: 0 }))
    }

    /// Number of scans currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// Removes the in-flight entry when the scan task ends, however it ends.
struct InFlightSlot {
    map: Arc<InFlightMap>,
    key: String,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
