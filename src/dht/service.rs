use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use super::error::DhtError;
use super::record::{MutableRecord, TargetKey};
use super::store::RecordStore;
use super::verifier::RecordVerifier;
use crate::crypto::{KeyPair, SigningService};

struct SubscriptionState {
    target: TargetKey,
    cancelled: AtomicBool,
    wake: Notify,
}

/// Handle to a running subscription.
///
/// Polling continues until [`cancel`](Subscription::cancel) is called on any
/// clone of the handle. A lookup already in flight when cancelled completes
/// and is discarded.
#[derive(Clone)]
pub struct Subscription {
    state: Arc<SubscriptionState>,
}

impl Subscription {
    fn new(target: TargetKey) -> Self {
        Self {
            state: Arc::new(SubscriptionState {
                target,
                cancelled: AtomicBool::new(false),
                wake: Notify::new(),
            }),
        }
    }

    pub fn target(&self) -> TargetKey {
        self.state.target
    }

    /// Stops polling. Idempotent.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            debug!(key = %self.state.target, "subscription cancelled");
            self.state.wake.notify_one();
        }
    }

    /// True after [`cancel`](Self::cancel), and once polling has ended for
    /// any other reason, such as a panicking callback.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

/// Marks the subscription stopped when its polling task ends, unwinding
/// included.
struct StopGuard(Subscription);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.state.cancelled.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.state.target)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Publish and subscribe for mutable records.
#[derive(Clone)]
pub struct DhtService {
    store: Arc<dyn RecordStore>,
    signing: Arc<SigningService>,
}

impl DhtService {
    pub fn new(store: Arc<dyn RecordStore>, signing: Arc<SigningService>) -> Self {
        Self { store, signing }
    }

    pub fn signing(&self) -> &Arc<SigningService> {
        &self.signing
    }

    /// Signs and stores a record at `hash(public key ++ salt)`.
    ///
    /// Prior records are not consulted: a lower or equal sequence is written
    /// anyway and rejected by readers.
    pub async fn publish(
        &self,
        key_pair: &KeyPair,
        value: impl Into<Bytes>,
        salt: Option<Bytes>,
        sequence: u64,
    ) -> Result<MutableRecord, DhtError> {
        let record = MutableRecord::sign(key_pair, value.into(), salt, sequence)?;
        self.store.put(record.clone()).await?;
        debug!(key = %record.target, sequence, "published record");
        Ok(record)
    }

    /// One-shot lookup. A record that fails its target or signature check is
    /// an error, not `None`.
    pub async fn resolve(&self, target: &TargetKey) -> Result<Option<MutableRecord>, DhtError> {
        let Some(record) = self.store.get(target).await? else {
            return Ok(None);
        };
        RecordVerifier::new(*target).check(&record, &self.signing)?;
        Ok(Some(record))
    }

    /// Polls `target` every `interval` and calls `callback` for each record
    /// that passes verification with a sequence above the last accepted one.
    ///
    /// The first lookup happens immediately. Lookups for one subscription
    /// never overlap; each subscription runs on its own task.
    pub fn subscribe<F>(&self, target: TargetKey, interval: Duration, mut callback: F) -> Subscription
    where
        F: FnMut(MutableRecord, &Subscription) + Send + 'static,
    {
        let subscription = Subscription::new(target);
        let handle = subscription.clone();
        let store = Arc::clone(&self.store);
        let signing = Arc::clone(&self.signing);

        tokio::spawn(async move {
            let _stopped = StopGuard(handle.clone());
            let mut verifier = RecordVerifier::new(target);
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while !handle.is_cancelled() {
                tokio::select! {
                    _ = handle.state.wake.notified() => break,
                    _ = ticker.tick() => {}
                }

                let record = match store.get(&target).await {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!(key = %target, error = %e, "lookup failed");
                        continue;
                    }
                };
                if handle.is_cancelled() {
                    break;
                }

                match verifier.accept(&record, &signing) {
                    Ok(()) => {
                        debug!(key = %target, sequence = record.sequence, "accepted record");
                        callback(record, &handle);
                    }
                    Err(DhtError::StaleSequence { sequence, last }) => {
                        trace!(key = %target, sequence, last, "ignoring stale record");
                    }
                    Err(e) => warn!(key = %target, error = %e, "rejected record"),
                }
            }
            debug!(key = %target, "subscription stopped");
        });

        subscription
    }
}

impl std::fmt::Debug for DhtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhtService").finish_non_exhaustive()
    }
}
