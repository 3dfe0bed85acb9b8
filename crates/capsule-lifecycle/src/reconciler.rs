use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use capsule_db::{CapsuleStore, StoreError, StoreResult};
use capsule_types::{Capsule, CapsulePatch, Clock, UserId};

/// A capsule whose unlock write failed during a pass.
#[derive(Debug, Clone)]
pub struct UnlockFailure {
    pub capsule_id: String,
    pub error: StoreError,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// The single "now" every capsule in the pass was judged against.
    pub checked_at: DateTime<Utc>,
    /// Capsules flipped to unlocked by this pass.
    pub unlocked: Vec<Capsule>,
    /// Due capsules whose flip failed; they stay locked and are retried on
    /// the next pass.
    pub failures: Vec<UnlockFailure>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.unlocked.is_empty() && self.failures.is_empty()
    }

    pub fn into_unlocked(self) -> Vec<Capsule> {
        self.unlocked
    }
}

/// Scans a user's capsules and flips the due ones to unlocked.
pub struct Reconciler {
    store: CapsuleStore,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(store: CapsuleStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &CapsuleStore {
        &self.store
    }

    /// Unlock every capsule of `user_id` with `!is_unlocked && unlock_date <= now`.
    ///
    /// `now` is read once, before anything else. Each unlock is written on
    /// its own; a failed write is reported in `failures` and does not stop
    /// the rest of the pass. Flips that succeeded stay committed.
    pub async fn reconcile(&self, user_id: &UserId) -> StoreResult<ReconcileReport> {
        let now = self.clock.now();
        let capsules = self.store.list_by_user(user_id).await?;

        let mut report = ReconcileReport {
            checked_at: now,
            unlocked: Vec::new(),
            failures: Vec::new(),
        };
        let patch = CapsulePatch::unlock();

        for mut capsule in capsules.into_iter().filter(|c| c.is_due(now)) {
            match self.store.update(&capsule.id, &patch).await {
                Ok(()) => {
                    patch.apply_to(&mut capsule);
                    report.unlocked.push(capsule);
                }
                Err(e) => {
                    warn!("Failed to unlock capsule {}: {}", capsule.id, e);
                    report.failures.push(UnlockFailure {
                        capsule_id: capsule.id,
                        error: e,
                    });
                }
            }
        }

        if report.unlocked.is_empty() {
            debug!("No capsules due for user {}", user_id);
        } else {
            info!(
                "Unlocked {} capsule(s) for user {}",
                report.unlocked.len(),
                user_id
            );
        }
        Ok(report)
    }
}
