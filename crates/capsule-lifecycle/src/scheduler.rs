use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use capsule_db::{StoreError, StoreResult};
use capsule_types::{Capsule, Session, UserId};

use crate::reconciler::{ReconcileReport, Reconciler, UnlockFailure};

pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(30);

/// What a refresher reports back to the view that started it.
#[derive(Debug, Clone)]
pub enum RefreshEvent {
    /// Initial load when the view is first displayed.
    Loaded(Vec<Capsule>),
    /// A pass unlocked capsules; `capsules` is the re-fetched full list.
    Unlocked {
        unlocked: Vec<Capsule>,
        capsules: Vec<Capsule>,
    },
    /// Some due capsules could not be unlocked during a pass.
    UnlockFailed(Vec<UnlockFailure>),
    /// A pass unlocked capsules but the list could not be re-read. The
    /// flips are committed; `unlocked` is the only report of them.
    ReloadFailed {
        unlocked: Vec<Capsule>,
        error: StoreError,
    },
    /// A periodic pass failed as a whole. The next tick still runs.
    Failed(StoreError),
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Completed(ReconcileReport),
    /// Another pass for the same user was still running.
    Busy,
    /// The refresher has been stopped.
    Stopped,
}

type Listener = Arc<dyn Fn(RefreshEvent) + Send + Sync>;

/// Starts per-session refresh loops. Clones share one in-flight registry, so
/// at most one pass runs per user no matter who triggered it.
#[derive(Clone)]
pub struct RefreshScheduler {
    reconciler: Arc<Reconciler>,
    period: Duration,
    in_flight: Arc<Mutex<HashSet<UserId>>>,
}

impl RefreshScheduler {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            period: DEFAULT_REFRESH_PERIOD,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Begin refreshing the session user's capsules: one load-and-reconcile
    /// immediately, then a reconcile every period until stopped.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<F>(&self, session: &Session, on_event: F) -> StoreResult<SessionRefresher>
    where
        F: Fn(RefreshEvent) + Send + Sync + 'static,
    {
        let user_id = require_user(session)?;
        if self.period.is_zero() {
            return Err(StoreError::validation("refresh period must be greater than zero"));
        }

        let token = CancellationToken::new();
        let pass = Arc::new(RefreshPass {
            reconciler: self.reconciler.clone(),
            in_flight: self.in_flight.clone(),
            user_id: user_id.clone(),
            listener: Arc::new(on_event),
            token: token.clone(),
        });

        let task = tokio::spawn(run_refresh_loop(pass.clone(), self.period));
        info!(
            "Refresh started for user {} (every {}s)",
            user_id,
            self.period.as_secs()
        );

        Ok(SessionRefresher {
            pass,
            token,
            task: Some(task),
        })
    }

    /// One reconcile pass outside any refresh loop, e.g. a "check unlocks"
    /// button. Shares the per-user busy flag with every running loop and
    /// returns `Busy` instead of overlapping with one.
    pub async fn reconcile_once(&self, session: &Session) -> StoreResult<RefreshOutcome> {
        let user_id = require_user(session)?;
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &user_id) else {
            debug!("Manual check for user {} skipped: pass in flight", user_id);
            return Ok(RefreshOutcome::Busy);
        };
        self.reconciler
            .reconcile(&user_id)
            .await
            .map(RefreshOutcome::Completed)
    }
}

fn require_user(session: &Session) -> StoreResult<UserId> {
    session
        .user_id()
        .cloned()
        .ok_or_else(|| StoreError::validation("cannot refresh capsules without a signed-in user"))
}

/// Handle owned by the view. Stopping it (or dropping it) ends the loop.
pub struct SessionRefresher {
    pass: Arc<RefreshPass>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionRefresher {
    pub fn user_id(&self) -> &UserId {
        &self.pass.user_id
    }

    /// On-demand pass, e.g. a refresh button. Errors are returned to the
    /// caller rather than sent to the listener.
    pub async fn refresh_now(&self) -> StoreResult<RefreshOutcome> {
        if self.token.is_cancelled() {
            return Ok(RefreshOutcome::Stopped);
        }
        self.pass.reconcile_and_reload().await
    }

    /// No tick starts and no event is delivered after this returns. A pass
    /// already running may still commit its writes.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            info!("Refresh stopped for user {}", self.pass.user_id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop and wait for the loop task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Refresh task for user {} ended abnormally: {}", self.pass.user_id, e);
            }
        }
    }
}

impl Drop for SessionRefresher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// State shared between the loop task and on-demand refreshes.
struct RefreshPass {
    reconciler: Arc<Reconciler>,
    in_flight: Arc<Mutex<HashSet<UserId>>>,
    user_id: UserId,
    listener: Listener,
    token: CancellationToken,
}

impl RefreshPass {
    fn emit(&self, event: RefreshEvent) {
        if !self.token.is_cancelled() {
            (self.listener)(event);
        }
    }

    /// First display: hand the current list over, then unlock what is due.
    async fn load(&self) -> StoreResult<RefreshOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &self.user_id) else {
            debug!("Initial load for user {} deferred: pass in flight", self.user_id);
            return Ok(RefreshOutcome::Busy);
        };

        let capsules = self.reconciler.store().list_by_user(&self.user_id).await?;
        self.emit(RefreshEvent::Loaded(capsules));
        if self.token.is_cancelled() {
            return Ok(RefreshOutcome::Stopped);
        }
        self.reconcile_locked().await.map(RefreshOutcome::Completed)
    }

    async fn reconcile_and_reload(&self) -> StoreResult<RefreshOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &self.user_id) else {
            debug!("Refresh for user {} skipped: pass in flight", self.user_id);
            return Ok(RefreshOutcome::Busy);
        };
        self.reconcile_locked().await.map(RefreshOutcome::Completed)
    }

    /// Caller holds the in-flight guard.
    async fn reconcile_locked(&self) -> StoreResult<ReconcileReport> {
        let report = self.reconciler.reconcile(&self.user_id).await?;

        if !report.failures.is_empty() {
            self.emit(RefreshEvent::UnlockFailed(report.failures.clone()));
        }
        if !report.unlocked.is_empty() {
            // Re-read so the view sees the whole list, not just the delta.
            match self.reconciler.store().list_by_user(&self.user_id).await {
                Ok(capsules) => self.emit(RefreshEvent::Unlocked {
                    unlocked: report.unlocked.clone(),
                    capsules,
                }),
                Err(e) => {
                    warn!(
                        "Reload after unlocking {} capsule(s) for user {} failed: {}",
                        report.unlocked.len(),
                        self.user_id,
                        e
                    );
                    self.emit(RefreshEvent::ReloadFailed {
                        unlocked: report.unlocked.clone(),
                        error: e,
                    });
                }
            }
        }
        Ok(report)
    }
}

/// Drives a refresher: the interval's first tick fires immediately and runs
/// the initial load, later ticks reconcile. The load is retried on each tick
/// until it has run once. A failed tick is logged and reported; it never
/// ends the loop.
async fn run_refresh_loop(pass: Arc<RefreshPass>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut load_pending = true;

    loop {
        tokio::select! {
            biased;
            _ = pass.token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let result = if load_pending {
            pass.load().await
        } else {
            pass.reconcile_and_reload().await
        };

        match result {
            Ok(RefreshOutcome::Busy) => {}
            Ok(_) => load_pending = false,
            Err(e) => {
                warn!("Refresh error for user {}: {}", pass.user_id, e);
                pass.emit(RefreshEvent::Failed(e));
            }
        }
    }

    debug!("Refresh loop for user {} exited", pass.user_id);
}

/// Marks a user as having a pass in flight until dropped.
struct InFlightGuard {
    registry: Arc<Mutex<HashSet<UserId>>>,
    user_id: UserId,
}

impl InFlightGuard {
    fn acquire(registry: &Arc<Mutex<HashSet<UserId>>>, user_id: &UserId) -> Option<Self> {
        let inserted = registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.clone());

        inserted.then(|| Self {
            registry: registry.clone(),
            user_id: user_id.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_excludes_second_pass_for_same_user() {
        let registry = Arc::new(Mutex::new(HashSet::new()));
        let alice = UserId::new("alice");

        let first = InFlightGuard::acquire(&registry, &alice);
        assert!(first.is_some());
        assert!(InFlightGuard::acquire(&registry, &alice).is_none());
        assert!(InFlightGuard::acquire(&registry, &UserId::new("bob")).is_some());

        drop(first);
        assert!(InFlightGuard::acquire(&registry, &alice).is_some());
    }
}
