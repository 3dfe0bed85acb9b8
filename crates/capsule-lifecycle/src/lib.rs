//! Capsule lifecycle: unlocking due capsules, keeping a session's view
//! refreshed, and the dashboard's search/filter/sort.

pub mod query;
pub mod reconciler;
pub mod scheduler;

pub use reconciler::{ReconcileReport, Reconciler, UnlockFailure};
pub use scheduler::{
    DEFAULT_REFRESH_PERIOD, RefreshEvent, RefreshOutcome, RefreshScheduler, SessionRefresher,
};
