use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use capsule_db::{
    CapsuleStore, DocumentStore, MemoryDocumentStore, SqliteDocumentStore, StoreError, StoreResult,
};
use capsule_lifecycle::{
    Reconciler, RefreshEvent, RefreshOutcome, RefreshScheduler, SessionRefresher, query,
};
use capsule_types::{Capsule, CapsuleDraft, CapsuleQuery, Clock, Session, SystemClock, UserId};

use crate::config::Config;
use crate::telemetry;

/// One view of the dashboard: the filtered list split the way it is shown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub locked: Vec<Capsule>,
    pub unlocked: Vec<Capsule>,
    /// All of the user's capsules, before filtering.
    pub total: usize,
    pub active_filters: usize,
}

impl Dashboard {
    pub fn matching(&self) -> usize {
        self.locked.len() + self.unlocked.len()
    }
}

#[derive(Clone)]
pub struct CapsuleService {
    store: CapsuleStore,
    scheduler: RefreshScheduler,
    clock: Arc<dyn Clock>,
}

impl CapsuleService {
    /// Build from configuration: SQLite when a path is set, memory otherwise.
    /// Installs the log subscriber from `config.log_filter` unless one is
    /// already set.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        telemetry::init(&config.log_filter);

        let backend: Arc<dyn DocumentStore> = match &config.db_path {
            Some(path) => Arc::new(
                SqliteDocumentStore::open(path)
                    .with_context(|| format!("opening capsule database at {}", path.display()))?,
            ),
            None => {
                info!("No CAPSULE_DB_PATH set, keeping capsules in memory");
                Arc::new(MemoryDocumentStore::new())
            }
        };
        Ok(Self::with_backend(backend, Arc::new(SystemClock), config))
    }

    pub fn with_backend(
        backend: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let store = CapsuleStore::new(backend)
            .with_clock(clock.clone())
            .with_collection(config.collection.clone());
        let reconciler = Arc::new(Reconciler::new(store.clone(), clock.clone()));
        let scheduler = RefreshScheduler::new(reconciler)
            .with_period(config.refresh_period);

        Self {
            store,
            scheduler,
            clock,
        }
    }

    pub fn store(&self) -> &CapsuleStore {
        &self.store
    }

    pub async fn create_capsule(
        &self,
        session: &Session,
        draft: CapsuleDraft,
    ) -> StoreResult<String> {
        self.store.create_for(session, draft).await
    }

    /// The session user's capsules, newest first.
    pub async fn capsules(&self, session: &Session) -> StoreResult<Vec<Capsule>> {
        let user_id = signed_in(session)?;
        self.store.list_by_user(user_id).await
    }

    pub async fn dashboard(
        &self,
        session: &Session,
        query: &CapsuleQuery,
    ) -> StoreResult<Dashboard> {
        let capsules = self.capsules(session).await?;
        let visible = query::apply(&capsules, query, self.clock.now());
        let (locked, unlocked) = query::partition_by_status(&visible);

        Ok(Dashboard {
            locked,
            unlocked,
            total: capsules.len(),
            active_filters: query.active_filter_count(),
        })
    }

    /// One reconcile pass on demand. Returns `Busy` without touching the
    /// store while a refresh pass for the same user is running.
    pub async fn unlock_due(&self, session: &Session) -> StoreResult<RefreshOutcome> {
        signed_in(session)?;
        self.scheduler.reconcile_once(session).await
    }

    /// Reveal a capsule's contents. Only an unlocked capsule whose date has
    /// passed can be opened.
    pub async fn open_capsule(&self, session: &Session, id: &str) -> StoreResult<Capsule> {
        let capsule = self.store.get_owned(session, id).await?;
        let now = self.clock.now();
        if !capsule.can_open(now) {
            return Err(StoreError::validation(format!(
                "capsule {} is still locked ({})",
                id,
                capsule.countdown(now)
            )));
        }
        Ok(capsule)
    }

    /// Keep the session's capsules fresh until the returned handle is
    /// stopped or dropped.
    pub fn watch<F>(&self, session: &Session, on_event: F) -> StoreResult<SessionRefresher>
    where
        F: Fn(RefreshEvent) + Send + Sync + 'static,
    {
        self.scheduler.start(session, on_event)
    }
}

fn signed_in(session: &Session) -> StoreResult<&UserId> {
    session
        .user_id()
        .ok_or_else(|| StoreError::permission_denied("not signed in"))
}
