use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::document::{Document, DocumentStore, merge, record_path};
use crate::error::{StoreError, StoreResult};

/// Process-local document store. Backs tests and sessions that run without
/// a database file; can be told to fail so error paths can be exercised.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<MemoryState>,
    reads: AtomicUsize,
    updates: AtomicUsize,
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Document>>,
    offline: bool,
    failing_keys: HashSet<String>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.offline = offline;
        }
    }

    /// Make updates to one record fail with `Unavailable`.
    pub fn fail_updates_for(&self, key: &str) {
        if let Ok(mut state) = self.inner.lock() {
            state.failing_keys.insert(key.to_string());
        }
    }

    /// Insert a record under a caller-chosen key, bypassing key generation.
    pub fn insert_raw(&self, collection: &str, key: &str, document: Document) {
        if let Ok(mut state) = self.inner.lock() {
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(key.to_string(), document);
        }
    }

    /// Number of full-collection reads served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful updates applied so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        let state = self
            .inner
            .lock()
            .map_err(|e| StoreError::unavailable(format!("memory store lock poisoned: {}", e)))?;
        if state.offline {
            return Err(StoreError::unavailable("memory store is offline"));
        }
        Ok(state)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn push(&self, collection: &str, document: Document) -> StoreResult<String> {
        let mut state = self.state()?;
        let key = Uuid::new_v4().to_string();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), document);
        Ok(key)
    }

    async fn read_all(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
        let state = self.state()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(state
            .collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .map(|(key, doc)| (key.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        let state = self.state()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|records| records.get(key))
            .cloned())
    }

    async fn update(&self, collection: &str, key: &str, fields: Document) -> StoreResult<()> {
        let mut state = self.state()?;
        if state.failing_keys.contains(key) {
            return Err(StoreError::unavailable(format!(
                "write to {} rejected",
                record_path(collection, key)
            )));
        }

        let record = state
            .collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(key))
            .ok_or_else(|| StoreError::not_found(record_path(collection, key)))?;
        merge(record, fields);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> StoreResult<()> {
        let mut state = self.state()?;
        if let Some(records) = state.collections.get_mut(collection) {
            records.remove(key);
        }
        Ok(())
    }
}
