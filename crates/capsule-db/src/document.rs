use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreResult;

/// A flat JSON object as held by the document store.
pub type Document = Map<String, Value>;

/// Path-addressed record store: records live under a collection path and
/// are addressed by a store-generated key (`<collection>/<key>`).
///
/// Only full-collection scans are required; no secondary indexes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert under a freshly generated key and return the key.
    async fn push(&self, collection: &str, document: Document) -> StoreResult<String>;

    /// Every record in the collection, in key order.
    async fn read_all(&self, collection: &str) -> StoreResult<Vec<(String, Document)>>;

    async fn read(&self, collection: &str, key: &str) -> StoreResult<Option<Document>>;

    /// Shallow-merge `fields` into an existing record. Fails with
    /// `NotFound` when the record does not exist.
    async fn update(&self, collection: &str, key: &str, fields: Document) -> StoreResult<()>;

    /// Remove a record. Removing a missing record succeeds.
    async fn remove(&self, collection: &str, key: &str) -> StoreResult<()>;
}

pub(crate) fn record_path(collection: &str, key: &str) -> String {
    format!("{}/{}", collection, key)
}

pub(crate) fn merge(target: &mut Document, fields: Document) {
    for (field, value) in fields {
        target.insert(field, value);
    }
}
