use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use capsule_types::record::{FIELD_DESCRIPTION, FIELD_IS_UNLOCKED, FIELD_TITLE, FIELD_UNLOCK_DATE};
use capsule_types::{
    Capsule, CapsuleDraft, CapsulePatch, CapsuleRecord, Clock, Session, SystemClock, UserId,
    timestamp,
};

use crate::document::{Document, DocumentStore, record_path};
use crate::error::{StoreError, StoreResult};

pub const DEFAULT_COLLECTION: &str = "timeCapsules";

/// Typed capsule operations on top of a [`DocumentStore`].
#[derive(Clone)]
pub struct CapsuleStore {
    backend: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    collection: String,
}

impl CapsuleStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    // -- Create --

    /// Persist a new, locked capsule and return its generated id.
    ///
    /// Past unlock dates are accepted; such a capsule unlocks on the next
    /// reconciliation pass.
    pub async fn create(&self, draft: CapsuleDraft) -> StoreResult<String> {
        let record = self.new_record(draft)?;
        let user_id = record.user_id.clone();
        let doc = encode_record(&record)?;

        let id = self.backend.push(&self.collection, doc).await?;
        info!("Capsule {} created for user {}", id, user_id);
        Ok(id)
    }

    /// Create on behalf of the signed-in user; the draft's owner is taken
    /// from the session.
    pub async fn create_for(&self, session: &Session, draft: CapsuleDraft) -> StoreResult<String> {
        let user_id = session
            .user_id()
            .ok_or_else(|| StoreError::validation("you must be signed in to create a capsule"))?;
        self.create(draft.owned_by(user_id.clone())).await
    }

    fn new_record(&self, draft: CapsuleDraft) -> StoreResult<CapsuleRecord> {
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(StoreError::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        let (Some(unlock_date), Some(user_id)) = (draft.unlock_date, draft.user_id) else {
            return Err(StoreError::validation("missing required fields"));
        };

        Ok(CapsuleRecord {
            title: draft.title,
            description: draft.description,
            unlock_date: timestamp::truncate_millis(unlock_date),
            user_id,
            created_at: timestamp::truncate_millis(self.clock.now()),
            is_unlocked: false,
            files: Vec::new(),
        })
    }

    // -- Read --

    /// All capsules owned by `user_id`, newest first.
    ///
    /// The whole collection is scanned and filtered on `userId`. Records
    /// that cannot be decoded are skipped with a warning.
    pub async fn list_by_user(&self, user_id: &UserId) -> StoreResult<Vec<Capsule>> {
        let records = self.backend.read_all(&self.collection).await?;

        let mut capsules: Vec<Capsule> = records
            .into_iter()
            .filter(|(_, doc)| owner_of(doc) == Some(user_id.as_str()))
            .filter_map(|(key, doc)| match decode_record(&key, doc) {
                Ok(capsule) => Some(capsule),
                Err(e) => {
                    warn!("Skipping capsule {}: {}", key, e);
                    None
                }
            })
            .collect();

        capsules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!("Loaded {} capsules for user {}", capsules.len(), user_id);
        Ok(capsules)
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<Capsule>> {
        self.backend
            .read(&self.collection, id)
            .await?
            .map(|doc| decode_record(id, doc))
            .transpose()
    }

    /// Fetch a capsule for the signed-in user. Ownership is a plain
    /// `userId` comparison.
    pub async fn get_owned(&self, session: &Session, id: &str) -> StoreResult<Capsule> {
        let user_id = session
            .user_id()
            .ok_or_else(|| StoreError::permission_denied("not signed in"))?;
        let capsule = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(record_path(&self.collection, id)))?;

        if &capsule.user_id != user_id {
            return Err(StoreError::permission_denied(format!(
                "capsule {} belongs to another user",
                id
            )));
        }
        Ok(capsule)
    }

    // -- Update --

    /// Merge `patch` into the stored record.
    ///
    /// Fails with `NotFound` if the record is gone, and with `Validation`
    /// when the patch would blank a text field or re-lock an unlocked
    /// capsule.
    pub async fn update(&self, id: &str, patch: &CapsulePatch) -> StoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::validation("title cannot be empty"));
        }
        if patch
            .description
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            return Err(StoreError::validation("description cannot be empty"));
        }
        if patch.is_unlocked == Some(false) {
            let current = self
                .get(id)
                .await?
                .ok_or_else(|| StoreError::not_found(record_path(&self.collection, id)))?;
            if current.is_unlocked {
                return Err(StoreError::validation(format!(
                    "capsule {} is already unlocked and cannot be locked again",
                    id
                )));
            }
        }

        self.backend
            .update(&self.collection, id, encode_patch(patch))
            .await
    }

    /// Unlock a single capsule owned by the session user. Unlocking an
    /// unlocked capsule changes nothing.
    pub async fn unlock(&self, session: &Session, id: &str) -> StoreResult<Capsule> {
        let mut capsule = self.get_owned(session, id).await?;
        if capsule.is_unlocked {
            return Ok(capsule);
        }

        let patch = CapsulePatch::unlock();
        self.update(id, &patch).await?;
        patch.apply_to(&mut capsule);
        info!("Capsule {} unlocked on request", id);
        Ok(capsule)
    }

    // -- Delete --

    /// Remove a capsule. Deleting a missing id succeeds.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.backend.remove(&self.collection, id).await?;
        debug!("Capsule {} deleted", id);
        Ok(())
    }
}

fn owner_of(doc: &Document) -> Option<&str> {
    doc.get("userId").and_then(Value::as_str)
}

fn encode_record(record: &CapsuleRecord) -> StoreResult<Document> {
    match serde_json::to_value(record) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(StoreError::validation("capsule record did not encode to an object")),
        Err(e) => Err(StoreError::validation(format!("capsule record: {}", e))),
    }
}

fn decode_record(key: &str, doc: Document) -> StoreResult<Capsule> {
    let record: CapsuleRecord =
        serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::corrupt(key, e))?;
    Ok(record.into_capsule(key.to_string()))
}

fn encode_patch(patch: &CapsulePatch) -> Document {
    let mut fields = Document::new();
    if let Some(title) = &patch.title {
        fields.insert(FIELD_TITLE.into(), Value::from(title.as_str()));
    }
    if let Some(description) = &patch.description {
        fields.insert(FIELD_DESCRIPTION.into(), Value::from(description.as_str()));
    }
    if let Some(unlock_date) = &patch.unlock_date {
        fields.insert(FIELD_UNLOCK_DATE.into(), Value::from(timestamp::format(unlock_date)));
    }
    if let Some(is_unlocked) = patch.is_unlocked {
        fields.insert(FIELD_IS_UNLOCKED.into(), Value::from(is_unlocked));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryDocumentStore;
    use crate::error::StoreErrorKind;
    use capsule_types::{CurrentUser, ManualClock};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn fixture() -> (Arc<MemoryDocumentStore>, Arc<ManualClock>, CapsuleStore) {
        let backend = Arc::new(MemoryDocumentStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let store = CapsuleStore::new(backend.clone()).with_clock(clock.clone());
        (backend, clock, store)
    }

    fn draft(title: &str, user: &str) -> CapsuleDraft {
        CapsuleDraft::new(title, "something to remember", start() + Duration::days(30))
            .owned_by(UserId::new(user))
    }

    #[tokio::test]
    async fn create_persists_locked_record_with_created_at() {
        let (backend, _, store) = fixture();
        let id = store.create(draft("Letter", "alice")).await.unwrap();

        let raw = backend.read(DEFAULT_COLLECTION, &id).await.unwrap().unwrap();
        assert_eq!(raw["isUnlocked"], false);
        assert_eq!(raw["createdAt"], "2025-06-01T12:00:00.000Z");
        assert_eq!(raw["unlockDate"], "2025-07-01T12:00:00.000Z");
        assert_eq!(raw["files"], json!([]));
        assert_eq!(raw["userId"], "alice");
    }

    #[tokio::test]
    async fn create_rejects_missing_description_without_writing() {
        let (backend, _, store) = fixture();
        let mut incomplete = draft("Letter", "alice");
        incomplete.description.clear();

        let err = store.create(incomplete).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Validation);
        assert!(err.to_string().contains("description"));
        assert!(backend.read_all(DEFAULT_COLLECTION).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_for_requires_signed_in_user() {
        let (_, _, store) = fixture();
        let draft = CapsuleDraft::new("t", "d", start());

        let err = store
            .create_for(&Session::anonymous(), draft.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Validation);

        let session = Session::signed_in(CurrentUser::new("bob"));
        let id = store.create_for(&session, draft).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().unwrap().user_id, UserId::new("bob"));
    }

    #[tokio::test]
    async fn create_reports_unavailable_store() {
        let (backend, _, store) = fixture();
        backend.set_offline(true);

        let err = store.create(draft("Letter", "alice")).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_sorts_newest_first() {
        let (_, clock, store) = fixture();
        store.create(draft("first", "alice")).await.unwrap();
        clock.advance(Duration::hours(1));
        store.create(draft("other", "bob")).await.unwrap();
        clock.advance(Duration::hours(1));
        store.create(draft("second", "alice")).await.unwrap();

        let titles: Vec<String> = store
            .list_by_user(&UserId::new("alice"))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn list_for_user_without_capsules_is_empty() {
        let (_, _, store) = fixture();
        store.create(draft("x", "alice")).await.unwrap();
        assert!(store.list_by_user(&UserId::new("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_corrupt_records() {
        let (backend, _, store) = fixture();
        store.create(draft("fine", "alice")).await.unwrap();
        let broken = json!({"userId": "alice", "title": "broken", "unlockDate": "soon"});
        if let Value::Object(doc) = broken {
            backend.insert_raw(DEFAULT_COLLECTION, "broken", doc);
        }

        let capsules = store.list_by_user(&UserId::new("alice")).await.unwrap();
        assert_eq!(capsules.len(), 1);
        assert_eq!(capsules[0].title, "fine");
    }

    #[tokio::test]
    async fn update_merges_and_leaves_other_records_alone() {
        let (_, _, store) = fixture();
        let a = store.create(draft("a", "alice")).await.unwrap();
        let b = store.create(draft("b", "alice")).await.unwrap();

        let patch = CapsulePatch {
            title: Some("renamed".into()),
            ..CapsulePatch::default()
        };
        store.update(&a, &patch).await.unwrap();

        let a = store.get(&a).await.unwrap().unwrap();
        let b = store.get(&b).await.unwrap().unwrap();
        assert_eq!(a.title, "renamed");
        assert_eq!(a.description, "something to remember");
        assert_eq!(b.title, "b");
    }

    #[tokio::test]
    async fn update_missing_id_is_not_found() {
        let (_, _, store) = fixture();
        let err = store
            .update("ghost", &CapsulePatch::unlock())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::NotFound);
    }

    #[tokio::test]
    async fn update_refuses_to_relock() {
        let (_, _, store) = fixture();
        let id = store.create(draft("a", "alice")).await.unwrap();
        store.update(&id, &CapsulePatch::unlock()).await.unwrap();

        let relock = CapsulePatch {
            is_unlocked: Some(false),
            ..CapsulePatch::default()
        };
        let err = store.update(&id, &relock).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Validation);
        assert!(store.get(&id).await.unwrap().unwrap().is_unlocked);
    }

    #[tokio::test]
    async fn get_owned_checks_user_id() {
        let (_, _, store) = fixture();
        let id = store.create(draft("mine", "alice")).await.unwrap();

        let alice = Session::signed_in(CurrentUser::new("alice"));
        let bob = Session::signed_in(CurrentUser::new("bob"));

        assert_eq!(store.get_owned(&alice, &id).await.unwrap().title, "mine");
        let err = store.get_owned(&bob, &id).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::PermissionDenied);
        let err = store.get_owned(&Session::anonymous(), &id).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn unlock_is_monotonic_and_repeatable() {
        let (backend, _, store) = fixture();
        let id = store.create(draft("mine", "alice")).await.unwrap();
        let alice = Session::signed_in(CurrentUser::new("alice"));

        assert!(store.unlock(&alice, &id).await.unwrap().is_unlocked);
        assert!(store.unlock(&alice, &id).await.unwrap().is_unlocked);
        assert_eq!(backend.update_count(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_, _, store) = fixture();
        let id = store.create(draft("gone", "alice")).await.unwrap();

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
