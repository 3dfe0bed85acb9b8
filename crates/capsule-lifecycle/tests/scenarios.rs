//! End-to-end capsule flows over the in-memory store with a pinned clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use capsule_db::{CapsuleStore, MemoryDocumentStore, StoreErrorKind};
use capsule_lifecycle::{Reconciler, query};
use capsule_types::{
    CapsuleDraft, CapsuleQuery, Clock, CurrentUser, ManualClock, Session, UserId,
};

struct Harness {
    clock: Arc<ManualClock>,
    reconciler: Reconciler,
    session: Session,
}

impl Harness {
    fn new(user: &str) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap(),
        ));
        let store =
            CapsuleStore::new(Arc::new(MemoryDocumentStore::new())).with_clock(clock.clone());
        Self {
            clock: clock.clone(),
            reconciler: Reconciler::new(store, clock),
            session: Session::signed_in(CurrentUser::new(user)),
        }
    }

    fn store(&self) -> &CapsuleStore {
        self.reconciler.store()
    }

    fn user(&self) -> &UserId {
        self.session.user_id().unwrap()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn create(&self, title: &str, unlock_date: DateTime<Utc>) -> String {
        self.store()
            .create_for(&self.session, CapsuleDraft::new(title, "for later", unlock_date))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn capsule_dated_yesterday_unlocks_once() {
    let h = Harness::new("alice");
    let id = h.create("Yesterday", h.now() - Duration::days(1)).await;

    let first = h.reconciler.reconcile(h.user()).await.unwrap();
    assert_eq!(first.unlocked.len(), 1);
    assert_eq!(first.unlocked[0].id, id);
    assert!(first.unlocked[0].is_unlocked);

    let second = h.reconciler.reconcile(h.user()).await.unwrap();
    assert!(second.unlocked.is_empty());
}

#[tokio::test]
async fn capsule_dated_next_year_stays_locked() {
    let h = Harness::new("alice");
    let id = h.create("Next year", h.now() + Duration::days(365)).await;

    let report = h.reconciler.reconcile(h.user()).await.unwrap();
    assert!(report.unlocked.is_empty());
    assert!(!h.store().get(&id).await.unwrap().unwrap().is_unlocked);
}

#[tokio::test]
async fn only_the_due_capsule_of_two_unlocks() {
    let h = Harness::new("alice");
    let due = h.create("Due", h.now() - Duration::hours(1)).await;
    let pending = h.create("Pending", h.now() + Duration::days(10)).await;

    let report = h.reconciler.reconcile(h.user()).await.unwrap();
    assert_eq!(report.unlocked.len(), 1);
    assert_eq!(report.unlocked[0].id, due);

    let listed = h.store().list_by_user(h.user()).await.unwrap();
    let pending = listed.iter().find(|c| c.id == pending).unwrap();
    assert!(!pending.is_unlocked);
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn search_finds_graduation_capsule() {
    let h = Harness::new("alice");
    h.create("Graduation Memories", h.now() + Duration::days(30)).await;
    h.create("Trip Photos", h.now() + Duration::days(30)).await;

    let capsules = h.store().list_by_user(h.user()).await.unwrap();
    let found = query::filter(&capsules, &CapsuleQuery::search("grad"), h.now());

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "Graduation Memories");
}

#[tokio::test]
async fn creation_without_description_is_rejected() {
    let h = Harness::new("alice");
    let draft = CapsuleDraft::new("No description", "", h.now());

    let err = h.store().create_for(&h.session, draft).await.unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::Validation);
    assert!(h.store().list_by_user(h.user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn capsule_unlocks_after_clock_passes_its_date() {
    let h = Harness::new("alice");
    h.create("Soon", h.now() + Duration::days(2)).await;

    assert!(h.reconciler.reconcile(h.user()).await.unwrap().unlocked.is_empty());

    h.clock.advance(Duration::days(2));
    let report = h.reconciler.reconcile(h.user()).await.unwrap();
    assert_eq!(report.unlocked.len(), 1);
    assert_eq!(report.checked_at, h.now());
}

#[tokio::test]
async fn users_do_not_see_each_others_capsules() {
    let alice = Harness::new("alice");
    let bob_session = Session::signed_in(CurrentUser::new("bob"));
    alice
        .store()
        .create_for(
            &bob_session,
            CapsuleDraft::new("Bob's", "private", alice.now() - Duration::days(1)),
        )
        .await
        .unwrap();

    assert!(alice.store().list_by_user(alice.user()).await.unwrap().is_empty());
    assert!(alice.reconciler.reconcile(alice.user()).await.unwrap().unlocked.is_empty());

    let bob = UserId::new("bob");
    assert_eq!(alice.reconciler.reconcile(&bob).await.unwrap().unlocked.len(), 1);
}
