//! Behaviour every `LocalStore` must share, run against both stores.

use cachesync_model::{Entity, EntityKind, SyncState, Timestamp};
use cachesync_store::{Batch, FileStore, LocalStore, MemoryStore, Owner, Query, StorageError};
use tempfile::TempDir;

fn dashboards() -> EntityKind {
    EntityKind::new("dashboards")
}

fn items() -> EntityKind {
    EntityKind::new("dashboardItems")
}

fn known(id: &str) -> Entity {
    let ts = Timestamp::parse("2024-03-01T10:00:00.000").unwrap();
    Entity::new(id, id).with_created(ts).with_last_updated(ts)
}

fn with_stores(check: impl Fn(&dyn LocalStore)) {
    check(&MemoryStore::new());

    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    check(&store);
}

#[test]
fn owner_and_items_commit_together() {
    with_stores(|store| {
        let mut batch = Batch::new();
        let owner = batch.insert(dashboards(), known("d1"), SyncState::Synced, Owner::None);
        batch.insert(items(), known("i1"), SyncState::Synced, Owner::BackRef(owner));
        batch.insert(items(), known("i2"), SyncState::Synced, Owner::BackRef(owner));
        let receipt = store.apply_batch(&batch).unwrap();
        assert_eq!(receipt.inserted(), 3);

        let owner_id = receipt.storage_id(owner).unwrap();
        let nested = store
            .query(&Query::kind(items()).owned_by(owner_id))
            .unwrap();
        assert_eq!(nested.len(), 2);
    });
}

#[test]
fn invalid_back_reference_commits_nothing() {
    with_stores(|store| {
        let mut batch = Batch::new();
        batch.insert(dashboards(), known("d1"), SyncState::Synced, Owner::None);
        batch.insert(
            items(),
            known("i1"),
            SyncState::Synced,
            Owner::BackRef(cachesync_store::OpIndex::new(5)),
        );

        let err = store.apply_batch(&batch).unwrap_err();
        assert!(matches!(err, StorageError::InvalidBackReference { op: 1, target: 5 }));
        assert!(store.query(&Query::kind(dashboards())).unwrap().is_empty());
    });
}

#[test]
fn state_queries_select_pending_records() {
    with_stores(|store| {
        let mut batch = Batch::new();
        batch.insert(dashboards(), known("a"), SyncState::Synced, Owner::None);
        batch.insert(dashboards(), known("b"), SyncState::PendingPut, Owner::None);
        batch.insert(dashboards(), known("c"), SyncState::PendingDelete, Owner::None);
        batch.insert(dashboards(), known("d"), SyncState::Getting, Owner::None);
        store.apply_batch(&batch).unwrap();

        let pending: Vec<String> = store
            .query(&Query::kind(dashboards()).with_states([SyncState::PendingPut, SyncState::PendingDelete]))
            .unwrap()
            .into_iter()
            .map(|r| r.entity.id)
            .collect();
        assert_eq!(pending, vec!["b", "c"]);
    });
}

#[test]
fn find_locates_by_entity_id() {
    with_stores(|store| {
        let mut batch = Batch::new();
        batch.insert(dashboards(), known("d1"), SyncState::Synced, Owner::None);
        store.apply_batch(&batch).unwrap();

        assert!(store.find(&dashboards(), "d1").unwrap().is_some());
        assert!(store.find(&dashboards(), "d2").unwrap().is_none());
        assert!(store.find(&items(), "d1").unwrap().is_none());
    });
}

#[test]
fn local_edit_of_synced_record_becomes_pending_put() {
    with_stores(|store| {
        let mut batch = Batch::new();
        batch.insert(dashboards(), known("d1"), SyncState::Synced, Owner::None);
        store.apply_batch(&batch).unwrap();

        let mut edited = known("d1");
        edited.name = "Renamed".into();
        let id = store.record_local_put(&dashboards(), edited, None).unwrap();

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.state, SyncState::PendingPut);
        assert_eq!(record.entity.name, "Renamed");
    });
}

#[test]
fn deleting_known_owner_keeps_items_until_pushed() {
    with_stores(|store| {
        let mut batch = Batch::new();
        let owner = batch.insert(dashboards(), known("d1"), SyncState::Synced, Owner::None);
        batch.insert(items(), known("i1"), SyncState::Synced, Owner::BackRef(owner));
        let receipt = store.apply_batch(&batch).unwrap();
        let owner_id = receipt.storage_id(owner).unwrap();

        store.record_local_delete(owner_id).unwrap();
        assert_eq!(store.get(owner_id).unwrap().unwrap().state, SyncState::PendingDelete);
        assert_eq!(store.query(&Query::kind(items())).unwrap().len(), 1);

        let mut batch = Batch::new();
        batch.delete(owner_id);
        store.apply_batch(&batch).unwrap();
        assert!(store.query(&Query::kind(items())).unwrap().is_empty());
    });
}

#[test]
fn file_store_reopen_preserves_owner_links() {
    let dir = TempDir::new().unwrap();
    let owner_id = {
        let store = FileStore::open(dir.path()).unwrap();
        let mut batch = Batch::new();
        let owner = batch.insert(dashboards(), known("d1"), SyncState::Synced, Owner::None);
        batch.insert(items(), known("i1"), SyncState::Synced, Owner::BackRef(owner));
        store.apply_batch(&batch).unwrap().storage_id(owner).unwrap()
    };

    let store = FileStore::open(dir.path()).unwrap();
    let nested = store.query(&Query::kind(items()).owned_by(owner_id)).unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].entity.created, known("i1").created);

    // ids keep counting from where the previous session stopped
    let mut batch = Batch::new();
    let next = batch.insert(dashboards(), known("d2"), SyncState::Synced, Owner::None);
    let receipt = store.apply_batch(&batch).unwrap();
    assert!(receipt.storage_id(next).unwrap() > nested[0].storage_id);
}
