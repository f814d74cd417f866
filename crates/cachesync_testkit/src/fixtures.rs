//! Test fixtures and store helpers.
//!
//! Provides tracked kinds, entity builders and seeding functions for the
//! common sync scenarios.

use cachesync_model::{Entity, EntityKind, KindSpec, LocalRecord, StorageId, SyncState, Timestamp};
use cachesync_remote::MemoryRemote;
use cachesync_store::{Batch, FileStore, LocalStore, MemoryStore, Owner, Query};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Milliseconds of 2024-01-01T00:00:00Z, the origin of [`at`].
pub const EPOCH_MILLIS: i64 = 1_704_067_200_000;

/// Parses a timestamp literal.
///
/// # Panics
///
/// Panics if the literal is not a valid timestamp.
pub fn ts(value: &str) -> Timestamp {
    Timestamp::parse(value).expect("invalid timestamp literal")
}

/// Returns the timestamp `secs` seconds after [`EPOCH_MILLIS`].
pub fn at(secs: i64) -> Timestamp {
    Timestamp::from_millis(EPOCH_MILLIS + secs * 1000).expect("timestamp out of range")
}

/// A flat kind.
pub fn charts() -> KindSpec {
    KindSpec::flat("charts")
}

/// A second flat kind.
pub fn maps() -> KindSpec {
    KindSpec::flat("maps")
}

/// An owning kind whose items travel in `dashboardItems`.
pub fn dashboards() -> KindSpec {
    KindSpec::owning("dashboards", "dashboardItems", "dashboardItems")
}

/// Kind of the items owned by [`dashboards`].
pub fn dashboard_items() -> EntityKind {
    EntityKind::new("dashboardItems")
}

/// An entity the remote source knows, last updated at `at(secs)`.
pub fn entity(id: &str, secs: i64) -> Entity {
    Entity::new(id, format!("{id} name"))
        .with_created(at(0))
        .with_last_updated(at(secs))
}

/// An owning entity carrying `items`.
pub fn owner(id: &str, secs: i64, items: Vec<Entity>) -> Entity {
    entity(id, secs).with_items(items)
}

/// An entity authored locally and never pushed.
pub fn local_entity(name: &str) -> Entity {
    Entity::new_local(name)
}

/// Caches `entity` as a top-level record.
pub fn seed(store: &dyn LocalStore, kind: impl Into<EntityKind>, entity: Entity, state: SyncState) -> StorageId {
    let mut batch = Batch::new();
    let index = batch.insert(kind.into(), entity, state, Owner::None);
    store
        .apply_batch(&batch)
        .expect("failed to seed record")
        .storage_id(index)
        .expect("seed insert assigned no id")
}

/// Caches `entity` as an item of `owner`.
pub fn seed_item(
    store: &dyn LocalStore,
    kind: impl Into<EntityKind>,
    owner: StorageId,
    entity: Entity,
    state: SyncState,
) -> StorageId {
    let mut batch = Batch::new();
    let index = batch.insert(kind.into(), entity, state, Owner::Stored(owner));
    store
        .apply_batch(&batch)
        .expect("failed to seed item")
        .storage_id(index)
        .expect("seed insert assigned no id")
}

/// Caches an owning entity and its items the way a pull would, all `Synced`.
///
/// # Panics
///
/// Panics if `spec` is not an owning kind.
pub fn seed_owner(store: &dyn LocalStore, spec: &KindSpec, entity: Entity) -> StorageId {
    let nested = spec.nested().expect("seed_owner needs an owning kind");
    let mut batch = Batch::new();
    let index = batch.insert(spec.kind().clone(), entity.without_items(), SyncState::Synced, Owner::None);
    for item in entity.nested() {
        batch.insert(nested.kind.clone(), item.clone(), SyncState::Synced, Owner::BackRef(index));
    }
    store
        .apply_batch(&batch)
        .expect("failed to seed owner")
        .storage_id(index)
        .expect("seed insert assigned no id")
}

/// Returns the cached records of `kind`, keyed by entity id.
pub fn cached(store: &dyn LocalStore, kind: impl Into<EntityKind>) -> BTreeMap<String, LocalRecord> {
    store
        .query(&Query::kind(kind.into()))
        .expect("failed to query store")
        .into_iter()
        .map(|record| (record.id().to_string(), record))
        .collect()
}

/// Returns the sorted entity ids cached for `kind`.
pub fn cached_ids(store: &dyn LocalStore, kind: impl Into<EntityKind>) -> Vec<String> {
    cached(store, kind).into_keys().collect()
}

/// Returns the state of a cached entity.
pub fn state_of(store: &dyn LocalStore, kind: impl Into<EntityKind>, id: &str) -> Option<SyncState> {
    store
        .find(&kind.into(), id)
        .expect("failed to query store")
        .map(|record| record.state)
}

/// Returns the sorted ids of the items cached under `owner`.
pub fn item_ids(store: &dyn LocalStore, kind: impl Into<EntityKind>, owner: StorageId) -> Vec<String> {
    let mut ids: Vec<String> = store
        .query(&Query::kind(kind.into()).owned_by(owner))
        .expect("failed to query store")
        .into_iter()
        .map(|record| record.entity.id)
        .collect();
    ids.sort();
    ids
}

/// An in-memory store paired with an in-memory remote.
pub struct SyncFixture {
    /// The local store.
    pub store: Arc<MemoryStore>,
    /// The remote source.
    pub remote: Arc<MemoryRemote>,
}

impl SyncFixture {
    /// Creates an empty fixture.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            remote: Arc::new(MemoryRemote::new()),
        }
    }
}

impl Default for SyncFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A file-backed store in a temporary directory, paired with an in-memory
/// remote.
pub struct FileFixture {
    /// The local store.
    pub store: Arc<FileStore>,
    /// The remote source.
    pub remote: Arc<MemoryRemote>,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl FileFixture {
    /// Creates an empty fixture.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(&dir.path().join("cache")).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            remote: Arc::new(MemoryRemote::new()),
            dir,
        }
    }

    /// Closes the store and opens it again from disk.
    ///
    /// # Panics
    ///
    /// Panics if another handle to the store is still alive.
    pub fn reopen(self) -> Self {
        let Self { store, remote, dir } = self;
        let store = Arc::try_unwrap(store).unwrap_or_else(|_| panic!("store is still shared"));
        drop(store);
        let store = FileStore::open(&dir.path().join("cache")).expect("Failed to reopen file store");
        Self {
            store: Arc::new(store),
            remote,
            dir,
        }
    }
}

impl Default for FileFixture {
    fn default() -> Self {
        Self::new()
    }
}
