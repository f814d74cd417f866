//! In-memory local store.

use crate::batch::{Batch, BatchReceipt, OpIndex, Owner, StoreOp};
use crate::error::{StorageError, StorageResult};
use crate::query::Query;
use crate::store::LocalStore;
use cachesync_model::{EntityKind, LocalRecord, StorageId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Record tables shared by the memory and file stores.
///
/// Batches are applied to a copy of the tables; the copy replaces the live
/// tables only once every operation succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    next_id: u64,
    records: BTreeMap<StorageId, LocalRecord>,
    #[serde(skip)]
    by_entity: HashMap<(EntityKind, String), StorageId>,
    #[serde(skip)]
    children: HashMap<StorageId, BTreeSet<StorageId>>,
}

impl Tables {
    /// Rebuilds the entity and owner indexes after deserialization.
    pub(crate) fn reindex(&mut self) -> StorageResult<()> {
        self.by_entity.clear();
        self.children.clear();
        for record in self.records.values() {
            if let Some(owner) = record.owner {
                if !self.records.contains_key(&owner) {
                    return Err(StorageError::Corrupted(format!(
                        "record {} is owned by missing record {owner}",
                        record.storage_id
                    )));
                }
                self.children.entry(owner).or_default().insert(record.storage_id);
            }
            let key = (record.kind.clone(), record.entity.id.clone());
            if self.by_entity.insert(key, record.storage_id).is_some() {
                return Err(StorageError::Corrupted(format!(
                    "entity {} cached twice as {}",
                    record.entity.id, record.kind
                )));
            }
            if record.storage_id.as_u64() >= self.next_id {
                return Err(StorageError::Corrupted(format!(
                    "record {} is beyond the id counter",
                    record.storage_id
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &LocalRecord> {
        self.records.values()
    }

    fn query(&self, query: &Query) -> Vec<LocalRecord> {
        self.records
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect()
    }

    fn get(&self, id: StorageId) -> Option<LocalRecord> {
        self.records.get(&id).cloned()
    }

    /// Applies `batch` to a copy of the tables and returns the copy.
    pub(crate) fn apply(&self, batch: &Batch) -> StorageResult<(Tables, BatchReceipt)> {
        batch.validate()?;

        let mut next = self.clone();
        let mut assigned: Vec<Option<StorageId>> = Vec::with_capacity(batch.len());

        for (index, op) in batch.ops().iter().enumerate() {
            let inserted = match op {
                StoreOp::Insert {
                    kind,
                    entity,
                    state,
                    owner,
                } => {
                    let owner = match owner {
                        Owner::None => None,
                        Owner::Stored(id) => {
                            if !next.records.contains_key(id) {
                                return Err(StorageError::OwnerNotFound { op: index, owner: *id });
                            }
                            Some(*id)
                        }
                        Owner::BackRef(target) => {
                            let id = resolve_back_reference(&assigned, index, *target)?;
                            // the owner may have been deleted later in the batch
                            if !next.records.contains_key(&id) {
                                return Err(StorageError::OwnerNotFound { op: index, owner: id });
                            }
                            Some(id)
                        }
                    };

                    let key = (kind.clone(), entity.id.clone());
                    if next.by_entity.contains_key(&key) {
                        return Err(StorageError::DuplicateEntity {
                            op: index,
                            kind: kind.clone(),
                            id: entity.id.clone(),
                        });
                    }

                    let storage_id = StorageId::new(next.next_id);
                    next.next_id += 1;
                    next.by_entity.insert(key, storage_id);
                    if let Some(owner) = owner {
                        next.children.entry(owner).or_default().insert(storage_id);
                    }
                    next.records.insert(
                        storage_id,
                        LocalRecord {
                            storage_id,
                            kind: kind.clone(),
                            owner,
                            state: *state,
                            entity: entity.clone(),
                        },
                    );
                    Some(storage_id)
                }
                StoreOp::Update { id, entity, state } => {
                    let record = next
                        .records
                        .get_mut(id)
                        .ok_or(StorageError::RecordNotFound { op: index, id: *id })?;
                    if record.entity.id != entity.id {
                        return Err(StorageError::invalid_operation(
                            index,
                            format!(
                                "update would change entity id {} to {}",
                                record.entity.id, entity.id
                            ),
                        ));
                    }
                    record.entity = entity.clone();
                    record.state = *state;
                    None
                }
                StoreOp::SetState { id, state } => {
                    let record = next
                        .records
                        .get_mut(id)
                        .ok_or(StorageError::RecordNotFound { op: index, id: *id })?;
                    record.state = *state;
                    None
                }
                StoreOp::Delete { id } => {
                    next.remove_with_owned(index, *id)?;
                    None
                }
            };
            assigned.push(inserted);
        }

        Ok((next, BatchReceipt::new(assigned)))
    }

    fn remove_with_owned(&mut self, op: usize, id: StorageId) -> StorageResult<()> {
        let record = self
            .records
            .remove(&id)
            .ok_or(StorageError::RecordNotFound { op, id })?;
        self.by_entity.remove(&(record.kind, record.entity.id));
        if let Some(siblings) = record.owner.and_then(|owner| self.children.get_mut(&owner)) {
            siblings.remove(&id);
        }

        for child in self.children.remove(&id).unwrap_or_default() {
            self.remove_with_owned(op, child)?;
        }
        Ok(())
    }
}

fn resolve_back_reference(
    assigned: &[Option<StorageId>],
    op: usize,
    target: OpIndex,
) -> StorageResult<StorageId> {
    assigned
        .get(target.as_usize())
        .copied()
        .flatten()
        .ok_or(StorageError::InvalidBackReference {
            op,
            target: target.as_usize(),
        })
}

/// An in-memory local store.
///
/// This store keeps every record in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Caches that don't need to survive a restart
///
/// # Thread Safety
///
/// Readers never observe a partially applied batch: batches are applied to
/// a private copy that is swapped in under the write lock.
///
/// # Example
///
/// ```rust
/// use cachesync_model::{Entity, EntityKind, SyncState};
/// use cachesync_store::{Batch, LocalStore, MemoryStore, Owner};
///
/// let store = MemoryStore::new();
/// let mut batch = Batch::new();
/// batch.insert(EntityKind::new("dashboards"), Entity::new("d1", "Main"), SyncState::Synced, Owner::None);
/// store.apply_batch(&batch).unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Returns the number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().records.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of every record, ordered by storage id.
    #[must_use]
    pub fn records(&self) -> Vec<LocalRecord> {
        self.tables.read().records().cloned().collect()
    }

    /// Applies `batch`, running `commit` on the new tables before they
    /// replace the live ones. An error from `commit` discards the batch.
    pub(crate) fn apply_with<F>(&self, batch: &Batch, commit: F) -> StorageResult<BatchReceipt>
    where
        F: FnOnce(&Tables) -> StorageResult<()>,
    {
        let mut tables = self.tables.write();
        let (next, receipt) = tables.apply(batch)?;
        commit(&next)?;
        *tables = next;

        debug!(
            ops = batch.len(),
            inserted = receipt.inserted(),
            "committed batch"
        );
        Ok(receipt)
    }
}

impl LocalStore for MemoryStore {
    fn query(&self, query: &Query) -> StorageResult<Vec<LocalRecord>> {
        Ok(self.tables.read().query(query))
    }

    fn get(&self, id: StorageId) -> StorageResult<Option<LocalRecord>> {
        Ok(self.tables.read().get(id))
    }

    fn apply_batch(&self, batch: &Batch) -> StorageResult<BatchReceipt> {
        if batch.is_empty() {
            return Ok(BatchReceipt::default());
        }
        self.apply_with(batch, |_| Ok(()))
    }
}
