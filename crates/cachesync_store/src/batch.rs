//! Ordered operation lists.

use crate::error::{StorageError, StorageResult};
use cachesync_model::{Entity, EntityKind, StorageId, SyncState};

/// Position of an operation within a [`Batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpIndex(usize);

impl OpIndex {
    /// Creates an index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw position.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

/// Owner link of an inserted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Top-level record.
    None,
    /// Owner already durable in the store.
    Stored(StorageId),
    /// Owner inserted earlier in the same batch.
    BackRef(OpIndex),
}

/// A single store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Caches a new record.
    Insert {
        /// Kind of the entity.
        kind: EntityKind,
        /// Body to cache.
        entity: Entity,
        /// Initial state.
        state: SyncState,
        /// Owner link.
        owner: Owner,
    },
    /// Replaces the body and state of a record.
    Update {
        /// Target record.
        id: StorageId,
        /// New body.
        entity: Entity,
        /// New state.
        state: SyncState,
    },
    /// Changes only the state of a record.
    SetState {
        /// Target record.
        id: StorageId,
        /// New state.
        state: SyncState,
    },
    /// Removes a record and every record it owns.
    Delete {
        /// Target record.
        id: StorageId,
    },
}

impl StoreOp {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            StoreOp::Insert { .. } => "insert",
            StoreOp::Update { .. } => "update",
            StoreOp::SetState { .. } => "set-state",
            StoreOp::Delete { .. } => "delete",
        }
    }
}

/// An ordered list of store operations applied as one atomic unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<StoreOp>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation and returns its position.
    pub fn push(&mut self, op: StoreOp) -> OpIndex {
        self.ops.push(op);
        OpIndex(self.ops.len() - 1)
    }

    /// Appends an insert.
    pub fn insert(
        &mut self,
        kind: EntityKind,
        entity: Entity,
        state: SyncState,
        owner: Owner,
    ) -> OpIndex {
        self.push(StoreOp::Insert {
            kind,
            entity,
            state,
            owner,
        })
    }

    /// Appends an update.
    pub fn update(&mut self, id: StorageId, entity: Entity, state: SyncState) -> OpIndex {
        self.push(StoreOp::Update { id, entity, state })
    }

    /// Appends a state change.
    pub fn set_state(&mut self, id: StorageId, state: SyncState) -> OpIndex {
        self.push(StoreOp::SetState { id, state })
    }

    /// Appends a delete.
    pub fn delete(&mut self, id: StorageId) -> OpIndex {
        self.push(StoreOp::Delete { id })
    }

    /// Moves every operation of `other` to the end of this batch.
    ///
    /// Back-references inside `other` are rebased so they keep pointing at
    /// the same operations.
    pub fn append(&mut self, other: Batch) {
        let base = self.ops.len();
        self.ops.extend(other.ops.into_iter().map(|op| match op {
            StoreOp::Insert {
                kind,
                entity,
                state,
                owner: Owner::BackRef(OpIndex(target)),
            } => StoreOp::Insert {
                kind,
                entity,
                state,
                owner: Owner::BackRef(OpIndex(base + target)),
            },
            other => other,
        }));
    }

    /// Returns the operations in order.
    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    /// Returns the operation at `index`.
    pub fn get(&self, index: OpIndex) -> Option<&StoreOp> {
        self.ops.get(index.0)
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Checks the parts of the batch that do not depend on store contents:
    /// non-empty entity ids, and back-references naming an earlier insert.
    pub fn validate(&self) -> StorageResult<()> {
        for (index, op) in self.ops.iter().enumerate() {
            match op {
                StoreOp::Insert { entity, owner, .. } => {
                    if entity.id.is_empty() {
                        return Err(StorageError::invalid_operation(index, "entity id is empty"));
                    }
                    if let Owner::BackRef(OpIndex(target)) = owner {
                        let is_earlier_insert = *target < index
                            && matches!(self.ops.get(*target), Some(StoreOp::Insert { .. }));
                        if !is_earlier_insert {
                            return Err(StorageError::InvalidBackReference {
                                op: index,
                                target: *target,
                            });
                        }
                    }
                }
                StoreOp::Update { entity, .. } => {
                    if entity.id.is_empty() {
                        return Err(StorageError::invalid_operation(index, "entity id is empty"));
                    }
                }
                StoreOp::SetState { .. } | StoreOp::Delete { .. } => {}
            }
        }
        Ok(())
    }
}

/// Storage ids assigned by a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReceipt {
    assigned: Vec<Option<StorageId>>,
}

impl BatchReceipt {
    pub(crate) fn new(assigned: Vec<Option<StorageId>>) -> Self {
        Self { assigned }
    }

    /// Returns the storage id assigned to the insert at `index`.
    pub fn storage_id(&self, index: OpIndex) -> Option<StorageId> {
        self.assigned.get(index.0).copied().flatten()
    }

    /// Returns the number of inserted records.
    pub fn inserted(&self) -> usize {
        self.assigned.iter().filter(|id| id.is_some()).count()
    }
}
