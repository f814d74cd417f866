//! Local store trait definition.

use crate::batch::{Batch, BatchReceipt, Owner};
use crate::error::{StorageError, StorageResult};
use crate::query::Query;
use cachesync_model::{Entity, EntityKind, LocalRecord, StorageId, SyncState};

/// The local cache the sync engine reconciles.
///
/// # Invariants
///
/// - `query` returns matching records ordered by storage id
/// - `apply_batch` is atomic: on error the store is observably unchanged
/// - Deleting an owner removes the records it owns
/// - Entity ids are unique within a kind
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - For testing
/// - [`crate::FileStore`] - For persistent caches
pub trait LocalStore: Send + Sync {
    /// Returns the records matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn query(&self, query: &Query) -> StorageResult<Vec<LocalRecord>>;

    /// Returns the record with storage id `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, id: StorageId) -> StorageResult<Option<LocalRecord>>;

    /// Applies every operation of `batch`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns an error if any operation is invalid against the current
    /// contents, or if the commit cannot be made durable.
    fn apply_batch(&self, batch: &Batch) -> StorageResult<BatchReceipt>;

    /// Looks up a record by kind and entity id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find(&self, kind: &EntityKind, entity_id: &str) -> StorageResult<Option<LocalRecord>> {
        Ok(self
            .query(&Query::kind(kind.clone()))?
            .into_iter()
            .find(|record| record.entity.id == entity_id))
    }

    /// Records a local create or edit, marking it `PendingPut`.
    ///
    /// Returns the storage id of the cached record.
    ///
    /// # Errors
    ///
    /// Fails if the entity is already pending deletion.
    fn record_local_put(
        &self,
        kind: &EntityKind,
        entity: Entity,
        owner: Option<StorageId>,
    ) -> StorageResult<StorageId> {
        let mut batch = Batch::new();
        let existing = self.find(kind, &entity.id)?;

        if let Some(record) = existing {
            if record.state == SyncState::PendingDelete {
                return Err(StorageError::invalid_operation(
                    0,
                    format!("entity {} is pending deletion", entity.id),
                ));
            }
            batch.update(record.storage_id, entity, SyncState::PendingPut);
            self.apply_batch(&batch)?;
            return Ok(record.storage_id);
        }

        let owner = owner.map_or(Owner::None, Owner::Stored);
        let index = batch.insert(kind.clone(), entity, SyncState::PendingPut, owner);
        let receipt = self.apply_batch(&batch)?;
        receipt
            .storage_id(index)
            .ok_or_else(|| StorageError::invalid_operation(index.as_usize(), "insert assigned no id"))
    }

    /// Records a local delete.
    ///
    /// Entities the remote source has never seen are dropped at once;
    /// everything else is marked `PendingDelete`.
    ///
    /// # Errors
    ///
    /// Fails if the record does not exist.
    fn record_local_delete(&self, id: StorageId) -> StorageResult<()> {
        let record = self
            .get(id)?
            .ok_or(StorageError::RecordNotFound { op: 0, id })?;

        let mut batch = Batch::new();
        if record.entity.is_local_only() {
            batch.delete(id);
        } else {
            batch.set_state(id, SyncState::PendingDelete);
        }
        self.apply_batch(&batch)?;
        Ok(())
    }

    /// Abandons a pending mutation, returning the record to `Synced`.
    ///
    /// # Errors
    ///
    /// Fails if the record does not exist.
    fn reset_state(&self, id: StorageId) -> StorageResult<()> {
        let mut batch = Batch::new();
        batch.set_state(id, SyncState::Synced);
        self.apply_batch(&batch)?;
        Ok(())
    }
}

impl<T: LocalStore + ?Sized> LocalStore for std::sync::Arc<T> {
    fn query(&self, query: &Query) -> StorageResult<Vec<LocalRecord>> {
        (**self).query(query)
    }

    fn get(&self, id: StorageId) -> StorageResult<Option<LocalRecord>> {
        (**self).get(id)
    }

    fn apply_batch(&self, batch: &Batch) -> StorageResult<BatchReceipt> {
        (**self).apply_batch(batch)
    }
}
