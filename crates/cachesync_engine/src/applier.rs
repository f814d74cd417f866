//! Atomic application of staged store operations.

use crate::error::SyncResult;
use cachesync_store::{Batch, BatchReceipt, LocalStore};
use tracing::{debug, info};

/// Hands staged batches to the local store.
///
/// During a round the store is written only through this type. A batch is
/// validated before it reaches the store, so a malformed batch fails without
/// touching it; the store's own atomicity covers everything else.
pub struct BatchApplier<'a, S: LocalStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: LocalStore + ?Sized> BatchApplier<'a, S> {
    /// Creates an applier writing to `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Applies `batch` atomically. Empty batches are not sent to the store.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the batch is malformed or the store
    /// rejects it. Nothing is written in either case.
    pub fn apply(&self, batch: &Batch) -> SyncResult<BatchReceipt> {
        if batch.is_empty() {
            debug!("nothing to apply");
            return Ok(BatchReceipt::default());
        }

        batch.validate()?;
        let receipt = self.store.apply_batch(batch)?;

        info!(ops = batch.len(), inserted = receipt.inserted(), "applied batch");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use cachesync_model::{Entity, EntityKind, LocalRecord, StorageId, SyncState};
    use cachesync_store::{MemoryStore, OpIndex, Owner, Query, StorageResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls before delegating.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        applies: AtomicUsize,
    }

    impl LocalStore for CountingStore {
        fn query(&self, query: &Query) -> StorageResult<Vec<LocalRecord>> {
            self.inner.query(query)
        }

        fn get(&self, id: StorageId) -> StorageResult<Option<LocalRecord>> {
            self.inner.get(id)
        }

        fn apply_batch(&self, batch: &Batch) -> StorageResult<BatchReceipt> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            self.inner.apply_batch(batch)
        }
    }

    fn kind() -> EntityKind {
        EntityKind::new("charts")
    }

    #[test]
    fn empty_batch_skips_store() {
        let store = CountingStore::default();
        BatchApplier::new(&store).apply(&Batch::new()).unwrap();
        assert_eq!(store.applies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn malformed_batch_never_reaches_store() {
        let store = CountingStore::default();
        let mut batch = Batch::new();
        batch.insert(kind(), Entity::new("a", "A"), SyncState::Synced, Owner::BackRef(OpIndex::new(3)));

        let err = BatchApplier::new(&store).apply(&batch).unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(store.applies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn store_rejection_surfaces_as_storage_error() {
        let store = CountingStore::default();
        let mut batch = Batch::new();
        batch.insert(kind(), Entity::new("a", "A"), SyncState::Synced, Owner::None);
        batch.set_state(StorageId::new(77), SyncState::Synced);

        let err = BatchApplier::new(&store).apply(&batch).unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(store.inner.is_empty());
    }

    #[test]
    fn applies_valid_batch() {
        let store = CountingStore::default();
        let mut batch = Batch::new();
        let index = batch.insert(kind(), Entity::new("a", "A"), SyncState::Synced, Owner::None);

        let receipt = BatchApplier::new(&store).apply(&batch).unwrap();
        assert!(receipt.storage_id(index).is_some());
        assert_eq!(store.inner.len(), 1);
    }
}
