//! # cachesync store
//!
//! Local store contract and reference implementations.
//!
//! The sync engine reads cached records through [`LocalStore::query`] and
//! writes exclusively through [`LocalStore::apply_batch`], which must be
//! atomic: every operation of a [`Batch`] lands or none does.
//!
//! ## Back-references
//!
//! A nested item inserted in the same batch as its owner cannot name the
//! owner's storage id, because none has been assigned yet. It names the
//! owner's position in the batch instead ([`Owner::BackRef`]); the store
//! resolves the reference when it commits.
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral caches
//! - [`FileStore`] - Persists a CBOR snapshot after every committed batch
//!
//! ## Example
//!
//! ```rust
//! use cachesync_model::{Entity, EntityKind, SyncState};
//! use cachesync_store::{Batch, LocalStore, MemoryStore, Owner, Query};
//!
//! let store = MemoryStore::new();
//! let mut batch = Batch::new();
//! let owner = batch.insert("dashboards".into(), Entity::new("d1", "Main"), SyncState::Synced, Owner::None);
//! batch.insert("dashboardItems".into(), Entity::new("i1", "Chart"), SyncState::Synced, Owner::BackRef(owner));
//! store.apply_batch(&batch).unwrap();
//!
//! let items = store.query(&Query::kind(EntityKind::new("dashboardItems"))).unwrap();
//! assert_eq!(items.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod file;
mod memory;
mod query;
mod store;

pub use batch::{Batch, BatchReceipt, OpIndex, Owner, StoreOp};
pub use error::{StorageError, StorageResult};
pub use file::{FileStore, FORMAT_VERSION};
pub use memory::MemoryStore;
pub use query::Query;
pub use store::LocalStore;
