//! Store-side records.

use crate::entity::Entity;
use crate::kind::EntityKind;
use crate::state::SyncState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity a local store assigns to a cached record.
///
/// Storage ids are only meaningful to the store that issued them. They are
/// never sent to the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(u64);

impl StorageId {
    /// Wraps a store-issued value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cached entity together with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Store-assigned identity.
    pub storage_id: StorageId,
    /// Kind of the cached entity.
    pub kind: EntityKind,
    /// Owner's storage id, for nested items.
    pub owner: Option<StorageId>,
    /// Pending-change marker.
    pub state: SyncState,
    /// The cached body.
    pub entity: Entity,
}

impl LocalRecord {
    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.entity.id
    }
}
