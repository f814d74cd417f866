//! Remote fetcher abstraction.

use crate::error::RemoteResult;
use cachesync_model::{Entity, KindSpec};

/// A change pushed to the remote source.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Creates an entity the remote source has never seen.
    Create(Entity),
    /// Replaces an existing entity with the full local body.
    Update(Entity),
    /// Deletes an entity.
    Delete {
        /// Entity id.
        id: String,
    },
    /// Removes a nested item from its owner.
    DeleteNested {
        /// Owner entity id.
        owner_id: String,
        /// Nested item id.
        item_id: String,
    },
}

impl Mutation {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::Create(_) => "create",
            Mutation::Update(_) => "update",
            Mutation::Delete { .. } => "delete",
            Mutation::DeleteNested { .. } => "delete-nested",
        }
    }

    /// Returns the id of the entity this mutation targets.
    pub fn target_id(&self) -> &str {
        match self {
            Mutation::Create(entity) | Mutation::Update(entity) => &entity.id,
            Mutation::Delete { id } => id,
            Mutation::DeleteNested { item_id, .. } => item_id,
        }
    }
}

/// Read and write access to the authoritative remote source.
///
/// This trait abstracts the network layer so the sync core can run against
/// HTTP, an in-memory remote for testing, or anything else.
///
/// Every call blocks until the remote answers. Implementations never retry.
pub trait RemoteFetcher: Send + Sync {
    /// Fetches entities of `spec`.
    ///
    /// A non-empty `ids` restricts the result to those ids. With `expand`
    /// unset only identity fields are returned, including for nested items
    /// of collection kinds; with `expand` set full bodies are returned.
    fn fetch_collection(
        &self,
        spec: &KindSpec,
        ids: &[String],
        expand: bool,
    ) -> RemoteResult<Vec<Entity>>;

    /// Fetches one fully expanded entity.
    fn fetch_item(&self, spec: &KindSpec, id: &str) -> RemoteResult<Entity>;

    /// Pushes one mutation.
    fn mutate(&self, spec: &KindSpec, mutation: &Mutation) -> RemoteResult<()>;
}

impl<T: RemoteFetcher + ?Sized> RemoteFetcher for std::sync::Arc<T> {
    fn fetch_collection(
        &self,
        spec: &KindSpec,
        ids: &[String],
        expand: bool,
    ) -> RemoteResult<Vec<Entity>> {
        (**self).fetch_collection(spec, ids, expand)
    }

    fn fetch_item(&self, spec: &KindSpec, id: &str) -> RemoteResult<Entity> {
        (**self).fetch_item(spec, id)
    }

    fn mutate(&self, spec: &KindSpec, mutation: &Mutation) -> RemoteResult<()> {
        (**self).mutate(spec, mutation)
    }
}
