//! In-memory remote source.

use crate::error::{RemoteError, RemoteResult};
use crate::fetcher::{Mutation, RemoteFetcher};
use cachesync_model::{Entity, EntityKind, KindSpec, Timestamp};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A call received by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `fetch_collection`.
    FetchCollection {
        /// Requested kind.
        kind: EntityKind,
        /// Id filter.
        ids: Vec<String>,
        /// Whether full bodies were requested.
        expand: bool,
    },
    /// `fetch_item`.
    FetchItem {
        /// Requested kind.
        kind: EntityKind,
        /// Requested id.
        id: String,
    },
    /// `mutate`.
    Mutate {
        /// Target kind.
        kind: EntityKind,
        /// The mutation.
        mutation: Mutation,
    },
}

impl RemoteCall {
    /// Returns the kind the call targeted.
    pub fn kind(&self) -> &EntityKind {
        match self {
            RemoteCall::FetchCollection { kind, .. }
            | RemoteCall::FetchItem { kind, .. }
            | RemoteCall::Mutate { kind, .. } => kind,
        }
    }

    /// Returns true for reads returning full bodies.
    pub fn is_expanded_read(&self) -> bool {
        matches!(
            self,
            RemoteCall::FetchCollection { expand: true, .. } | RemoteCall::FetchItem { .. }
        )
    }

    /// Returns true for mutations.
    pub fn is_mutation(&self) -> bool {
        matches!(self, RemoteCall::Mutate { .. })
    }
}

type FailureRule = Arc<dyn Fn(&RemoteCall) -> Option<RemoteError> + Send + Sync>;

/// A remote source held in memory, for tests and demos.
///
/// Bodies are stored fully expanded; non-expanded reads project them down to
/// identity fields. Mutations stamp `lastUpdated` (and `created` on create)
/// with the current time, the way a real server would. Every call is logged
/// and failure rules can be injected per call.
#[derive(Default)]
pub struct MemoryRemote {
    collections: Mutex<HashMap<EntityKind, Vec<Entity>>>,
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<Vec<FailureRule>>,
}

impl MemoryRemote {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entity` under `kind`, replacing any entity with the same id.
    pub fn put(&self, kind: impl Into<EntityKind>, entity: Entity) {
        let mut collections = self.collections.lock();
        let entities = collections.entry(kind.into()).or_default();
        match entities.iter_mut().find(|e| e.id == entity.id) {
            Some(existing) => *existing = entity,
            None => entities.push(entity),
        }
    }

    /// Removes an entity. Returns true if it existed.
    pub fn remove(&self, kind: &EntityKind, id: &str) -> bool {
        let mut collections = self.collections.lock();
        let Some(entities) = collections.get_mut(kind) else {
            return false;
        };
        let before = entities.len();
        entities.retain(|e| e.id != id);
        entities.len() != before
    }

    /// Returns the stored body of an entity.
    pub fn get(&self, kind: &EntityKind, id: &str) -> Option<Entity> {
        self.collections
            .lock()
            .get(kind)
            .and_then(|entities| entities.iter().find(|e| e.id == id).cloned())
    }

    /// Returns every stored entity of `kind`, in insertion order.
    pub fn entities(&self, kind: &EntityKind) -> Vec<Entity> {
        self.collections.lock().get(kind).cloned().unwrap_or_default()
    }

    /// Adds a failure rule. The first rule returning an error for a call
    /// fails it; the call is still logged.
    pub fn fail_when<F>(&self, rule: F)
    where
        F: Fn(&RemoteCall) -> Option<RemoteError> + Send + Sync + 'static,
    {
        self.failures.lock().push(Arc::new(rule));
    }

    /// Fails every mutation targeting entity `id`.
    pub fn fail_mutation(&self, id: impl Into<String>, error: RemoteError) {
        let id = id.into();
        self.fail_when(move |call| match call {
            RemoteCall::Mutate { mutation, .. } if mutation.target_id() == id => {
                Some(error.clone())
            }
            _ => None,
        });
    }

    /// Fails every read of `kind`.
    pub fn fail_reads(&self, kind: impl Into<EntityKind>, error: RemoteError) {
        let kind = kind.into();
        self.fail_when(move |call| {
            (!call.is_mutation() && *call.kind() == kind).then(|| error.clone())
        });
    }

    /// Removes every failure rule.
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Returns the calls received so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Forgets the logged calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Returns the number of reads that returned full bodies.
    pub fn expanded_reads(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.is_expanded_read()).count()
    }

    /// Returns the mutations received so far.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Mutate { mutation, .. } => Some(mutation.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RemoteCall) -> RemoteResult<()> {
        let failure = {
            let rules = self.failures.lock();
            rules.iter().find_map(|rule| rule(&call))
        };
        self.calls.lock().push(call);
        failure.map_or(Ok(()), Err)
    }

    fn not_found(kind: &EntityKind, id: &str) -> RemoteError {
        RemoteError::api(404, format!("{kind} {id} not found"))
    }
}

impl std::fmt::Debug for MemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRemote")
            .field("kinds", &self.collections.lock().len())
            .field("calls", &self.calls.lock().len())
            .field("failure_rules", &self.failures.lock().len())
            .finish()
    }
}

/// Reduces a body to its identity fields.
fn project(entity: &Entity, nested: bool) -> Entity {
    let mut projected = Entity::new(entity.id.clone(), entity.name.clone());
    projected.display_name = entity.display_name.clone();
    projected.created = entity.created;
    projected.last_updated = entity.last_updated;
    if nested {
        projected.items = Some(entity.nested().iter().map(|item| project(item, false)).collect());
    }
    projected
}

/// Stamps the items of a written owner. Items that differ from the stored
/// copy are updated at `now`; new items are also created at `now`.
fn stamp_items(owner: &mut Entity, stored: &[Entity], now: Timestamp) {
    let Some(items) = owner.items.as_mut() else {
        return;
    };
    for item in items {
        let previous = stored.iter().find(|candidate| candidate.id == item.id);
        if previous == Some(&*item) {
            continue;
        }
        item.created = previous.and_then(|p| p.created).or(item.created).or(Some(now));
        item.last_updated = Some(now);
    }
}

impl RemoteFetcher for MemoryRemote {
    fn fetch_collection(
        &self,
        spec: &KindSpec,
        ids: &[String],
        expand: bool,
    ) -> RemoteResult<Vec<Entity>> {
        self.record(RemoteCall::FetchCollection {
            kind: spec.kind().clone(),
            ids: ids.to_vec(),
            expand,
        })?;

        let collections = self.collections.lock();
        let entities = collections.get(spec.kind()).map(Vec::as_slice).unwrap_or(&[]);
        Ok(entities
            .iter()
            .filter(|e| ids.is_empty() || ids.contains(&e.id))
            .map(|e| {
                if expand {
                    e.clone()
                } else {
                    project(e, spec.is_owning())
                }
            })
            .collect())
    }

    fn fetch_item(&self, spec: &KindSpec, id: &str) -> RemoteResult<Entity> {
        self.record(RemoteCall::FetchItem {
            kind: spec.kind().clone(),
            id: id.to_string(),
        })?;
        self.get(spec.kind(), id)
            .ok_or_else(|| Self::not_found(spec.kind(), id))
    }

    fn mutate(&self, spec: &KindSpec, mutation: &Mutation) -> RemoteResult<()> {
        self.record(RemoteCall::Mutate {
            kind: spec.kind().clone(),
            mutation: mutation.clone(),
        })?;

        let kind = spec.kind();
        let now = Timestamp::now();
        match mutation {
            Mutation::Create(entity) => {
                if self.get(kind, &entity.id).is_some() {
                    return Err(RemoteError::api(409, format!("{kind} {} exists", entity.id)));
                }
                let mut created = entity.clone();
                created.created = Some(created.created.unwrap_or(now));
                created.last_updated = Some(now);
                stamp_items(&mut created, &[], now);
                self.put(kind.clone(), created);
            }
            Mutation::Update(entity) => {
                let existing = self
                    .get(kind, &entity.id)
                    .ok_or_else(|| Self::not_found(kind, &entity.id))?;
                let mut updated = entity.clone();
                updated.created = existing.created;
                updated.last_updated = Some(now);
                stamp_items(&mut updated, existing.nested(), now);
                self.put(kind.clone(), updated);
            }
            Mutation::Delete { id } => {
                if !self.remove(kind, id) {
                    return Err(Self::not_found(kind, id));
                }
            }
            Mutation::DeleteNested { owner_id, item_id } => {
                let mut owner = self
                    .get(kind, owner_id)
                    .ok_or_else(|| Self::not_found(kind, owner_id))?;
                let items = owner.items.get_or_insert_with(Vec::new);
                let before = items.len();
                items.retain(|item| item.id != *item_id);
                if items.len() == before {
                    return Err(Self::not_found(kind, item_id));
                }
                owner.last_updated = Some(now);
                self.put(kind.clone(), owner);
            }
        }
        Ok(())
    }
}
