//! Reconciliation of a cached kind against its remote collection.
//!
//! A pull compares the cached records of a kind with a lightweight remote
//! listing (identity fields and `lastUpdated` only) and classifies every id:
//!
//! - cached but absent remotely: delete
//! - remote `lastUpdated` strictly after the cached one: update
//! - remote only: insert
//! - anything else: untouched
//!
//! Records with a pending local mutation are never compared; their ids are
//! dropped from the remote listing so a pull can neither overwrite nor
//! re-create them. Only changed owning entities are downloaded in full.

use crate::config::{ExpansionStrategy, PullScope, SyncConfig};
use crate::error::{SyncError, SyncResult};
use cachesync_model::{
    to_ids, to_map, Entity, EntityKind, KindSpec, LocalRecord, NestedSpec, SyncState, Timestamp,
};
use cachesync_remote::RemoteFetcher;
use cachesync_store::{Batch, LocalStore, Owner, Query};
use std::collections::HashMap;
use std::ops::AddAssign;
use tracing::debug;

/// One classified entity of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Remove a cached record that the remote source no longer has.
    Delete {
        /// The cached record.
        record: LocalRecord,
    },
    /// Replace a cached record with a newer remote body.
    Update {
        /// The cached record.
        record: LocalRecord,
        /// The new body, without nested items.
        entity: Entity,
        /// Steps for the owner's nested items.
        nested: Vec<PlanStep>,
    },
    /// Cache a remote entity.
    Insert {
        /// The body, without nested items.
        entity: Entity,
        /// Inserts for the owner's nested items.
        nested: Vec<PlanStep>,
    },
}

impl PlanStep {
    /// Returns the id of the classified entity.
    pub fn entity_id(&self) -> &str {
        match self {
            PlanStep::Delete { record } | PlanStep::Update { record, .. } => record.id(),
            PlanStep::Insert { entity, .. } => &entity.id,
        }
    }

    /// Returns the nested steps.
    pub fn nested(&self) -> &[PlanStep] {
        match self {
            PlanStep::Delete { .. } => &[],
            PlanStep::Update { nested, .. } | PlanStep::Insert { nested, .. } => nested,
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            PlanStep::Delete { .. } => "delete",
            PlanStep::Update { .. } => "update",
            PlanStep::Insert { .. } => "insert",
        }
    }
}

/// Number of classified entities, nested items included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCounts {
    /// Inserted entities.
    pub inserts: usize,
    /// Updated entities.
    pub updates: usize,
    /// Deleted entities.
    pub deletes: usize,
}

impl PlanCounts {
    /// Returns the number of changed entities.
    pub fn total(&self) -> usize {
        self.inserts + self.updates + self.deletes
    }

    fn count(&mut self, steps: &[PlanStep]) {
        for step in steps {
            match step {
                PlanStep::Delete { .. } => self.deletes += 1,
                PlanStep::Update { .. } => self.updates += 1,
                PlanStep::Insert { .. } => self.inserts += 1,
            }
            self.count(step.nested());
        }
    }
}

impl AddAssign for PlanCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserts += other.inserts;
        self.updates += other.updates;
        self.deletes += other.deletes;
    }
}

/// The outcome of reconciling one kind: deletes, then updates, then inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    spec: KindSpec,
    steps: Vec<PlanStep>,
}

impl ReconcilePlan {
    /// Returns the reconciled kind.
    pub fn spec(&self) -> &KindSpec {
        &self.spec
    }

    /// Returns the top-level steps in order.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Counts the classified entities.
    pub fn counts(&self) -> PlanCounts {
        let mut counts = PlanCounts::default();
        counts.count(&self.steps);
        counts
    }

    /// Flattens the plan into one batch.
    ///
    /// Every delete, nested or not, comes first so that an item moving
    /// between owners is gone from its old owner before it is inserted
    /// under the new one. Nested inserts under an inserted owner reference
    /// the owner's insert by position; under an updated owner they reference
    /// its storage id. Every written record is `Synced`.
    pub fn into_batch(self) -> Batch {
        let mut batch = Batch::new();
        let nested_kind = self.spec.nested().map(|nested| nested.kind.clone());

        let mut writes = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            match step {
                PlanStep::Delete { record } => {
                    batch.delete(record.storage_id);
                }
                PlanStep::Update {
                    record,
                    entity,
                    nested,
                } => {
                    let (deletes, rest): (Vec<_>, Vec<_>) = nested
                        .into_iter()
                        .partition(|step| matches!(step, PlanStep::Delete { .. }));
                    for step in deletes {
                        if let PlanStep::Delete { record } = step {
                            batch.delete(record.storage_id);
                        }
                    }
                    writes.push(PlanStep::Update {
                        record,
                        entity,
                        nested: rest,
                    });
                }
                insert @ PlanStep::Insert { .. } => writes.push(insert),
            }
        }

        for step in writes {
            match step {
                PlanStep::Delete { .. } => {}
                PlanStep::Update {
                    record,
                    entity,
                    nested,
                } => {
                    batch.update(record.storage_id, entity, SyncState::Synced);
                    push_nested(&mut batch, nested_kind.as_ref(), nested, Owner::Stored(record.storage_id));
                }
                PlanStep::Insert { entity, nested } => {
                    let owner = batch.insert(self.spec.kind().clone(), entity, SyncState::Synced, Owner::None);
                    push_nested(&mut batch, nested_kind.as_ref(), nested, Owner::BackRef(owner));
                }
            }
        }
        batch
    }
}

#[derive(Debug, Default)]
struct Diff {
    deletes: Vec<LocalRecord>,
    updates: Vec<(LocalRecord, Entity)>,
    inserts: Vec<Entity>,
}

/// Classifies `cached` against `remote`.
fn diff(kind: &EntityKind, cached: Vec<LocalRecord>, scope: PullScope, remote: Vec<Entity>) -> SyncResult<Diff> {
    let mut order = Vec::with_capacity(remote.len());
    let mut by_id: HashMap<String, (Entity, Timestamp)> = HashMap::with_capacity(remote.len());
    for entity in remote {
        let last_updated = entity
            .validate()
            .map_err(|err| SyncError::reconciliation(format!("{kind}: {err}")))?;
        if by_id.contains_key(&entity.id) {
            return Err(SyncError::reconciliation(format!(
                "{kind}: remote listed {} twice",
                entity.id
            )));
        }
        order.push(entity.id.clone());
        by_id.insert(entity.id.clone(), (entity, last_updated));
    }

    let mut diff = Diff::default();
    for record in cached {
        let remote = by_id.remove(record.id());
        if !scope.includes(record.state) {
            continue;
        }
        match remote {
            None => {
                debug!(%kind, id = record.id(), name = %record.entity.name, "deleting");
                diff.deletes.push(record);
            }
            Some((entity, remote_updated)) => {
                let newer = record
                    .entity
                    .last_updated
                    .map_or(true, |cached_updated| remote_updated.is_after(&cached_updated));
                if newer {
                    debug!(%kind, id = record.id(), name = %entity.name, "updating");
                    diff.updates.push((record, entity));
                }
            }
        }
    }

    for id in order {
        if let Some((entity, _)) = by_id.remove(&id) {
            debug!(%kind, id = %entity.id, name = %entity.name, "inserting");
            diff.inserts.push(entity);
        }
    }
    Ok(diff)
}

/// Plans the pull of one kind.
pub struct Reconciler<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    remote: &'a R,
    scope: PullScope,
    expansion: ExpansionStrategy,
}

impl<'a, S, R> Reconciler<'a, S, R>
where
    S: LocalStore + ?Sized,
    R: RemoteFetcher + ?Sized,
{
    /// Creates a reconciler with the default scope and expansion.
    pub fn new(store: &'a S, remote: &'a R) -> Self {
        Self {
            store,
            remote,
            scope: PullScope::default(),
            expansion: ExpansionStrategy::default(),
        }
    }

    /// Creates a reconciler following `config`.
    pub fn from_config(store: &'a S, remote: &'a R, config: &SyncConfig) -> Self {
        Self::new(store, remote)
            .with_scope(config.pull_scope)
            .with_expansion(config.expansion)
    }

    /// Sets the pull scope.
    #[must_use]
    pub fn with_scope(mut self, scope: PullScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the expansion strategy.
    #[must_use]
    pub fn with_expansion(mut self, expansion: ExpansionStrategy) -> Self {
        self.expansion = expansion;
        self
    }

    /// Reads the lightweight remote collection of `spec` and plans its pull.
    ///
    /// # Errors
    ///
    /// Fails on remote or store errors, and on remote data that cannot be
    /// reconciled. Nothing is written either way.
    pub fn plan(&self, spec: &KindSpec) -> SyncResult<ReconcilePlan> {
        let remote = self.remote.fetch_collection(spec, &[], false)?;
        self.plan_against(spec, remote)
    }

    /// Plans the pull of `spec` against an already fetched lightweight
    /// listing.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::plan`].
    pub fn plan_against(&self, spec: &KindSpec, remote: Vec<Entity>) -> SyncResult<ReconcilePlan> {
        let cached = self.store.query(&Query::kind(spec.kind().clone()))?;
        let diff = diff(spec.kind(), cached, self.scope, remote)?;

        let mut steps: Vec<PlanStep> = diff
            .deletes
            .into_iter()
            .map(|record| PlanStep::Delete { record })
            .collect();

        let Some(nested) = spec.nested() else {
            steps.extend(diff.updates.into_iter().map(|(record, entity)| PlanStep::Update {
                record,
                entity,
                nested: Vec::new(),
            }));
            steps.extend(diff.inserts.into_iter().map(|entity| PlanStep::Insert {
                entity,
                nested: Vec::new(),
            }));
            return Ok(ReconcilePlan {
                spec: spec.clone(),
                steps,
            });
        };

        let mut changed = to_ids(diff.updates.iter().map(|(_, entity)| entity));
        changed.extend(to_ids(&diff.inserts));
        let mut expanded = self.expand(spec, &changed)?;

        for (record, _) in diff.updates {
            let full = take_expanded(spec.kind(), &mut expanded, record.id())?;
            let nested_steps = self.nested_steps(nested, Some(&record), &full)?;
            steps.push(PlanStep::Update {
                record,
                entity: full.without_items(),
                nested: nested_steps,
            });
        }
        for entity in diff.inserts {
            let full = take_expanded(spec.kind(), &mut expanded, &entity.id)?;
            let nested_steps = self.nested_steps(nested, None, &full)?;
            steps.push(PlanStep::Insert {
                entity: full.without_items(),
                nested: nested_steps,
            });
        }

        Ok(ReconcilePlan {
            spec: spec.clone(),
            steps,
        })
    }

    /// Downloads full bodies of `ids`.
    fn expand(&self, spec: &KindSpec, ids: &[String]) -> SyncResult<HashMap<String, Entity>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        debug!(kind = %spec.kind(), count = ids.len(), strategy = ?self.expansion, "expanding");

        let expanded = match self.expansion {
            ExpansionStrategy::Batched => to_map(self.remote.fetch_collection(spec, ids, true)?),
            ExpansionStrategy::PerEntity => {
                let mut expanded = HashMap::with_capacity(ids.len());
                for id in ids {
                    let entity = self.remote.fetch_item(spec, id)?;
                    if entity.id != *id {
                        return Err(SyncError::reconciliation(format!(
                            "{}: requested {id}, remote returned {}",
                            spec.kind(),
                            entity.id
                        )));
                    }
                    expanded.insert(id.clone(), entity);
                }
                expanded
            }
        };

        for entity in expanded.values() {
            entity
                .validate()
                .map_err(|err| SyncError::reconciliation(format!("{}: {err}", spec.kind())))?;
        }
        Ok(expanded)
    }

    /// Classifies the nested items of an owner's expanded body.
    ///
    /// A new owner has no cached items, so every item is an insert.
    fn nested_steps(
        &self,
        nested: &NestedSpec,
        owner: Option<&LocalRecord>,
        full: &Entity,
    ) -> SyncResult<Vec<PlanStep>> {
        let cached = match owner {
            Some(owner) => self
                .store
                .query(&Query::kind(nested.kind.clone()).owned_by(owner.storage_id))?,
            None => Vec::new(),
        };
        let diff = diff(&nested.kind, cached, self.scope, full.nested().to_vec())?;

        let mut steps = Vec::with_capacity(diff.deletes.len() + diff.updates.len() + diff.inserts.len());
        steps.extend(diff.deletes.into_iter().map(|record| PlanStep::Delete { record }));
        steps.extend(diff.updates.into_iter().map(|(record, entity)| PlanStep::Update {
            record,
            entity,
            nested: Vec::new(),
        }));
        steps.extend(diff.inserts.into_iter().map(|entity| PlanStep::Insert {
            entity,
            nested: Vec::new(),
        }));
        Ok(steps)
    }
}

fn take_expanded(kind: &EntityKind, expanded: &mut HashMap<String, Entity>, id: &str) -> SyncResult<Entity> {
    expanded
        .remove(id)
        .ok_or_else(|| SyncError::reconciliation(format!("{kind}: expanded read is missing {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachesync_model::StorageId;

    fn ts(value: &str) -> Timestamp {
        Timestamp::parse(value).unwrap()
    }

    fn record(id: u64, entity_id: &str, state: SyncState, updated: &str) -> LocalRecord {
        LocalRecord {
            storage_id: StorageId::new(id),
            kind: EntityKind::new("charts"),
            owner: None,
            state,
            entity: Entity::new(entity_id, entity_id).with_last_updated(ts(updated)),
        }
    }

    fn remote(entity_id: &str, updated: &str) -> Entity {
        Entity::new(entity_id, entity_id).with_last_updated(ts(updated))
    }

    #[test]
    fn classifies_by_timestamp() {
        let cached = vec![
            record(1, "a", SyncState::Synced, "2024-01-01T00:00:00"),
            record(2, "b", SyncState::Synced, "2024-01-01T00:00:00"),
            record(3, "c", SyncState::Synced, "2024-01-01T00:00:00"),
        ];
        let listing = vec![
            remote("a", "2024-01-01T00:00:00"),
            remote("b", "2024-01-02T00:00:00"),
            remote("d", "2024-01-01T00:00:00"),
        ];

        let diff = diff(&"charts".into(), cached, PullScope::NonPending, listing).unwrap();
        assert_eq!(diff.deletes.len(), 1);
        assert_eq!(diff.deletes[0].id(), "c");
        assert_eq!(diff.updates.len(), 1);
        assert_eq!(diff.updates[0].0.id(), "b");
        assert_eq!(to_ids(&diff.inserts), vec!["d"]);
    }

    #[test]
    fn older_remote_is_ignored() {
        let cached = vec![record(1, "a", SyncState::Synced, "2024-01-02T00:00:00")];
        let listing = vec![remote("a", "2024-01-01T00:00:00")];
        let diff = diff(&"charts".into(), cached, PullScope::NonPending, listing).unwrap();
        assert!(diff.updates.is_empty() && diff.inserts.is_empty() && diff.deletes.is_empty());
    }

    #[test]
    fn pending_ids_are_never_touched() {
        let cached = vec![
            record(1, "put", SyncState::PendingPut, "2024-01-01T00:00:00"),
            record(2, "del", SyncState::PendingDelete, "2024-01-01T00:00:00"),
        ];
        let listing = vec![remote("put", "2024-02-01T00:00:00"), remote("del", "2024-02-01T00:00:00")];
        let diff = diff(&"charts".into(), cached, PullScope::NonPending, listing).unwrap();
        assert!(diff.updates.is_empty() && diff.inserts.is_empty() && diff.deletes.is_empty());
    }

    #[test]
    fn getting_only_scope_leaves_synced_records_alone() {
        let cached = vec![
            record(1, "a", SyncState::Synced, "2024-01-01T00:00:00"),
            record(2, "b", SyncState::Getting, "2024-01-01T00:00:00"),
        ];
        let listing = vec![remote("a", "2024-02-01T00:00:00")];
        let diff = diff(&"charts".into(), cached, PullScope::GettingOnly, listing).unwrap();
        assert!(diff.updates.is_empty() && diff.inserts.is_empty());
        assert_eq!(diff.deletes.len(), 1);
        assert_eq!(diff.deletes[0].id(), "b");
    }

    #[test]
    fn cached_copy_without_timestamp_is_refreshed() {
        let mut cached = record(1, "a", SyncState::Synced, "2024-01-01T00:00:00");
        cached.entity.last_updated = None;
        let listing = vec![remote("a", "2024-01-01T00:00:00")];
        let diff = diff(&"charts".into(), vec![cached], PullScope::NonPending, listing).unwrap();
        assert_eq!(diff.updates.len(), 1);
    }

    #[test]
    fn invalid_listings_are_rejected() {
        let missing = vec![Entity::new("a", "a")];
        assert!(matches!(
            diff(&"charts".into(), Vec::new(), PullScope::NonPending, missing),
            Err(SyncError::Reconciliation(_))
        ));

        let duplicate = vec![remote("a", "2024-01-01T00:00:00"), remote("a", "2024-01-02T00:00:00")];
        assert!(matches!(
            diff(&"charts".into(), Vec::new(), PullScope::NonPending, duplicate),
            Err(SyncError::Reconciliation(_))
        ));

        let empty_id = vec![remote("", "2024-01-01T00:00:00")];
        assert!(diff(&"charts".into(), Vec::new(), PullScope::NonPending, empty_id).is_err());
    }

    #[test]
    fn counts_include_nested_steps() {
        let plan = ReconcilePlan {
            spec: KindSpec::owning("dashboards", "dashboardItems", "dashboardItems"),
            steps: vec![PlanStep::Insert {
                entity: remote("d", "2024-01-01T00:00:00"),
                nested: vec![
                    PlanStep::Insert {
                        entity: remote("i1", "2024-01-01T00:00:00"),
                        nested: Vec::new(),
                    },
                    PlanStep::Insert {
                        entity: remote("i2", "2024-01-01T00:00:00"),
                        nested: Vec::new(),
                    },
                ],
            }],
        };
        assert_eq!(
            plan.counts(),
            PlanCounts {
                inserts: 3,
                updates: 0,
                deletes: 0
            }
        );
        assert_eq!(plan.counts().total(), 3);
    }

    #[test]
    fn inserted_owner_items_use_back_references() {
        let plan = ReconcilePlan {
            spec: KindSpec::owning("dashboards", "dashboardItems", "dashboardItems"),
            steps: vec![
                PlanStep::Delete {
                    record: record(9, "old", SyncState::Synced, "2024-01-01T00:00:00"),
                },
                PlanStep::Insert {
                    entity: remote("d", "2024-01-01T00:00:00"),
                    nested: vec![PlanStep::Insert {
                        entity: remote("i1", "2024-01-01T00:00:00"),
                        nested: Vec::new(),
                    }],
                },
            ],
        };

        let batch = plan.into_batch();
        assert_eq!(batch.len(), 3);
        match &batch.ops()[2] {
            cachesync_store::StoreOp::Insert { kind, owner, .. } => {
                assert_eq!(kind.as_str(), "dashboardItems");
                assert_eq!(*owner, Owner::BackRef(cachesync_store::OpIndex::new(1)));
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn nested_deletes_precede_every_write() {
        let item = |id: u64, entity_id: &str, owner: u64| LocalRecord {
            owner: Some(StorageId::new(owner)),
            kind: EntityKind::new("dashboardItems"),
            ..record(id, entity_id, SyncState::Synced, "2024-01-01T00:00:00")
        };
        let plan = ReconcilePlan {
            spec: KindSpec::owning("dashboards", "dashboardItems", "dashboardItems"),
            steps: vec![
                PlanStep::Update {
                    record: record(1, "d2", SyncState::Synced, "2024-01-01T00:00:00"),
                    entity: remote("d2", "2024-01-02T00:00:00"),
                    nested: vec![PlanStep::Insert {
                        entity: remote("i1", "2024-01-02T00:00:00"),
                        nested: Vec::new(),
                    }],
                },
                PlanStep::Update {
                    record: record(2, "d1", SyncState::Synced, "2024-01-01T00:00:00"),
                    entity: remote("d1", "2024-01-02T00:00:00"),
                    nested: vec![PlanStep::Delete { record: item(3, "i1", 2) }],
                },
            ],
        };

        let labels: Vec<&str> = plan.into_batch().ops().iter().map(|op| op.label()).collect();
        assert_eq!(labels, vec!["delete", "update", "insert", "update"]);
    }
}
