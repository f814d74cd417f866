//! Push-then-pull sync rounds.

use crate::applier::BatchApplier;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{PlanCounts, Reconciler};
use cachesync_model::{Entity, EntityKind, KindSpec, LocalRecord, SyncState, Timestamp};
use cachesync_remote::{Mutation, RemoteFetcher};
use cachesync_store::{Batch, LocalStore, Query};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The current state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No round has run, or the last one was cancelled.
    Idle,
    /// Sending pending local mutations.
    Pushing,
    /// Reconciling remote collections.
    Pulling,
    /// The last round succeeded.
    Synced,
    /// The last round failed.
    Error,
}

impl EngineState {
    /// Returns true while a round is running.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Pushing | EngineState::Pulling)
    }

    /// Returns true if a new round can start.
    pub fn can_start_round(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about sync rounds.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Rounds that pushed and pulled every kind.
    pub rounds_completed: u64,
    /// Rounds with a failed push or pull.
    pub rounds_failed: u64,
    /// Mutations accepted by the remote source.
    pub entities_pushed: u64,
    /// Entities inserted by pulls.
    pub inserts_pulled: u64,
    /// Entities updated by pulls.
    pub updates_pulled: u64,
    /// Entities deleted by pulls.
    pub deletes_pulled: u64,
    /// End of the last round.
    pub last_round_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of the push phase.
#[derive(Debug)]
pub enum PushOutcome {
    /// Every pending mutation was accepted and committed locally.
    Completed {
        /// Number of mutations sent.
        pushed: usize,
    },
    /// A mutation failed; nothing was committed locally.
    Failed(SyncError),
    /// The round was cancelled before pushing.
    Cancelled,
}

impl PushOutcome {
    /// Returns true if the push completed.
    pub fn is_success(&self) -> bool {
        matches!(self, PushOutcome::Completed { .. })
    }

    /// Returns the failure, if any.
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            PushOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Outcome of pulling one kind.
#[derive(Debug)]
pub enum KindStatus {
    /// The plan was applied.
    Applied(PlanCounts),
    /// Planning or applying failed; nothing was written for this kind.
    Failed(SyncError),
    /// The round was cancelled before this kind.
    Cancelled,
    /// Pull did not reach this kind.
    NotRun,
}

/// Pull outcome of one kind.
#[derive(Debug)]
pub struct KindOutcome {
    /// The pulled kind.
    pub kind: EntityKind,
    /// What happened.
    pub status: KindStatus,
}

/// Outcome of the pull phase, one entry per kind in sync order.
#[derive(Debug, Default)]
pub struct PullOutcome {
    /// Per-kind outcomes.
    pub kinds: Vec<KindOutcome>,
}

impl PullOutcome {
    fn with_status(specs: &[KindSpec], status: impl Fn() -> KindStatus) -> Self {
        Self {
            kinds: specs
                .iter()
                .map(|spec| KindOutcome {
                    kind: spec.kind().clone(),
                    status: status(),
                })
                .collect(),
        }
    }

    /// Returns true if every kind was applied.
    pub fn is_success(&self) -> bool {
        self.kinds
            .iter()
            .all(|outcome| matches!(outcome.status, KindStatus::Applied(_)))
    }

    /// Returns the status of `kind`.
    pub fn status(&self, kind: &EntityKind) -> Option<&KindStatus> {
        self.kinds
            .iter()
            .find(|outcome| outcome.kind == *kind)
            .map(|outcome| &outcome.status)
    }

    /// Sums the counts of every applied kind.
    pub fn counts(&self) -> PlanCounts {
        let mut total = PlanCounts::default();
        for outcome in &self.kinds {
            if let KindStatus::Applied(counts) = outcome.status {
                total += counts;
            }
        }
        total
    }

    /// Returns the failures, in sync order.
    pub fn errors(&self) -> impl Iterator<Item = (&EntityKind, &SyncError)> {
        self.kinds.iter().filter_map(|outcome| match &outcome.status {
            KindStatus::Failed(err) => Some((&outcome.kind, err)),
            _ => None,
        })
    }

    fn was_cancelled(&self) -> bool {
        self.kinds
            .iter()
            .any(|outcome| matches!(outcome.status, KindStatus::Cancelled))
    }
}

/// Result of one round, delivering both phases to the caller.
#[derive(Debug)]
pub struct RoundReport {
    /// Push phase.
    pub push: PushOutcome,
    /// Pull phase. Every kind is `NotRun` unless the push completed.
    pub pull: PullOutcome,
    /// Wall time of the round.
    pub duration: Duration,
}

impl RoundReport {
    /// Returns true if both phases fully succeeded.
    pub fn is_success(&self) -> bool {
        self.push.is_success() && self.pull.is_success()
    }

    /// Returns the first failure of the round.
    pub fn first_error(&self) -> Option<&SyncError> {
        self.push
            .error()
            .or_else(|| self.pull.errors().next().map(|(_, err)| err))
    }

    fn was_cancelled(&self) -> bool {
        matches!(self.push, PushOutcome::Cancelled) || self.pull.was_cancelled()
    }
}

/// Requests cancellation of a running round.
///
/// Cancellation is checked before the push and before each pulled kind.
/// Batches already committed stand.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs sync rounds for the tracked kinds.
///
/// A round pushes every pending local mutation, commits the resulting
/// store changes in one batch, and only then pulls each kind. Rounds run on
/// the calling thread; [`crate::SyncWorker`] moves them off it.
pub struct SyncOrchestrator<S: LocalStore, R: RemoteFetcher> {
    config: SyncConfig,
    store: Arc<S>,
    remote: Arc<R>,
    state: RwLock<EngineState>,
    stats: RwLock<SyncStats>,
    cancel: CancelHandle,
}

impl<S: LocalStore, R: RemoteFetcher> SyncOrchestrator<S, R> {
    /// Creates a new orchestrator.
    pub fn new(config: SyncConfig, store: Arc<S>, remote: Arc<R>) -> Self {
        Self {
            config,
            store,
            remote,
            state: RwLock::new(EngineState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancel: CancelHandle::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the remote fetcher.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Gets the current state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels the running round.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns a handle that cancels rounds of this orchestrator.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs a round over every tracked kind.
    ///
    /// # Errors
    ///
    /// Fails only if a round is already running. Push and pull failures
    /// are reported in the returned [`RoundReport`].
    pub fn run_round(&self) -> SyncResult<RoundReport> {
        self.run(self.config.kinds.clone())
    }

    /// Runs a round over `kinds`, in the given order.
    ///
    /// # Errors
    ///
    /// Fails if a kind is not tracked or a round is already running.
    pub fn run_round_for(&self, kinds: &[EntityKind]) -> SyncResult<RoundReport> {
        let specs = kinds
            .iter()
            .map(|kind| {
                self.config
                    .spec(kind)
                    .cloned()
                    .ok_or_else(|| SyncError::UnknownKind { kind: kind.clone() })
            })
            .collect::<SyncResult<Vec<_>>>()?;
        self.run(specs)
    }

    fn run(&self, specs: Vec<KindSpec>) -> SyncResult<RoundReport> {
        self.begin()?;
        let start = Instant::now();
        info!(kinds = specs.len(), "starting sync round");

        let push = match self.check_cancelled().and_then(|()| self.push(&specs)) {
            Ok(pushed) => PushOutcome::Completed { pushed },
            Err(SyncError::Cancelled) => PushOutcome::Cancelled,
            Err(err) => {
                warn!(error = %err, "push failed, skipping pull");
                PushOutcome::Failed(err)
            }
        };

        let pull = if push.is_success() {
            self.set_state(EngineState::Pulling);
            self.pull(&specs)
        } else {
            PullOutcome::with_status(&specs, || KindStatus::NotRun)
        };

        let report = RoundReport {
            push,
            pull,
            duration: start.elapsed(),
        };
        self.finish(&report);
        Ok(report)
    }

    /// Moves to `Pushing` unless a round is running.
    fn begin(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start_round() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *state),
                to: format!("{:?}", EngineState::Pushing),
            });
        }
        *state = EngineState::Pushing;
        self.cancel.reset();
        Ok(())
    }

    fn finish(&self, report: &RoundReport) {
        let mut stats = self.stats.write();
        if let PushOutcome::Completed { pushed } = report.push {
            stats.entities_pushed += pushed as u64;
        }
        let pulled = report.pull.counts();
        stats.inserts_pulled += pulled.inserts as u64;
        stats.updates_pulled += pulled.updates as u64;
        stats.deletes_pulled += pulled.deletes as u64;
        stats.last_round_time = Some(Instant::now());

        if let Some(err) = report.first_error() {
            stats.rounds_failed += 1;
            drop(stats);
            self.handle_error(err);
        } else if report.was_cancelled() {
            drop(stats);
            info!("sync round cancelled");
            self.set_state(EngineState::Idle);
        } else {
            stats.rounds_completed += 1;
            stats.last_error = None;
            drop(stats);
            info!(
                inserted = pulled.inserts,
                updated = pulled.updates,
                deleted = pulled.deletes,
                duration_ms = report.duration.as_millis() as u64,
                "sync round completed"
            );
            self.set_state(EngineState::Synced);
        }
    }

    /// Checks if the round was cancelled.
    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sets the state.
    fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&self, error: &SyncError) {
        self.set_state(EngineState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }

    /// Sends every pending mutation, then commits the staged store changes.
    fn push(&self, specs: &[KindSpec]) -> SyncResult<usize> {
        let mut staged = Batch::new();
        let mut pushed = 0;
        for spec in specs {
            pushed += self.push_kind(spec, &mut staged)?;
        }
        BatchApplier::new(&*self.store).apply(&staged)?;
        Ok(pushed)
    }

    fn push_kind(&self, spec: &KindSpec, staged: &mut Batch) -> SyncResult<usize> {
        let records = self.store.query(&Query::kind(spec.kind().clone()))?;
        let mut pushed = 0;

        for record in records.iter().filter(|r| r.state == SyncState::PendingDelete) {
            self.send(spec, Mutation::Delete {
                id: record.id().to_string(),
            })?;
            staged.delete(record.storage_id);
            pushed += 1;
        }

        let Some(nested) = spec.nested() else {
            for record in records.iter().filter(|r| r.state == SyncState::PendingPut) {
                self.send_put(spec, record, record.entity.clone())?;
                acknowledge(record, staged);
                pushed += 1;
            }
            return Ok(pushed);
        };

        for owner in records.iter().filter(|r| r.state != SyncState::PendingDelete) {
            let items = self
                .store
                .query(&Query::kind(nested.kind.clone()).owned_by(owner.storage_id))?;
            let edited = owner.state == SyncState::PendingPut
                || items.iter().any(|item| item.state == SyncState::PendingPut);

            if !edited {
                for item in items.iter().filter(|item| item.state == SyncState::PendingDelete) {
                    self.send(spec, Mutation::DeleteNested {
                        owner_id: owner.id().to_string(),
                        item_id: item.id().to_string(),
                    })?;
                    staged.delete(item.storage_id);
                    pushed += 1;
                }
                continue;
            }

            // the remote replaces the owner's items with the ones it is sent
            let payload = owner.entity.clone().with_items(
                items
                    .iter()
                    .filter(|item| item.state != SyncState::PendingDelete)
                    .map(|item| item.entity.clone())
                    .collect(),
            );
            self.send_put(spec, owner, payload)?;
            pushed += 1;

            if owner.state == SyncState::PendingPut {
                acknowledge(owner, staged);
            }
            for item in &items {
                match item.state {
                    SyncState::PendingPut => acknowledge(item, staged),
                    SyncState::PendingDelete => {
                        staged.delete(item.storage_id);
                    }
                    SyncState::Synced | SyncState::Getting => {}
                }
            }
        }
        Ok(pushed)
    }

    /// Sends `payload` as a create for local-only records and as an update
    /// otherwise.
    fn send_put(&self, spec: &KindSpec, record: &LocalRecord, payload: Entity) -> SyncResult<()> {
        let mutation = if record.entity.is_local_only() {
            Mutation::Create(payload)
        } else {
            Mutation::Update(payload)
        };
        self.send(spec, mutation)
    }

    fn send(&self, spec: &KindSpec, mutation: Mutation) -> SyncResult<()> {
        debug!(
            kind = %spec.kind(),
            action = mutation.label(),
            id = mutation.target_id(),
            "pushing"
        );
        self.remote.mutate(spec, &mutation).map_err(|err| {
            warn!(kind = %spec.kind(), id = mutation.target_id(), error = %err, "push rejected");
            SyncError::from(err)
        })
    }

    /// Pulls each kind independently.
    fn pull(&self, specs: &[KindSpec]) -> PullOutcome {
        let mut outcome = PullOutcome::default();
        let mut stopped = false;

        for spec in specs {
            let status = if stopped {
                KindStatus::NotRun
            } else if self.cancel.is_cancelled() {
                KindStatus::Cancelled
            } else {
                match self.pull_kind(spec) {
                    Ok(counts) => KindStatus::Applied(counts),
                    Err(err) => {
                        warn!(kind = %spec.kind(), error = %err, "pull failed");
                        stopped = self.config.stop_pull_on_error;
                        KindStatus::Failed(err)
                    }
                }
            };
            outcome.kinds.push(KindOutcome {
                kind: spec.kind().clone(),
                status,
            });
        }
        outcome
    }

    fn pull_kind(&self, spec: &KindSpec) -> SyncResult<PlanCounts> {
        let plan = Reconciler::from_config(&*self.store, &*self.remote, &self.config).plan(spec)?;
        let counts = plan.counts();
        BatchApplier::new(&*self.store).apply(&plan.into_batch())?;

        debug!(
            kind = %spec.kind(),
            inserted = counts.inserts,
            updated = counts.updates,
            deleted = counts.deletes,
            "pulled"
        );
        Ok(counts)
    }
}

/// Stages the `Synced` state for a pushed record.
fn acknowledge(record: &LocalRecord, staged: &mut Batch) {
    if record.entity.is_local_only() {
        // stamp locally until the next pull brings the remote copy
        let mut acknowledged = record.entity.clone();
        acknowledged.created = Some(Timestamp::now());
        staged.update(record.storage_id, acknowledged, SyncState::Synced);
    } else {
        staged.set_state(record.storage_id, SyncState::Synced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachesync_remote::{MemoryRemote, RemoteError};
    use cachesync_store::MemoryStore;

    fn orchestrator(kinds: Vec<KindSpec>) -> SyncOrchestrator<MemoryStore, MemoryRemote> {
        SyncOrchestrator::new(
            SyncConfig::new(kinds),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRemote::new()),
        )
    }

    #[test]
    fn state_predicates() {
        assert!(EngineState::Idle.can_start_round());
        assert!(EngineState::Error.can_start_round());
        assert!(EngineState::Pushing.is_active());
        assert!(!EngineState::Pulling.can_start_round());
    }

    #[test]
    fn empty_round_succeeds() {
        let engine = orchestrator(vec![KindSpec::flat("charts")]);
        let report = engine.run_round().unwrap();

        assert!(report.is_success());
        assert_eq!(engine.state(), EngineState::Synced);
        assert_eq!(engine.stats().rounds_completed, 1);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let engine = orchestrator(vec![KindSpec::flat("charts")]);
        let err = engine.run_round_for(&["maps".into()]).unwrap_err();
        assert!(matches!(err, SyncError::UnknownKind { .. }));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn pull_failure_sets_error_state() {
        let engine = orchestrator(vec![KindSpec::flat("charts")]);
        engine
            .remote()
            .fail_reads("charts", RemoteError::network("offline"));

        let report = engine.run_round().unwrap();
        assert!(report.push.is_success());
        assert!(matches!(
            report.pull.status(&"charts".into()),
            Some(KindStatus::Failed(SyncError::Network(_)))
        ));
        assert_eq!(engine.state(), EngineState::Error);

        let stats = engine.stats();
        assert_eq!(stats.rounds_failed, 1);
        assert!(stats.last_error.unwrap().contains("offline"));
    }

    #[test]
    fn local_create_is_stamped_after_push() {
        let engine = orchestrator(vec![KindSpec::flat("charts")]);
        let id = engine
            .store()
            .record_local_put(&"charts".into(), Entity::new_local("Bars"), None)
            .unwrap();
        // keep the pull from refreshing the record
        engine
            .remote()
            .fail_reads("charts", RemoteError::network("offline"));

        let report = engine.run_round().unwrap();
        assert!(matches!(report.push, PushOutcome::Completed { pushed: 1 }));

        let record = engine.store().get(id).unwrap().unwrap();
        assert_eq!(record.state, SyncState::Synced);
        assert!(!record.entity.is_local_only());
    }

    #[test]
    fn cancel_before_round_is_cleared() {
        let engine = orchestrator(vec![KindSpec::flat("charts")]);
        engine.cancel();
        assert!(engine.run_round().unwrap().is_success());
    }
}
