//! Configuration for the sync engine.

use cachesync_model::{EntityKind, KindSpec, SyncState};

/// Which cached records a pull compares against the remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullScope {
    /// Every record without a pending local mutation (`Synced` and `Getting`).
    #[default]
    NonPending,
    /// Only records explicitly marked `Getting`.
    GettingOnly,
}

impl PullScope {
    /// Returns true if records in `state` are compared.
    pub fn includes(self, state: SyncState) -> bool {
        match self {
            PullScope::NonPending => !state.is_pending(),
            PullScope::GettingOnly => state == SyncState::Getting,
        }
    }
}

/// How full bodies of changed owning entities are downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionStrategy {
    /// One expanded collection read filtered by every changed id.
    #[default]
    Batched,
    /// One expanded item read per changed entity.
    PerEntity,
}

/// What happens when a round is requested for a kind already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Queue the round behind the running one.
    #[default]
    Queue,
    /// Fail the request with `RoundInFlight`.
    Reject,
}

/// Configuration for sync rounds.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tracked kinds, synced in this order.
    pub kinds: Vec<KindSpec>,
    /// Records compared during pull.
    pub pull_scope: PullScope,
    /// Expansion of changed owning entities.
    pub expansion: ExpansionStrategy,
    /// Skip the remaining kinds once one kind fails to pull.
    pub stop_pull_on_error: bool,
    /// Handling of overlapping round requests.
    pub overlap_policy: OverlapPolicy,
    /// Maximum number of rounds waiting for the worker.
    pub queue_capacity: usize,
}

impl SyncConfig {
    /// Creates a configuration tracking `kinds`.
    pub fn new(kinds: impl IntoIterator<Item = KindSpec>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            pull_scope: PullScope::default(),
            expansion: ExpansionStrategy::default(),
            stop_pull_on_error: false,
            overlap_policy: OverlapPolicy::default(),
            queue_capacity: 16,
        }
    }

    /// Adds a tracked kind.
    pub fn with_kind(mut self, spec: KindSpec) -> Self {
        self.kinds.push(spec);
        self
    }

    /// Sets the pull scope.
    pub fn with_pull_scope(mut self, scope: PullScope) -> Self {
        self.pull_scope = scope;
        self
    }

    /// Sets the expansion strategy.
    pub fn with_expansion(mut self, expansion: ExpansionStrategy) -> Self {
        self.expansion = expansion;
        self
    }

    /// Stops pulling after the first failed kind.
    pub fn with_stop_pull_on_error(mut self, stop: bool) -> Self {
        self.stop_pull_on_error = stop;
        self
    }

    /// Sets the overlap policy.
    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    /// Sets the worker queue capacity. Zero is treated as one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Returns the spec of a tracked kind.
    pub fn spec(&self, kind: &EntityKind) -> Option<&KindSpec> {
        self.kinds.iter().find(|spec| spec.kind() == kind)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new([])
    }
}
