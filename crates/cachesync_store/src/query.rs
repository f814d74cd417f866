//! Record predicates.

use cachesync_model::{EntityKind, LocalRecord, StorageId, SyncState};

/// A predicate over cached records of one kind.
///
/// The state filter matches any of the listed states; the owner filter
/// restricts nested kinds to the items of one owner. Both are optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    kind: EntityKind,
    states: Option<Vec<SyncState>>,
    owner: Option<StorageId>,
}

impl Query {
    /// Matches every record of `kind`.
    pub fn kind(kind: EntityKind) -> Self {
        Self {
            kind,
            states: None,
            owner: None,
        }
    }

    /// Restricts to records in `state`.
    #[must_use]
    pub fn with_state(self, state: SyncState) -> Self {
        self.with_states([state])
    }

    /// Restricts to records in any of `states`.
    #[must_use]
    pub fn with_states(mut self, states: impl IntoIterator<Item = SyncState>) -> Self {
        self.states = Some(states.into_iter().collect());
        self
    }

    /// Restricts to nested records of `owner`.
    #[must_use]
    pub fn owned_by(mut self, owner: StorageId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Returns the queried kind.
    pub fn target_kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Returns true if `record` satisfies the predicate.
    pub fn matches(&self, record: &LocalRecord) -> bool {
        if record.kind != self.kind {
            return false;
        }
        if let Some(states) = &self.states {
            if !states.contains(&record.state) {
                return false;
            }
        }
        match self.owner {
            Some(owner) => record.owner == Some(owner),
            None => true,
        }
    }
}
