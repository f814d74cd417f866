//! Per-record sync state.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The pending-change marker of a locally cached record.
///
/// Exactly one state holds per record at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SyncState {
    /// In step with the last observed remote copy.
    Synced,
    /// Edited locally, awaiting push.
    PendingPut,
    /// Deleted locally, awaiting push.
    PendingDelete,
    /// Written by a pull that has not completed yet.
    Getting,
}

impl SyncState {
    /// All states, in declaration order.
    pub const ALL: [SyncState; 4] = [
        SyncState::Synced,
        SyncState::PendingPut,
        SyncState::PendingDelete,
        SyncState::Getting,
    ];

    /// Returns the stable code used in snapshots and tooling output.
    pub fn code(&self) -> &'static str {
        match self {
            SyncState::Synced => "SYNCED",
            SyncState::PendingPut => "PUTTING",
            SyncState::PendingDelete => "DELETING",
            SyncState::Getting => "GETTING",
        }
    }

    /// Converts from a stable code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "SYNCED" => Some(SyncState::Synced),
            "PUTTING" => Some(SyncState::PendingPut),
            "DELETING" => Some(SyncState::PendingDelete),
            "GETTING" => Some(SyncState::Getting),
            _ => None,
        }
    }

    /// Returns true if the record carries a local mutation not yet pushed.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::PendingPut | SyncState::PendingDelete)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SyncState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(&s.to_ascii_uppercase()).ok_or_else(|| ModelError::UnknownState(s.into()))
    }
}

impl TryFrom<String> for SyncState {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SyncState> for String {
    fn from(state: SyncState) -> Self {
        state.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes() {
        for state in SyncState::ALL {
            assert_eq!(SyncState::from_code(state.code()), Some(state));
        }
        assert_eq!(SyncState::from_code("PENDING"), None);
    }

    #[test]
    fn pending_states() {
        assert!(SyncState::PendingPut.is_pending());
        assert!(SyncState::PendingDelete.is_pending());
        assert!(!SyncState::Synced.is_pending());
        assert!(!SyncState::Getting.is_pending());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("deleting".parse::<SyncState>().unwrap(), SyncState::PendingDelete);
        assert!("gone".parse::<SyncState>().is_err());
    }
}
