//! Pending command implementation.

use super::open_store;
use cachesync_model::LocalRecord;
use serde::Serialize;
use std::path::Path;

/// A record awaiting push.
#[derive(Debug, Serialize)]
pub struct PendingRecord {
    /// Kind name.
    pub kind: String,
    /// Entity id.
    pub id: String,
    /// Entity name.
    pub name: String,
    /// State code.
    pub state: &'static str,
    /// True if the remote source has never seen the entity.
    pub local_only: bool,
    /// Entity id of the owner, for nested items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Runs the pending command.
pub fn run(path: &Path, kind: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let pending = collect(&store.records(), kind);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        _ => {
            if pending.is_empty() {
                println!("No pending records");
            }
            for record in &pending {
                let owner = record
                    .owner
                    .as_ref()
                    .map(|owner| format!(" (in {owner})"))
                    .unwrap_or_default();
                let local = if record.local_only { " [new]" } else { "" };
                println!(
                    "{:<9} {} {} \"{}\"{}{}",
                    record.state, record.kind, record.id, record.name, owner, local
                );
            }
        }
    }

    Ok(())
}

fn collect(records: &[LocalRecord], kind: Option<&str>) -> Vec<PendingRecord> {
    records
        .iter()
        .filter(|record| record.state.is_pending())
        .filter(|record| kind.map_or(true, |kind| record.kind.as_str() == kind))
        .map(|record| PendingRecord {
            kind: record.kind.to_string(),
            id: record.entity.id.clone(),
            name: record.entity.name.clone(),
            state: record.state.code(),
            local_only: record.entity.is_local_only(),
            owner: record.owner.and_then(|owner| {
                records
                    .iter()
                    .find(|r| r.storage_id == owner)
                    .map(|r| r.entity.id.clone())
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachesync_model::{Entity, StorageId, SyncState, Timestamp};

    fn record(id: u64, kind: &str, owner: Option<u64>, state: SyncState) -> LocalRecord {
        LocalRecord {
            storage_id: StorageId::new(id),
            kind: kind.into(),
            owner: owner.map(StorageId::new),
            state,
            entity: Entity::new(format!("e{id}"), "entity").with_created(Timestamp::now()),
        }
    }

    #[test]
    fn collect_lists_pending_with_owner_ids() {
        let records = vec![
            record(1, "dashboards", None, SyncState::Synced),
            record(2, "dashboardItems", Some(1), SyncState::PendingDelete),
            record(3, "charts", None, SyncState::PendingPut),
            record(4, "charts", None, SyncState::Getting),
        ];

        let pending = collect(&records, None);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].owner.as_deref(), Some("e1"));
        assert_eq!(pending[0].state, "DELETING");
        assert_eq!(pending[1].id, "e3");
        assert!(!pending[1].local_only);
    }

    #[test]
    fn collect_filters_by_kind() {
        let records = vec![
            record(1, "charts", None, SyncState::PendingPut),
            record(2, "maps", None, SyncState::PendingPut),
        ];

        let pending = collect(&records, Some("maps"));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, "maps");
    }
}
