//! Inspect command implementation.

use super::open_store;
use cachesync_model::{LocalRecord, SyncState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Number of cached records.
    pub record_count: usize,
    /// Number of records awaiting push.
    pub pending_count: usize,
    /// Per-kind statistics, by kind name.
    pub kinds: Vec<KindStats>,
}

/// Statistics for a single kind.
#[derive(Debug, Serialize, PartialEq)]
pub struct KindStats {
    /// Kind name.
    pub kind: String,
    /// Number of records.
    pub record_count: usize,
    /// Number of records owned by another record.
    pub owned_count: usize,
    /// Number of records per state code.
    pub states: BTreeMap<&'static str, usize>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let result = summarize(path, &store.records());

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn summarize(path: &Path, records: &[LocalRecord]) -> InspectResult {
    let mut kinds: BTreeMap<&str, KindStats> = BTreeMap::new();
    for record in records {
        let stats = kinds.entry(record.kind.as_str()).or_insert_with(|| KindStats {
            kind: record.kind.to_string(),
            record_count: 0,
            owned_count: 0,
            states: SyncState::ALL.iter().map(|state| (state.code(), 0)).collect(),
        });
        stats.record_count += 1;
        if record.owner.is_some() {
            stats.owned_count += 1;
        }
        *stats.states.entry(record.state.code()).or_insert(0) += 1;
    }

    InspectResult {
        path: path.display().to_string(),
        record_count: records.len(),
        pending_count: records.iter().filter(|r| r.state.is_pending()).count(),
        kinds: kinds.into_values().collect(),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("cachesync Store Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Records:");
    println!("  Cached:  {}", result.record_count);
    println!("  Pending: {}", result.pending_count);

    if !result.kinds.is_empty() {
        println!();
        println!("Kinds:");
        for kind in &result.kinds {
            let states: Vec<String> = kind
                .states
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(code, count)| format!("{code} {count}"))
                .collect();
            println!(
                "  {} {} records ({} owned): {}",
                kind.kind,
                kind.record_count,
                kind.owned_count,
                states.join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachesync_model::{Entity, StorageId};

    fn record(id: u64, kind: &str, owner: Option<u64>, state: SyncState) -> LocalRecord {
        LocalRecord {
            storage_id: StorageId::new(id),
            kind: kind.into(),
            owner: owner.map(StorageId::new),
            state,
            entity: Entity::new(format!("e{id}"), "entity"),
        }
    }

    #[test]
    fn summarize_counts_per_kind_and_state() {
        let records = vec![
            record(1, "dashboards", None, SyncState::Synced),
            record(2, "dashboardItems", Some(1), SyncState::PendingDelete),
            record(3, "dashboardItems", Some(1), SyncState::Synced),
            record(4, "charts", None, SyncState::PendingPut),
        ];

        let result = summarize(Path::new("cache"), &records);

        assert_eq!(result.record_count, 4);
        assert_eq!(result.pending_count, 2);
        let names: Vec<&str> = result.kinds.iter().map(|k| k.kind.as_str()).collect();
        assert_eq!(names, vec!["charts", "dashboardItems", "dashboards"]);

        let items = &result.kinds[1];
        assert_eq!(items.record_count, 2);
        assert_eq!(items.owned_count, 2);
        assert_eq!(items.states["DELETING"], 1);
        assert_eq!(items.states["SYNCED"], 1);
        assert_eq!(items.states["GETTING"], 0);
    }

    #[test]
    fn empty_store_has_no_kinds() {
        let result = summarize(Path::new("cache"), &[]);
        assert_eq!(result.record_count, 0);
        assert!(result.kinds.is_empty());
    }
}
