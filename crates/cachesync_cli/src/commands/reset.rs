//! Reset command implementation.

use super::open_store;
use cachesync_store::LocalStore;
use std::path::Path;
use tracing::info;

/// Runs the reset command.
pub fn run(path: &Path, kind: &str, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let record = store
        .find(&kind.into(), id)?
        .ok_or_else(|| format!("No {kind} record with id {id}"))?;

    if !record.state.is_pending() {
        println!("{kind} {id} is {}, nothing to reset", record.state);
        return Ok(());
    }

    info!("Resetting {} {} from {}", kind, id, record.state);
    store.reset_state(record.storage_id)?;

    println!("✓ Reset {kind} {id}");
    println!("  Was: {}", record.state);
    println!("  Now: SYNCED");
    Ok(())
}
