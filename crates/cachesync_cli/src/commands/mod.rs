//! CLI command implementations.

pub mod inspect;
pub mod pending;
pub mod reset;

use cachesync_store::FileStore;
use std::path::Path;

/// Opens an existing store directory.
fn open_store(path: &Path) -> Result<FileStore, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {:?}", path).into());
    }
    Ok(FileStore::open(path)?)
}
