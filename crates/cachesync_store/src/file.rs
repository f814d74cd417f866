//! File-backed local store.
//!
//! The store directory holds:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! └─ SNAPSHOT          # CBOR snapshot of every cached record
//! ```
//!
//! Every committed batch rewrites the snapshot through a temporary file
//! that is renamed over the old one, so a crash leaves either the old or
//! the new snapshot on disk.

use crate::batch::{Batch, BatchReceipt};
use crate::error::{StorageError, StorageResult};
use crate::memory::{MemoryStore, Tables};
use crate::query::Query;
use crate::store::LocalStore;
use cachesync_model::{LocalRecord, StorageId};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LOCK_FILE: &str = "LOCK";
const SNAPSHOT_FILE: &str = "SNAPSHOT";
const SNAPSHOT_TEMP: &str = "SNAPSHOT.tmp";

/// Snapshot layout version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    format_version: u32,
    tables: Tables,
}

/// A local store persisted to a directory.
///
/// Reads are served from memory. Writes go through the same copy-on-write
/// path as [`MemoryStore`]; the new snapshot must reach disk before the
/// in-memory tables are replaced, so a failed write discards the batch.
///
/// # Thread Safety
///
/// The store holds an exclusive lock on its directory. Only one `FileStore`
/// can be open per directory at a time, across processes.
///
/// # Example
///
/// ```no_run
/// use cachesync_store::{FileStore, LocalStore, Query};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("cache")).unwrap();
/// let dashboards = store.query(&Query::kind("dashboards".into())).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the lock (returns `Locked`)
    /// - The snapshot cannot be decoded or is inconsistent
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(StorageError::Corrupted(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let tables = load_snapshot(&path.join(SNAPSHOT_FILE))?;
        let store = Self {
            path: path.to_path_buf(),
            inner: MemoryStore::from_tables(tables),
            _lock_file: lock_file,
        };

        info!(path = %path.display(), records = store.len(), "opened file store");
        Ok(store)
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns a copy of every record, ordered by storage id.
    #[must_use]
    pub fn records(&self) -> Vec<LocalRecord> {
        self.inner.records()
    }

    fn save_snapshot(&self, tables: &Tables) -> StorageResult<()> {
        let snapshot_path = self.path.join(SNAPSHOT_FILE);
        let temp_path = self.path.join(SNAPSHOT_TEMP);

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        let snapshot = Snapshot {
            format_version: FORMAT_VERSION,
            tables: tables.clone(),
        };
        ciborium::into_writer(&snapshot, &mut writer).map_err(StorageError::codec)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|err| StorageError::Io(err.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &snapshot_path)?;
        sync_directory(&self.path)?;

        debug!(path = %snapshot_path.display(), "wrote snapshot");
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn query(&self, query: &Query) -> StorageResult<Vec<LocalRecord>> {
        self.inner.query(query)
    }

    fn get(&self, id: StorageId) -> StorageResult<Option<LocalRecord>> {
        self.inner.get(id)
    }

    fn apply_batch(&self, batch: &Batch) -> StorageResult<BatchReceipt> {
        if batch.is_empty() {
            return Ok(BatchReceipt::default());
        }
        self.inner
            .apply_with(batch, |tables| self.save_snapshot(tables))
    }
}

fn load_snapshot(path: &Path) -> StorageResult<Tables> {
    if !path.exists() {
        return Ok(Tables::default());
    }

    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Tables::default());
    }

    let snapshot: Snapshot =
        ciborium::from_reader(BufReader::new(file)).map_err(StorageError::codec)?;
    if snapshot.format_version != FORMAT_VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported snapshot version {}",
            snapshot.format_version
        )));
    }

    let mut tables = snapshot.tables;
    tables.reindex()?;
    Ok(tables)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> StorageResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

// Directory handles cannot be synced on Windows; the rename is durable
// once the file itself is synced.
#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Owner;
    use cachesync_model::{Entity, EntityKind, SyncState};
    use tempfile::tempdir;

    #[test]
    fn empty_directory_opens_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.path(), dir.path());
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(FileStore::open(dir.path()), Err(StorageError::Locked)));
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            let mut batch = Batch::new();
            batch.insert(
                EntityKind::new("dashboards"),
                Entity::new("d1", "Main").with_field("starred", serde_json::json!(true)),
                SyncState::PendingPut,
                Owner::None,
            );
            store.apply_batch(&batch).unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, SyncState::PendingPut);
        assert_eq!(records[0].entity.fields.get("starred"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn owned_records_cascade_after_reopen() {
        let dir = tempdir().unwrap();
        let owner = {
            let store = FileStore::open(dir.path()).unwrap();
            let mut batch = Batch::new();
            let owner = batch.insert(EntityKind::new("dashboards"), Entity::new("d1", "Main"), SyncState::Synced, Owner::None);
            batch.insert(EntityKind::new("dashboardItems"), Entity::new("i1", "Chart"), SyncState::Synced, Owner::BackRef(owner));
            batch.insert(EntityKind::new("dashboards"), Entity::new("d2", "Other"), SyncState::Synced, Owner::None);
            store.apply_batch(&batch).unwrap().storage_id(owner).unwrap()
        };

        let store = FileStore::open(dir.path()).unwrap();
        let mut batch = Batch::new();
        batch.delete(owner);
        store.apply_batch(&batch).unwrap();

        let ids: Vec<String> = store.records().into_iter().map(|r| r.entity.id).collect();
        assert_eq!(ids, vec!["d2"]);
    }

    #[test]
    fn garbage_snapshot_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), b"\xff\x00not cbor").unwrap();
        assert!(FileStore::open(dir.path()).is_err());
    }
}
