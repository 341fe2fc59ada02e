//! # SledStore — Persistent Storage Engine
//!
//! The on-disk backend for the reference host, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                         | Value                 |
//! |------------|-----------------------------|-----------------------|
//! | `identity` | contract storage key (raw)  | contract record (raw) |
//!
//! The identity contract owns the key format; this module stores bytes
//! verbatim.
//!
//! ## Atomicity
//!
//! A committed [`ChangeSet`] is written as a single sled `Batch` and then
//! flushed. Either every write of a call lands on disk or none does.

use sled::{Batch, Db, Tree};
use std::path::Path;

use super::{ChangeSet, KvStore, StorageResult};

/// Name of the sled tree holding contract state.
const IDENTITY_TREE: &str = "identity";

/// Persistent `KvStore` over a sled database.
///
/// `SledStore` is cheap to clone; clones share the same database handle.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    tree: Tree,
}

impl SledStore {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let tree = db.open_tree(IDENTITY_TREE)?;
        Ok(Self { db, tree })
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) -> StorageResult<()> {
        let count = changes.len();
        let mut batch = Batch::default();
        for (key, value) in changes.into_entries() {
            match value {
                Some(v) => batch.insert(key, v),
                None => batch.remove(key),
            }
        }
        self.tree.apply_batch(batch)?;
        self.db.flush()?;
        tracing::debug!(writes = count, "change set committed");
        Ok(())
    }
}
