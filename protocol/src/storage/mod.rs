//! # Storage Module
//!
//! The identity contract sees storage as a flat byte-keyed map. Everything
//! above that (linked lists, key registries, group records) is built by the
//! contract on top of three calls: `get`, `put`, `delete`.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs     — KvStore trait, StorageError, ChangeSet
//! memory.rs  — BTreeMap-backed store for tests and scratch use
//! overlay.rs — per-call write cache with commit / discard
//! db.rs      — sled-backed persistent store
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! call ─► Overlay ─(success)─► ChangeSet ─► SledStore / MemoryStore
//!            │
//!            └─(error)─► dropped, base store untouched
//! ```
//!
//! The overlay gives a call read-your-own-writes visibility while keeping
//! the base store untouched until the host decides to commit.

pub mod db;
pub mod memory;
pub mod overlay;

pub use db::SledStore;
pub use memory::MemoryStore;
pub use overlay::Overlay;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors raised by a key-value backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// ---------------------------------------------------------------------------
// KvStore
// ---------------------------------------------------------------------------

/// A flat byte-keyed store.
pub trait KvStore {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> StorageResult<()>;

    /// Apply a set of changes. Backends that can write atomically override
    /// this; the default applies entries one at a time.
    fn apply(&mut self, changes: ChangeSet) -> StorageResult<()> {
        for (key, value) in changes.entries {
            match value {
                Some(v) => self.put(&key, &v)?,
                None => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ChangeSet
// ---------------------------------------------------------------------------

/// Writes collected by an [`Overlay`], in key order. `None` is a deletion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl ChangeSet {
    pub fn new(entries: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Option<&[u8]>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_deref()))
    }

    pub fn into_entries(self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.entries
    }
}
