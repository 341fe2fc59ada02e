//! # Per-call Write Overlay
//!
//! An [`Overlay`] sits between a running call and the committed store.
//! Reads fall through to the base store unless the call already wrote the
//! key; writes and deletions stay in the overlay. When the call succeeds the
//! host turns the overlay into a [`ChangeSet`] and applies it; when the call
//! fails the overlay is dropped and the base store never sees a byte.
//!
//! Overlays implement [`KvStore`] themselves, so they nest.

use std::collections::BTreeMap;

use super::{ChangeSet, KvStore, StorageResult};

/// Write cache over a read-only view of a base store.
pub struct Overlay<'a> {
    base: &'a dyn KvStore,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> Overlay<'a> {
    pub fn new(base: &'a dyn KvStore) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Whether the call has written anything yet.
    pub fn is_dirty(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Finish the call successfully: hand back every pending write.
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet::new(self.writes.into_iter().collect())
    }

    /// Finish the call unsuccessfully. Equivalent to dropping the overlay.
    pub fn discard(self) {
        tracing::debug!(pending = self.writes.len(), "overlay discarded");
    }
}

impl KvStore for Overlay<'_> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => self.base.get(key),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }
}
