//! In-memory store backed by a `BTreeMap`.

use std::collections::BTreeMap;

use super::{KvStore, StorageResult};

/// A `KvStore` that lives entirely in memory. Ordered so that dumps and
/// test assertions are deterministic.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over every entry whose key starts with `prefix`.
    pub fn scan_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let mut store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        store.delete(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn delete_absent_key_is_ok() {
        let mut store = MemoryStore::new();
        store.delete(b"missing").unwrap();
    }

    #[test]
    fn scan_prefix_stays_within_prefix() {
        let mut store = MemoryStore::new();
        store.put(b"a/1", b"x").unwrap();
        store.put(b"a/2", b"y").unwrap();
        store.put(b"b/1", b"z").unwrap();
        let keys: Vec<&[u8]> = store.scan_prefix(b"a/").map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"a/1"[..], &b"a/2"[..]]);
    }
}
