//! In-memory backing store.
//!
//! Keeps blobs in a `HashMap` behind an `RwLock`. Nothing survives the
//! process; pair it with the `keys` option of
//! [`OpenOptions`](crate::datastore::OpenOptions) to carry an encrypted
//! key blob between instances.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{BackingStore, StoreError, StoreResult};

/// In-memory [`BackingStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored blobs.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_guard()?.len())
    }

    /// Returns `true` if no blobs are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read_guard()?.is_empty())
    }

    fn read_guard(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write_guard(
        &self,
    ) -> StoreResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

impl BackingStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.read_guard()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.write_guard()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.write_guard()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.read_guard()?.keys().cloned().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        self.write_guard()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let store = MemoryStore::new();
        assert!(store.is_empty().unwrap());
        assert!(store.get("a").unwrap().is_none());

        store.put("a", b"hello").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"hello".to_vec()));

        store.put("a", b"world").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"world".to_vec()));

        store.delete("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn keys_and_clear() {
        let store = MemoryStore::new();
        store.put("keys", b"k").unwrap();
        store.put("items/one", b"1").unwrap();
        store.put("items/two", b"2").unwrap();

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["items/one", "items/two", "keys"]);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn delete_absent_key_is_ok() {
        let store = MemoryStore::new();
        store.delete("missing").unwrap();
    }
}
