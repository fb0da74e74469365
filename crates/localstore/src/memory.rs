//! In-memory KV backend.

use crate::error::{StoreError, StoreResult};
use crate::keyspace::KeySpace;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

struct MemoryInner {
    open: bool,
    maps: Vec<HashMap<Vec<u8>, Bytes>>,
}

/// In-memory KV backend: one map per keyspace behind a single lock.
///
/// Used by tests and by checkouts mounted with an ephemeral overlay.
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    /// Create an open, empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                open: true,
                maps: KeySpace::ALL.iter().map(|_| HashMap::new()).collect(),
            }),
        }
    }

    pub fn get(&self, ks: KeySpace, key: &[u8]) -> StoreResult<Option<Bytes>> {
        let inner = self.inner.read().expect("local store lock poisoned");
        if !inner.open {
            return Err(StoreError::Closed);
        }
        Ok(inner.maps[ks.index()].get(key).cloned())
    }

    pub fn has(&self, ks: KeySpace, key: &[u8]) -> StoreResult<bool> {
        let inner = self.inner.read().expect("local store lock poisoned");
        if !inner.open {
            return Err(StoreError::Closed);
        }
        Ok(inner.maps[ks.index()].contains_key(key))
    }

    pub fn put(&self, ks: KeySpace, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("local store lock poisoned");
        if !inner.open {
            return Err(StoreError::Closed);
        }
        inner.maps[ks.index()].insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }

    pub fn clear_keyspace(&self, ks: KeySpace) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("local store lock poisoned");
        if !inner.open {
            return Err(StoreError::Closed);
        }
        inner.maps[ks.index()].clear();
        Ok(())
    }

    /// Replay a batch of puts under one write lock.
    pub fn apply_batch(&self, puts: &[(KeySpace, Vec<u8>, Vec<u8>)]) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("local store lock poisoned");
        if !inner.open {
            return Err(StoreError::Closed);
        }
        for (ks, key, value) in puts {
            inner.maps[ks.index()].insert(key.clone(), Bytes::copy_from_slice(value));
        }
        Ok(())
    }

    /// Close the store. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.write().expect("local store lock poisoned");
        inner.open = false;
        inner.maps.iter_mut().for_each(HashMap::clear);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
