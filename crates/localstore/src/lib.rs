//! Keyspace-partitioned local KV cache for Burrow.
//!
//! This crate provides:
//! - The `KeySpace` partitioning shared by every backend
//! - An in-memory backend and a SQLite on-disk backend behind one contract
//! - Atomic cross-keyspace write batches
//!
//! The backend set is closed (exactly two), so `LocalStore` is a tagged
//! enum rather than a trait object.

pub mod error;
pub mod keyspace;
pub mod memory;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use keyspace::KeySpace;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use bytes::Bytes;
use std::path::Path;

/// The local KV cache: point get, last-writer-wins put, per-keyspace clear,
/// and atomic write batches, over one of two backends.
pub enum LocalStore {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl LocalStore {
    /// Create an in-memory store.
    pub fn new_memory() -> Self {
        LocalStore::Memory(MemoryStore::new())
    }

    /// Open (creating if missing) a SQLite store at `path`.
    pub async fn open_sqlite(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(LocalStore::Sqlite(SqliteStore::open(path).await?))
    }

    /// Point lookup.
    pub async fn get(&self, ks: KeySpace, key: &[u8]) -> StoreResult<Option<Bytes>> {
        match self {
            LocalStore::Memory(store) => store.get(ks, key),
            LocalStore::Sqlite(store) => store.get(ks, key).await,
        }
    }

    /// Existence check without fetching the value.
    pub async fn has(&self, ks: KeySpace, key: &[u8]) -> StoreResult<bool> {
        match self {
            LocalStore::Memory(store) => store.has(ks, key),
            LocalStore::Sqlite(store) => store.has(ks, key).await,
        }
    }

    /// Last-writer-wins point write.
    pub async fn put(&self, ks: KeySpace, key: &[u8], value: &[u8]) -> StoreResult<()> {
        match self {
            LocalStore::Memory(store) => store.put(ks, key, value),
            LocalStore::Sqlite(store) => store.put(ks, key, value).await,
        }
    }

    /// Remove every key in a keyspace.
    pub async fn clear_keyspace(&self, ks: KeySpace) -> StoreResult<()> {
        match self {
            LocalStore::Memory(store) => store.clear_keyspace(ks),
            LocalStore::Sqlite(store) => store.clear_keyspace(ks).await,
        }
    }

    /// Reclaim space in a keyspace. May be a no-op.
    pub async fn compact_keyspace(&self, ks: KeySpace) -> StoreResult<()> {
        match self {
            LocalStore::Memory(_) => Ok(()),
            LocalStore::Sqlite(store) => store.compact_keyspace(ks).await,
        }
    }

    /// Clear every ephemeral cache keyspace.
    pub async fn clear_ephemeral_caches(&self) -> StoreResult<()> {
        for ks in KeySpace::ALL {
            if ks.is_ephemeral() {
                self.clear_keyspace(ks).await?;
            }
        }
        Ok(())
    }

    /// Compact every keyspace.
    pub async fn compact_storage(&self) -> StoreResult<()> {
        for ks in KeySpace::ALL {
            self.compact_keyspace(ks).await?;
        }
        Ok(())
    }

    /// Start a write batch. Puts accumulate in memory and apply atomically
    /// on [`WriteBatch::flush`].
    pub fn begin_write(&self) -> WriteBatch<'_> {
        WriteBatch {
            store: self,
            puts: Vec::new(),
        }
    }

    /// Close the store. Idempotent; later operations fail.
    pub async fn close(&self) {
        match self {
            LocalStore::Memory(store) => store.close(),
            LocalStore::Sqlite(store) => store.close().await,
        }
    }
}

/// A pending batch of puts across any keyspaces.
///
/// Dropping the batch without flushing discards it; nothing is written.
pub struct WriteBatch<'a> {
    store: &'a LocalStore,
    puts: Vec<(KeySpace, Vec<u8>, Vec<u8>)>,
}

impl WriteBatch<'_> {
    /// Queue a put.
    pub fn put(&mut self, ks: KeySpace, key: &[u8], value: &[u8]) {
        self.puts.push((ks, key.to_vec(), value.to_vec()));
    }

    /// Number of queued puts.
    pub fn len(&self) -> usize {
        self.puts.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }

    /// Apply every queued put atomically. On error nothing is visible.
    pub async fn flush(self) -> StoreResult<()> {
        if self.puts.is_empty() {
            return Ok(());
        }
        match self.store {
            LocalStore::Memory(store) => store.apply_batch(&self.puts),
            LocalStore::Sqlite(store) => store.apply_batch(&self.puts).await,
        }
    }
}
