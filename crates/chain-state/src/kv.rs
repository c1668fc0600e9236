//! Backing key-value store (external collaborator, §6).
//!
//! The chain never cares how bytes are durably persisted — only that
//! `get`/`put`/`delete` behave like a flat map. This module defines that
//! contract and ships two adapters: an in-memory map (used by every
//! unit test in this crate) and a `sled`-backed one for anything that
//! needs to survive a process restart.

use shared_types::Hash;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::StateError;

/// A flat, hash-keyed byte store. Trie nodes, account-by-address
/// lookups (via the state trie), and the memoized chain-difficulty
/// entries (`chain-block`) all go through this one contract.
pub trait KvStore: Send + Sync {
    /// Fetch the bytes stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError>;

    /// Store `value` under `key`, overwriting any previous value.
    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StateError>;

    /// Remove `key`, if present.
    fn delete(&self, key: &[u8]) -> Result<(), StateError>;

    /// Whether `key` is present.
    fn contains(&self, key: &[u8]) -> Result<bool, StateError> {
        Ok(self.get(key)?.is_some())
    }

    /// Store a batch of trie nodes keyed by their own hash. The default
    /// implementation calls `put` once per entry; adapters with a
    /// native batch/write-batch API should override this.
    fn put_nodes(&self, nodes: Vec<(Hash, Vec<u8>)>) -> Result<(), StateError> {
        for (hash, bytes) in nodes {
            self.put(&hash, bytes)?;
        }
        Ok(())
    }

    /// Durably flush whatever writes this store buffers internally.
    /// In-memory stores have nothing to flush; `sled` needs an explicit
    /// call to guarantee writes survive a crash.
    fn commit(&self) -> Result<(), StateError>;
}

/// In-memory `KvStore`, backing every test in this crate and suitable
/// for short-lived nodes (e.g. integration tests of `chain-net`).
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        let map = self.inner.read().map_err(|_| StateError::LockPoisoned)?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StateError> {
        let mut map = self.inner.write().map_err(|_| StateError::LockPoisoned)?;
        map.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StateError> {
        let mut map = self.inner.write().map_err(|_| StateError::LockPoisoned)?;
        map.remove(key);
        Ok(())
    }

    fn commit(&self) -> Result<(), StateError> {
        Ok(())
    }
}

/// `sled`-backed `KvStore` for nodes that need their state to survive a
/// restart. `sled` was picked over the teacher's RocksDB binding
/// because it needs no native toolchain to build — see `DESIGN.md`.
pub struct SledStore {
    tree: sled::Db,
}

impl SledStore {
    /// Open (or create) a sled database at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StateError> {
        let tree = sled::open(path).map_err(|e| StateError::Store(e.to_string()))?;
        Ok(Self { tree })
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        self.tree
            .get(key)
            .map(|opt| opt.map(|ivec| ivec.to_vec()))
            .map_err(|e| StateError::Store(e.to_string()))
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StateError> {
        self.tree
            .insert(key, value)
            .map(|_| ())
            .map_err(|e| StateError::Store(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StateError> {
        self.tree
            .remove(key)
            .map(|_| ())
            .map_err(|e| StateError::Store(e.to_string()))
    }

    fn commit(&self) -> Result<(), StateError> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| StateError::Store(e.to_string()))
    }
}
