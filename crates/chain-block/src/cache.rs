//! # Block cache (second half of C6)
//!
//! [`CachedBlock`] wraps a [`Block`] retrieved from the store: it
//! exposes only read operations and memoizes its hash, so handing one
//! out to a dozen callers can never let any of them mutate shared
//! state or re-derive the hash from scratch. [`BlockCache`] is the
//! process-wide, bounded LRU that stores them.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chain_state::{AccountRecord, KvStore};
use lru::LruCache;
use shared_types::{Address, Hash};

use crate::block::Block;
use crate::errors::BlockError;
use crate::header::Header;

/// Default capacity of the process-wide block cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// A read-only view of a [`Block`]. Every mutating operation on `Block`
/// is simply absent from this type's surface — there is no "rejects
/// mutation at runtime" check to get wrong, because there is no
/// mutation entry point to call.
pub struct CachedBlock<S: KvStore> {
    block: Block<S>,
    hash: Hash,
}

impl<S: KvStore> CachedBlock<S> {
    /// Wrap `block`, memoizing its hash immediately.
    pub fn new(block: Block<S>) -> Self {
        let hash = block.hash();
        CachedBlock { block, hash }
    }

    /// The memoized hash — never recomputed after wrapping.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn header(&self) -> &Header {
        self.block.header()
    }

    pub fn uncles(&self) -> &[Header] {
        self.block.uncles()
    }

    pub fn number(&self) -> u64 {
        self.block.number()
    }

    pub fn get_acct(&self, address: &Address) -> Result<AccountRecord, BlockError> {
        self.block.get_acct(address)
    }

    pub fn get_balance(&self, address: &Address) -> Result<u128, BlockError> {
        self.block.get_balance(address)
    }

    pub fn get_nonce(&self, address: &Address) -> Result<u64, BlockError> {
        self.block.get_nonce(address)
    }

    pub fn get_code(&self, address: &Address) -> Result<Vec<u8>, BlockError> {
        self.block.get_code(address)
    }

    pub fn get_storage_data(&self, address: &Address, index: u128) -> Result<u128, BlockError> {
        self.block.get_storage_data(address, index)
    }

    pub fn chain_difficulty(&self, parent_chain_difficulty: Option<u128>) -> Result<u128, BlockError> {
        self.block.chain_difficulty(parent_chain_difficulty)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, BlockError> {
        self.block.serialize()
    }
}

/// Process-wide bounded cache of recently seen blocks, keyed by hash.
/// Reads/writes are serialized behind one mutex, matching the spec's
/// "a single mutex per shared store is sufficient" resource policy.
pub struct BlockCache<S: KvStore> {
    inner: Mutex<LruCache<Hash, Arc<CachedBlock<S>>>>,
}

impl<S: KvStore> BlockCache<S> {
    /// A cache with [`DEFAULT_CACHE_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        BlockCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a cached block by hash, refreshing its recency.
    pub fn get(&self, hash: &Hash) -> Option<Arc<CachedBlock<S>>> {
        let mut cache = self.inner.lock().expect("block cache lock poisoned");
        cache.get(hash).cloned()
    }

    /// Wrap `block` and insert it under its own hash, evicting the
    /// least recently used entry if the cache is full.
    pub fn insert(&self, block: Block<S>) -> Arc<CachedBlock<S>> {
        let cached = Arc::new(CachedBlock::new(block));
        let mut cache = self.inner.lock().expect("block cache lock poisoned");
        cache.put(cached.hash(), cached.clone());
        cached
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("block cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: KvStore> Default for BlockCache<S> {
    fn default() -> Self {
        Self::new()
    }
}
