//! # Chain environment (C1/C2/C3 composition root)
//!
//! Glues the backing [`KvStore`], the state [`Trie`], and a fresh
//! [`StateCache`] into the one handle block/state code actually needs.
//! There is no process-global store or trie anywhere in this crate —
//! every caller threads a `ChainEnv` through explicitly.

use std::sync::Arc;

use shared_types::{Address, Hash, EMPTY_CODE_HASH, EMPTY_TRIE_ROOT};

use crate::account::{account_trie_key, AccountRecord};
use crate::cache::{Snapshot, StateCache};
use crate::errors::StateError;
use crate::kv::KvStore;
use crate::trie::{MerklePatriciaTrie, Trie};

/// State access and mutation for a single chain, backed by `S`.
pub struct ChainEnv<S: KvStore> {
    store: Arc<S>,
    state_trie: MerklePatriciaTrie<S>,
    cache: StateCache,
}

impl<S: KvStore> ChainEnv<S> {
    /// Open (or create) chain state rooted at `state_root`, writing the
    /// empty code blob under the empty code hash unconditionally — a
    /// blank account should be able to reference `EMPTY_CODE_HASH`
    /// without the store ever having been told what that hash means.
    pub fn new(store: Arc<S>, state_root: Hash) -> Result<Self, StateError> {
        store.put(&EMPTY_CODE_HASH, Vec::new())?;
        let state_trie = MerklePatriciaTrie::at(store.clone(), state_root);
        Ok(Self {
            store,
            state_trie,
            cache: StateCache::new(),
        })
    }

    /// A fresh environment with an empty state trie.
    pub fn empty(store: Arc<S>) -> Result<Self, StateError> {
        Self::new(store, EMPTY_TRIE_ROOT)
    }

    pub fn state_root(&self) -> Hash {
        self.state_trie.root_hash()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolve an account, falling back to [`AccountRecord::blank`] when
    /// the address has no entry in the state trie. Cache overrides for
    /// balance/nonce/code are layered on top of whatever is committed.
    pub fn account(&self, address: &Address) -> Result<AccountRecord, StateError> {
        let mut record = match self.state_trie.get(&account_trie_key(address))? {
            Some(bytes) => AccountRecord::rlp_decode(&bytes)?,
            None => AccountRecord::blank(),
        };
        if let Some(balance) = self.cache.get_balance(address) {
            record.balance = balance;
        }
        if let Some(nonce) = self.cache.get_nonce(address) {
            record.nonce = nonce;
        }
        if let Some(code) = self.cache.get_code(address) {
            record.code_hash = if code.is_empty() {
                EMPTY_CODE_HASH
            } else {
                shared_crypto::keccak256(code)
            };
        }
        Ok(record)
    }

    pub fn balance(&self, address: &Address) -> Result<u128, StateError> {
        Ok(self.account(address)?.balance)
    }

    pub fn set_balance(&mut self, address: Address, value: u128) {
        self.cache.set_balance(address, value);
    }

    pub fn nonce(&self, address: &Address) -> Result<u64, StateError> {
        Ok(self.account(address)?.nonce)
    }

    pub fn set_nonce(&mut self, address: Address, value: u64) {
        self.cache.set_nonce(address, value);
    }

    pub fn code(&self, address: &Address) -> Result<Vec<u8>, StateError> {
        if let Some(code) = self.cache.get_code(address) {
            return Ok(code.clone());
        }
        let record = self.account(address)?;
        if record.code_hash == EMPTY_CODE_HASH {
            return Ok(Vec::new());
        }
        Ok(self.store.get(&record.code_hash)?.unwrap_or_default())
    }

    pub fn set_code(&mut self, address: Address, code: Vec<u8>) -> Result<(), StateError> {
        if !code.is_empty() {
            self.store.put(&shared_crypto::keccak256(&code), code.clone())?;
        }
        self.cache.set_code(address, code);
        Ok(())
    }

    /// Value at storage `index` for `address`, falling back to the
    /// account's committed storage trie when not cached. Absent slots
    /// read as zero.
    pub fn storage(&self, address: &Address, index: u128) -> Result<u128, StateError> {
        if let Some(value) = self.cache.get_storage(address, index) {
            return Ok(value);
        }
        let record = self.account(address)?;
        let storage_trie = MerklePatriciaTrie::at(self.store.clone(), record.storage_root);
        let mut key = [0u8; 32];
        key[16..].copy_from_slice(&index.to_be_bytes());
        match storage_trie.get(&key)? {
            Some(bytes) => {
                let rlp = rlp::Rlp::new(&bytes);
                crate::codec::decode_int(&rlp)
            }
            None => Ok(0),
        }
    }

    pub fn set_storage(&mut self, address: Address, index: u128, value: u128) {
        self.cache.set_storage(address, index, value);
    }

    /// Snapshot the pending cache so a later failure can cleanly
    /// `revert_to` it.
    pub fn snapshot(&self) -> Snapshot {
        self.cache.snapshot()
    }

    pub fn revert_to(&mut self, snapshot: Snapshot) {
        self.cache.revert(snapshot);
    }

    /// Flush every dirty account into the state trie, returning and
    /// adopting the new state root.
    pub fn commit(&mut self) -> Result<Hash, StateError> {
        let root = self.cache.commit(&mut self.state_trie, &self.store)?;
        self.state_trie.set_root(root);
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    #[test]
    fn blank_account_has_empty_code_hash_and_zero_balance() {
        let store = Arc::new(MemoryStore::new());
        let env = ChainEnv::empty(store).unwrap();
        let account = env.account(&[1u8; 20]).unwrap();
        assert_eq!(account.balance, 0);
        assert_eq!(account.code_hash, EMPTY_CODE_HASH);
    }

    #[test]
    fn empty_code_blob_is_readable_after_construction() {
        let store = Arc::new(MemoryStore::new());
        let env = ChainEnv::empty(store).unwrap();
        assert_eq!(env.store().get(&EMPTY_CODE_HASH).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn set_balance_then_commit_updates_state_root() {
        let store = Arc::new(MemoryStore::new());
        let mut env = ChainEnv::empty(store).unwrap();
        let before = env.state_root();
        env.set_balance([2u8; 20], 1_000);
        let after = env.commit().unwrap();
        assert_ne!(before, after);
        assert_eq!(env.balance(&[2u8; 20]).unwrap(), 1_000);
    }

    #[test]
    fn revert_to_drops_uncommitted_changes() {
        let store = Arc::new(MemoryStore::new());
        let mut env = ChainEnv::empty(store).unwrap();
        let snap = env.snapshot();
        env.set_balance([3u8; 20], 500);
        env.revert_to(snap);
        assert_eq!(env.balance(&[3u8; 20]).unwrap(), 0);
    }

    #[test]
    fn set_code_is_retrievable_by_hash_and_by_address() {
        let store = Arc::new(MemoryStore::new());
        let mut env = ChainEnv::empty(store).unwrap();
        env.set_code([4u8; 20], vec![0x60, 0x00]).unwrap();
        assert_eq!(env.code(&[4u8; 20]).unwrap(), vec![0x60, 0x00]);
        env.commit().unwrap();
        assert_eq!(env.code(&[4u8; 20]).unwrap(), vec![0x60, 0x00]);
    }

    #[test]
    fn storage_round_trips_through_commit() {
        let store = Arc::new(MemoryStore::new());
        let mut env = ChainEnv::empty(store).unwrap();
        env.set_storage([5u8; 20], 1, 9);
        env.commit().unwrap();
        assert_eq!(env.storage(&[5u8; 20], 1).unwrap(), 9);
        assert_eq!(env.storage(&[5u8; 20], 2).unwrap(), 0);
    }

    #[test]
    fn storage_zero_value_deletes_slot() {
        let store = Arc::new(MemoryStore::new());
        let mut env = ChainEnv::empty(store).unwrap();
        env.set_storage([6u8; 20], 1, 9);
        env.commit().unwrap();
        let root_with_value = env.account(&[6u8; 20]).unwrap().storage_root;

        env.set_storage([6u8; 20], 1, 0);
        env.commit().unwrap();
        let root_after_delete = env.account(&[6u8; 20]).unwrap().storage_root;

        assert_ne!(root_with_value, root_after_delete);
        assert_eq!(env.storage(&[6u8; 20], 1).unwrap(), 0);
    }
}
