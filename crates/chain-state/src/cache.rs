//! # State cache & commit (C3)
//!
//! Every read a transaction makes goes through this cache first; every
//! write lands here, not in the trie, until [`StateCache::commit`] flushes
//! dirty accounts back. This is what makes `snapshot`/`revert` cheap: an
//! aborted transaction just rewinds the journal, without ever having
//! touched the authenticated state trie.
//!
//! Each field (balance, nonce, code, storage) has its own typed cache, and
//! [`DirtySet`] — which addresses have *any* pending change — is tracked
//! as a distinct structure rather than folded into one of those caches.
//! Keeping it separate avoids the failure mode where a generic
//! `set_and_journal("all", ...)` call meant to mark an address dirty
//! silently collides with a differently-typed cache that happens to use
//! the same key namespace.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rayon::prelude::*;
use rlp::RlpStream;
use shared_types::{Address, Hash, EMPTY_CODE_HASH};

use crate::account::{account_trie_key, AccountRecord};
use crate::codec::append_int;
use crate::errors::StateError;
use crate::kv::KvStore;
use crate::trie::{MerklePatriciaTrie, Trie};

/// Below this many dirty accounts, computing storage roots sequentially
/// is cheaper than paying rayon's dispatch overhead.
const PARALLEL_THRESHOLD: usize = 4;

/// A storage slot index, zero-padded to a 32-byte big-endian trie key.
fn storage_trie_key(index: u128) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[16..].copy_from_slice(&index.to_be_bytes());
    key
}

/// Addresses with at least one pending, uncommitted change. Tracked
/// independently of the typed value caches below so that marking an
/// address dirty can never be confused with — or silently overwrite —
/// one of their entries.
#[derive(Default, Debug, Clone)]
pub struct DirtySet(HashSet<Address>);

impl DirtySet {
    fn mark(&mut self, address: Address) -> bool {
        self.0.insert(address)
    }

    /// Addresses touched since the cache was created or last committed.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// One undoable change, recorded in commit order. Reverting replays
/// these in reverse, restoring `prev`.
#[derive(Debug, Clone)]
enum JournalEntry {
    Balance { address: Address, prev: Option<u128> },
    Nonce { address: Address, prev: Option<u64> },
    Code { address: Address, prev: Option<Vec<u8>> },
    Storage { address: Address, index: u128, prev: Option<u128> },
    DirtyMark { address: Address },
}

/// A write-through cache over account state, with a journal that makes
/// `snapshot`/`revert` exact and cheap.
#[derive(Default)]
pub struct StateCache {
    balances: HashMap<Address, u128>,
    nonces: HashMap<Address, u64>,
    codes: HashMap<Address, Vec<u8>>,
    storage: HashMap<(Address, u128), u128>,
    dirty: DirtySet,
    journal: Vec<JournalEntry>,
}

/// Position in the journal a later `revert` can rewind to.
pub type Snapshot = usize;

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_dirty(&mut self, address: Address) {
        if self.dirty.mark(address) {
            self.journal.push(JournalEntry::DirtyMark { address });
        }
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn get_balance(&self, address: &Address) -> Option<u128> {
        self.balances.get(address).copied()
    }

    pub fn set_balance(&mut self, address: Address, value: u128) {
        let prev = self.balances.insert(address, value);
        self.journal.push(JournalEntry::Balance { address, prev });
        self.mark_dirty(address);
    }

    pub fn get_nonce(&self, address: &Address) -> Option<u64> {
        self.nonces.get(address).copied()
    }

    pub fn set_nonce(&mut self, address: Address, value: u64) {
        let prev = self.nonces.insert(address, value);
        self.journal.push(JournalEntry::Nonce { address, prev });
        self.mark_dirty(address);
    }

    pub fn get_code(&self, address: &Address) -> Option<&Vec<u8>> {
        self.codes.get(address)
    }

    pub fn set_code(&mut self, address: Address, code: Vec<u8>) {
        let prev = self.codes.insert(address, code);
        self.journal.push(JournalEntry::Code { address, prev });
        self.mark_dirty(address);
    }

    /// Value at storage `index` for `address`, as cached (not yet
    /// committed to the account's storage trie).
    pub fn get_storage(&self, address: &Address, index: u128) -> Option<u128> {
        self.storage.get(&(*address, index)).copied()
    }

    pub fn set_storage(&mut self, address: Address, index: u128, value: u128) {
        let prev = self.storage.insert((address, index), value);
        self.journal.push(JournalEntry::Storage {
            address,
            index,
            prev,
        });
        self.mark_dirty(address);
    }

    /// Mark an entry point the journal can later `revert` to.
    pub fn snapshot(&self) -> Snapshot {
        self.journal.len()
    }

    /// Undo every change recorded since `snapshot`.
    pub fn revert(&mut self, snapshot: Snapshot) {
        while self.journal.len() > snapshot {
            match self.journal.pop().expect("checked len above") {
                JournalEntry::Balance { address, prev } => match prev {
                    Some(v) => {
                        self.balances.insert(address, v);
                    }
                    None => {
                        self.balances.remove(&address);
                    }
                },
                JournalEntry::Nonce { address, prev } => match prev {
                    Some(v) => {
                        self.nonces.insert(address, v);
                    }
                    None => {
                        self.nonces.remove(&address);
                    }
                },
                JournalEntry::Code { address, prev } => match prev {
                    Some(v) => {
                        self.codes.insert(address, v);
                    }
                    None => {
                        self.codes.remove(&address);
                    }
                },
                JournalEntry::Storage { address, index, prev } => match prev {
                    Some(v) => {
                        self.storage.insert((address, index), v);
                    }
                    None => {
                        self.storage.remove(&(address, index));
                    }
                },
                JournalEntry::DirtyMark { address } => {
                    self.dirty.0.remove(&address);
                }
            }
        }
    }

    /// Flush every dirty account into `state_trie`, returning the new
    /// state root. Clears the cache and journal on success.
    ///
    /// Per-account storage roots are recomputed by reopening that
    /// account's storage trie at its previously committed root and
    /// replaying this cache's pending writes into it; storing a zero
    /// value deletes the slot rather than writing it out. With four or
    /// more dirty accounts that work is fanned out across threads with
    /// rayon, since each account's storage trie is independent of every
    /// other's.
    pub fn commit<S: KvStore>(
        &mut self,
        state_trie: &mut MerklePatriciaTrie<S>,
        store: &Arc<S>,
    ) -> Result<Hash, StateError> {
        let addresses: Vec<Address> = self.dirty.addresses().copied().collect();

        let loaded: Vec<(Address, AccountRecord)> = addresses
            .iter()
            .map(|addr| {
                let record = match state_trie.get(&account_trie_key(addr))? {
                    Some(bytes) => AccountRecord::rlp_decode(&bytes)?,
                    None => AccountRecord::blank(),
                };
                Ok((*addr, record))
            })
            .collect::<Result<_, StateError>>()?;

        let storage_jobs: Vec<(Address, Hash, Vec<(u128, u128)>)> = loaded
            .iter()
            .map(|(addr, record)| {
                let changes: Vec<(u128, u128)> = self
                    .storage
                    .iter()
                    .filter(|((a, _), _)| a == addr)
                    .map(|((_, index), value)| (*index, *value))
                    .collect();
                (*addr, record.storage_root, changes)
            })
            .collect();

        let new_storage_roots = compute_storage_roots(store, storage_jobs)?;
        let mut new_roots: HashMap<Address, Hash> = new_storage_roots.into_iter().collect();

        for (address, mut record) in loaded {
            if let Some(balance) = self.balances.get(&address) {
                record.balance = *balance;
            }
            if let Some(nonce) = self.nonces.get(&address) {
                record.nonce = *nonce;
            }
            if let Some(code) = self.codes.get(&address) {
                record.code_hash = if code.is_empty() {
                    EMPTY_CODE_HASH
                } else {
                    shared_crypto::keccak256(code)
                };
            }
            if let Some(root) = new_roots.remove(&address) {
                record.storage_root = root;
            }

            let new_root = state_trie.update(&account_trie_key(&address), record.rlp_encode())?;
            state_trie.set_root(new_root);
        }

        self.balances.clear();
        self.nonces.clear();
        self.codes.clear();
        self.storage.clear();
        self.dirty.clear();
        self.journal.clear();

        Ok(state_trie.root_hash())
    }
}

fn apply_storage_changes<S: KvStore>(
    store: &Arc<S>,
    job: (Address, Hash, Vec<(u128, u128)>),
) -> Result<(Address, Hash), StateError> {
    let (address, root, changes) = job;
    let mut trie = MerklePatriciaTrie::at(store.clone(), root);
    for (index, value) in changes {
        let key = storage_trie_key(index);
        let new_root = if value == 0 {
            trie.delete(&key)?
        } else {
            let mut s = RlpStream::new();
            append_int(&mut s, value);
            trie.update(&key, s.out().to_vec())?
        };
        trie.set_root(new_root);
    }
    Ok((address, trie.root_hash()))
}

fn compute_storage_roots<S: KvStore>(
    store: &Arc<S>,
    jobs: Vec<(Address, Hash, Vec<(u128, u128)>)>,
) -> Result<Vec<(Address, Hash)>, StateError> {
    let jobs: Vec<_> = jobs.into_iter().filter(|(_, _, c)| !c.is_empty()).collect();
    if jobs.len() < PARALLEL_THRESHOLD {
        jobs.into_iter().map(|j| apply_storage_changes(store, j)).collect()
    } else {
        jobs.into_par_iter()
            .map(|j| apply_storage_changes(store, j))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use shared_types::EMPTY_TRIE_ROOT;

    fn addr(byte: u8) -> Address {
        [byte; 20]
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut cache = StateCache::new();
        cache.set_balance(addr(1), 100);
        cache.set_nonce(addr(1), 3);
        cache.set_code(addr(1), vec![1, 2, 3]);
        cache.set_storage(addr(1), 7, 8);

        assert_eq!(cache.get_balance(&addr(1)), Some(100));
        assert_eq!(cache.get_nonce(&addr(1)), Some(3));
        assert_eq!(cache.get_code(&addr(1)), Some(&vec![1, 2, 3]));
        assert_eq!(cache.get_storage(&addr(1), 7), Some(8));
        assert_eq!(cache.dirty().len(), 1);
    }

    #[test]
    fn revert_undoes_writes_back_to_snapshot() {
        let mut cache = StateCache::new();
        cache.set_balance(addr(1), 100);
        let snap = cache.snapshot();
        cache.set_balance(addr(1), 200);
        cache.set_nonce(addr(2), 9);

        cache.revert(snap);

        assert_eq!(cache.get_balance(&addr(1)), Some(100));
        assert_eq!(cache.get_nonce(&addr(2)), None);
        assert!(!cache.dirty().addresses().any(|a| a == &addr(2)));
    }

    #[test]
    fn revert_to_zero_clears_first_write_too() {
        let mut cache = StateCache::new();
        let snap = cache.snapshot();
        cache.set_balance(addr(1), 100);
        cache.revert(snap);
        assert_eq!(cache.get_balance(&addr(1)), None);
        assert!(cache.dirty().is_empty());
    }

    #[test]
    fn commit_writes_balance_into_state_trie() {
        let store = Arc::new(MemoryStore::new());
        let mut trie = MerklePatriciaTrie::new(store.clone());
        let mut cache = StateCache::new();
        cache.set_balance(addr(5), 42);

        let root = cache.commit(&mut trie, &store).unwrap();
        trie.set_root(root);

        let bytes = trie.get(&account_trie_key(&addr(5))).unwrap().unwrap();
        let record = AccountRecord::rlp_decode(&bytes).unwrap();
        assert_eq!(record.balance, 42);
        assert!(cache.dirty().is_empty());
    }

    #[test]
    fn commit_updates_storage_root_and_clears_on_zero_value() {
        let store = Arc::new(MemoryStore::new());
        let mut trie = MerklePatriciaTrie::new(store.clone());
        let mut cache = StateCache::new();
        cache.set_storage(addr(6), 1, 9);
        let root = cache.commit(&mut trie, &store).unwrap();
        trie.set_root(root);

        let bytes = trie.get(&account_trie_key(&addr(6))).unwrap().unwrap();
        let record = AccountRecord::rlp_decode(&bytes).unwrap();
        assert_ne!(record.storage_root, EMPTY_TRIE_ROOT);

        let mut cache2 = StateCache::new();
        cache2.set_storage(addr(6), 1, 0);
        let root2 = cache2.commit(&mut trie, &store).unwrap();
        trie.set_root(root2);
        let bytes2 = trie.get(&account_trie_key(&addr(6))).unwrap().unwrap();
        let record2 = AccountRecord::rlp_decode(&bytes2).unwrap();
        assert_eq!(record2.storage_root, EMPTY_TRIE_ROOT);
    }

    #[test]
    fn commit_with_many_dirty_accounts_takes_parallel_path() {
        let store = Arc::new(MemoryStore::new());
        let mut trie = MerklePatriciaTrie::new(store.clone());
        let mut cache = StateCache::new();
        for i in 0u8..8 {
            cache.set_storage(addr(i), 1, (i + 1) as u128);
        }
        let root = cache.commit(&mut trie, &store).unwrap();
        trie.set_root(root);

        for i in 0u8..8 {
            let bytes = trie.get(&account_trie_key(&addr(i))).unwrap().unwrap();
            let record = AccountRecord::rlp_decode(&bytes).unwrap();
            assert_ne!(record.storage_root, EMPTY_TRIE_ROOT);
        }
    }

    #[test]
    fn code_update_sets_code_hash() {
        let store = Arc::new(MemoryStore::new());
        let mut trie = MerklePatriciaTrie::new(store.clone());
        let mut cache = StateCache::new();
        cache.set_code(addr(9), vec![0xfe, 0xed]);
        let root = cache.commit(&mut trie, &store).unwrap();
        trie.set_root(root);

        let bytes = trie.get(&account_trie_key(&addr(9))).unwrap().unwrap();
        let record = AccountRecord::rlp_decode(&bytes).unwrap();
        assert_eq!(record.code_hash, shared_crypto::keccak256(&[0xfe, 0xed]));
    }

    #[test]
    fn storage_trie_key_is_zero_padded_big_endian() {
        let key = storage_trie_key(1);
        assert_eq!(&key[..16], &[0u8; 16]);
        assert_eq!(key[31], 1);
    }
}
