//! # Transaction list trie (C4)
//!
//! An indexed authenticated dictionary of the transactions included in
//! a block. Keyed by the canonical encoding of the 0-based transaction
//! index; the value at each key is `[tx_bytes, post_state_root,
//! cumulative_gas_used]`, recorded *after* the transaction at that
//! index was applied. There is no deletion — `count` only grows.

use std::sync::Arc;

use chain_state::codec::{append_bin, append_hash, append_int, decode_bin, decode_hash, decode_int};
use chain_state::{KvStore, MerklePatriciaTrie, StateError, Trie};
use rlp::{Rlp, RlpStream};
use shared_types::Hash;

/// One committed transaction's record: its raw bytes, the state root
/// immediately after it was applied, and the gas used by the block so
/// far (inclusive of this transaction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub tx_bytes: Vec<u8>,
    pub post_state_root: Hash,
    pub cumulative_gas_used: u128,
}

impl TxRecord {
    fn rlp_encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(3);
        append_bin(&mut s, &self.tx_bytes);
        append_hash(&mut s, &self.post_state_root);
        append_int(&mut s, self.cumulative_gas_used);
        s.out().to_vec()
    }

    fn rlp_decode(bytes: &[u8]) -> Result<Self, StateError> {
        let rlp = Rlp::new(bytes);
        if !rlp.is_list() || rlp.item_count().unwrap_or(0) != 3 {
            return Err(StateError::MalformedEncoding(
                "tx record must be a 3-element list".into(),
            ));
        }
        Ok(TxRecord {
            tx_bytes: decode_bin(&rlp.at(0).map_err(|e| StateError::MalformedEncoding(e.to_string()))?)?,
            post_state_root: decode_hash(&rlp.at(1).map_err(|e| StateError::MalformedEncoding(e.to_string()))?)?,
            cumulative_gas_used: decode_int(&rlp.at(2).map_err(|e| StateError::MalformedEncoding(e.to_string()))?)?,
        })
    }
}

fn index_key(index: u64) -> Vec<u8> {
    let mut s = RlpStream::new();
    append_int(&mut s, index as u128);
    s.out().to_vec()
}

/// The authenticated list of a block's transactions.
pub struct TxListTrie<S: KvStore> {
    trie: MerklePatriciaTrie<S>,
    count: u64,
}

impl<S: KvStore> TxListTrie<S> {
    /// A fresh, empty transaction list.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            trie: MerklePatriciaTrie::new(store),
            count: 0,
        }
    }

    /// Reopen a transaction list at a previously computed root, with
    /// `count` already known (carried alongside the root by the owning
    /// block header's construction path).
    pub fn at(store: Arc<S>, root: Hash, count: u64) -> Self {
        Self {
            trie: MerklePatriciaTrie::at(store, root),
            count,
        }
    }

    pub fn root(&self) -> Hash {
        self.trie.root_hash()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Append the record for the next transaction index and return the
    /// new root.
    pub fn append(
        &mut self,
        tx_bytes: Vec<u8>,
        post_state_root: Hash,
        cumulative_gas_used: u128,
    ) -> Result<Hash, StateError> {
        let record = TxRecord {
            tx_bytes,
            post_state_root,
            cumulative_gas_used,
        };
        let key = index_key(self.count);
        let root = self.trie.update(&key, record.rlp_encode())?;
        self.trie.set_root(root);
        self.count += 1;
        Ok(root)
    }

    /// The record at `index`, if present.
    pub fn get(&self, index: u64) -> Result<Option<TxRecord>, StateError> {
        match self.trie.get(&index_key(index))? {
            Some(bytes) => Ok(Some(TxRecord::rlp_decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
