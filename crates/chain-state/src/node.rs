//! Trie node types (C1/C3 supporting structure).
//!
//! Per Ethereum Yellow Paper Appendix D, a Modified Merkle Patricia
//! Trie has four node shapes. We store nodes keyed by their own
//! Keccak-256 hash in the backing [`crate::kv::KvStore`], so a node
//! only ever references its children by hash, never inline.

use crate::nibbles::Nibbles;
use rlp::{Rlp, RlpStream};
use shared_crypto::keccak256;
use shared_types::{Hash, EMPTY_TRIE_ROOT};

/// A node in the trie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrieNode {
    /// The null reference. Never stored; its hash is the well-known
    /// empty-trie root.
    Empty,
    /// `[hex_prefix(path, is_leaf=true), value]`
    Leaf { path: Nibbles, value: Vec<u8> },
    /// `[hex_prefix(path, is_leaf=false), child_hash]`
    Extension { path: Nibbles, child: Hash },
    /// `[child_0, .., child_15, value]`
    Branch {
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    /// Canonical RLP encoding of this node, as stored under its hash.
    pub fn rlp_encode(&self) -> Vec<u8> {
        match self {
            TrieNode::Empty => {
                let mut s = RlpStream::new();
                s.append_empty_data();
                s.out().to_vec()
            }
            TrieNode::Leaf { path, value } => {
                let mut s = RlpStream::new();
                s.begin_list(2);
                s.append(&path.encode_hex_prefix(true));
                s.append(value);
                s.out().to_vec()
            }
            TrieNode::Extension { path, child } => {
                let mut s = RlpStream::new();
                s.begin_list(2);
                s.append(&path.encode_hex_prefix(false));
                s.append(&child.as_slice());
                s.out().to_vec()
            }
            TrieNode::Branch { children, value } => {
                let mut s = RlpStream::new();
                s.begin_list(17);
                for child in children.iter() {
                    match child {
                        Some(hash) => {
                            s.append(&hash.as_slice());
                        }
                        None => {
                            s.append_empty_data();
                        }
                    }
                }
                match value {
                    Some(v) => {
                        s.append(v);
                    }
                    None => {
                        s.append_empty_data();
                    }
                }
                s.out().to_vec()
            }
        }
    }

    /// The Keccak-256 hash this node is stored under.
    pub fn hash(&self) -> Hash {
        if matches!(self, TrieNode::Empty) {
            return EMPTY_TRIE_ROOT;
        }
        keccak256(&self.rlp_encode())
    }

    /// Decode a node from its stored RLP bytes.
    pub fn rlp_decode(bytes: &[u8]) -> Result<Self, crate::errors::StateError> {
        use crate::errors::StateError;
        let rlp = Rlp::new(bytes);
        if rlp.is_empty() {
            return Ok(TrieNode::Empty);
        }
        let count = rlp
            .item_count()
            .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
        match count {
            2 => {
                let encoded_path: Vec<u8> = rlp
                    .at(0)
                    .and_then(|r| r.data().map(|d| d.to_vec()))
                    .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
                let (path, is_leaf) = Nibbles::decode_hex_prefix(&encoded_path);
                if is_leaf {
                    let value = rlp
                        .at(1)
                        .and_then(|r| r.data().map(|d| d.to_vec()))
                        .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
                    Ok(TrieNode::Leaf { path, value })
                } else {
                    let child = rlp
                        .at(1)
                        .and_then(|r| r.data())
                        .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
                    let child: Hash = child.try_into().map_err(|_| {
                        StateError::MalformedEncoding("extension child not 32 bytes".into())
                    })?;
                    Ok(TrieNode::Extension { path, child })
                }
            }
            17 => {
                let mut children: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
                for i in 0..16 {
                    let item = rlp
                        .at(i)
                        .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
                    let data = item
                        .data()
                        .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
                    if !data.is_empty() {
                        children[i] = Some(data.try_into().map_err(|_| {
                            StateError::MalformedEncoding("branch child not 32 bytes".into())
                        })?);
                    }
                }
                let value_item = rlp
                    .at(16)
                    .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
                let value_data = value_item
                    .data()
                    .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
                let value = if value_data.is_empty() {
                    None
                } else {
                    Some(value_data.to_vec())
                };
                Ok(TrieNode::Branch { children, value })
            }
            n => Err(StateError::MalformedEncoding(format!(
                "trie node with {n} items"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_hash_is_deterministic() {
        let leaf = TrieNode::Leaf {
            path: Nibbles(vec![1, 2, 3, 4]),
            value: vec![0xAB, 0xCD],
        };
        assert_eq!(leaf.hash(), leaf.hash());
        assert_ne!(leaf.hash(), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn leaf_roundtrips_through_rlp() {
        let leaf = TrieNode::Leaf {
            path: Nibbles(vec![1, 2, 3]),
            value: vec![0xAB, 0xCD, 0xEF],
        };
        let encoded = leaf.rlp_encode();
        let decoded = TrieNode::rlp_decode(&encoded).unwrap();
        assert_eq!(decoded, leaf);
    }

    #[test]
    fn branch_roundtrips_through_rlp() {
        let mut children: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
        children[3] = Some([9u8; 32]);
        children[15] = Some([1u8; 32]);
        let branch = TrieNode::Branch {
            children,
            value: Some(vec![1, 2, 3]),
        };
        let encoded = branch.rlp_encode();
        let decoded = TrieNode::rlp_decode(&encoded).unwrap();
        assert_eq!(decoded, branch);
    }

    #[test]
    fn empty_node_hashes_to_well_known_root() {
        assert_eq!(TrieNode::Empty.hash(), EMPTY_TRIE_ROOT);
    }
}
