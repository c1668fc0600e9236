//! # Modified Merkle Patricia Trie (external interface, §6)
//!
//! The chain treats the trie as an authenticated key→value dictionary
//! committing to a single 32-byte root; this module is the one concrete
//! implementation of that contract that ships with the crate. Nodes are
//! content-addressed (keyed by their own Keccak-256 hash) in whatever
//! [`crate::kv::KvStore`] is supplied, so two tries sharing structure
//! share storage automatically and `at_root` is a zero-copy operation.

use std::sync::Arc;

use shared_types::{Hash, EMPTY_TRIE_ROOT};

use crate::errors::StateError;
use crate::kv::KvStore;
use crate::nibbles::Nibbles;
use crate::node::TrieNode;

/// An authenticated, byte-keyed dictionary committing to a single root
/// hash.
pub trait Trie {
    /// Current root hash.
    fn root_hash(&self) -> Hash;

    /// A handle to the same backing store rooted at a different hash
    /// (e.g. re-opening a storage trie at the root recorded in an
    /// account record).
    fn at_root(&self, root: Hash) -> Self;

    /// Look up `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError>;

    /// Insert or overwrite `key`, returning the new root hash. Does not
    /// mutate `self` — callers that want the running root updated call
    /// [`MerklePatriciaTrie::set_root`] (or just re-root a fresh handle).
    fn update(&self, key: &[u8], value: Vec<u8>) -> Result<Hash, StateError>;

    /// Remove `key`, returning the new root hash (unchanged if absent).
    fn delete(&self, key: &[u8]) -> Result<Hash, StateError>;
}

/// The shipped [`Trie`] implementation.
pub struct MerklePatriciaTrie<S: KvStore> {
    store: Arc<S>,
    root: Hash,
}

impl<S: KvStore> MerklePatriciaTrie<S> {
    /// Open a trie at the well-known empty root.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            root: EMPTY_TRIE_ROOT,
        }
    }

    /// Open a trie at a specific, previously computed root.
    pub fn at(store: Arc<S>, root: Hash) -> Self {
        Self { store, root }
    }

    /// Overwrite the handle's current root (used after a sequence of
    /// `update`/`delete` calls whose returned hashes should become the
    /// trie's new working root).
    pub fn set_root(&mut self, root: Hash) {
        self.root = root;
    }

    fn load(&self, hash: Hash) -> Result<TrieNode, StateError> {
        if hash == EMPTY_TRIE_ROOT {
            return Ok(TrieNode::Empty);
        }
        let bytes = self
            .store
            .get(&hash)?
            .ok_or(StateError::MissingNode(hash))?;
        TrieNode::rlp_decode(&bytes)
    }

    fn store_node(&self, node: &TrieNode) -> Result<Hash, StateError> {
        if matches!(node, TrieNode::Empty) {
            return Ok(EMPTY_TRIE_ROOT);
        }
        let hash = node.hash();
        self.store.put(&hash, node.rlp_encode())?;
        Ok(hash)
    }

    fn get_at(&self, hash: Hash, path: &Nibbles) -> Result<Option<Vec<u8>>, StateError> {
        match self.load(hash)? {
            TrieNode::Empty => Ok(None),
            TrieNode::Leaf {
                path: leaf_path,
                value,
            } => Ok(if &leaf_path == path { Some(value) } else { None }),
            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                if path.len() < ext_path.len() || path.slice_range(0, ext_path.len()) != ext_path {
                    Ok(None)
                } else {
                    self.get_at(child, &path.slice(ext_path.len()))
                }
            }
            TrieNode::Branch { children, value } => {
                if path.is_empty() {
                    Ok(value)
                } else {
                    let idx = path.at(0) as usize;
                    match children[idx] {
                        None => Ok(None),
                        Some(child) => self.get_at(child, &path.slice(1)),
                    }
                }
            }
        }
    }

    fn insert_at(
        &self,
        hash: Hash,
        path: &Nibbles,
        value: Vec<u8>,
    ) -> Result<Hash, StateError> {
        match self.load(hash)? {
            TrieNode::Empty => self.store_node(&TrieNode::Leaf {
                path: path.clone(),
                value,
            }),
            TrieNode::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if &leaf_path == path {
                    return self.store_node(&TrieNode::Leaf { path: path.clone(), value });
                }
                let common = leaf_path.common_prefix_len(path);
                let mut children: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
                let mut branch_value = None;

                if common == leaf_path.len() {
                    branch_value = Some(leaf_value);
                } else {
                    let idx = leaf_path.at(common) as usize;
                    let rest = leaf_path.slice(common + 1);
                    children[idx] = Some(self.store_node(&TrieNode::Leaf {
                        path: rest,
                        value: leaf_value,
                    })?);
                }

                if common == path.len() {
                    branch_value = Some(value);
                } else {
                    let idx = path.at(common) as usize;
                    let rest = path.slice(common + 1);
                    children[idx] = Some(self.store_node(&TrieNode::Leaf { path: rest, value })?);
                }

                let branch_hash = self.store_node(&TrieNode::Branch {
                    children,
                    value: branch_value,
                })?;
                if common > 0 {
                    self.store_node(&TrieNode::Extension {
                        path: path.slice_range(0, common),
                        child: branch_hash,
                    })
                } else {
                    Ok(branch_hash)
                }
            }
            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let common = ext_path.common_prefix_len(path);
                if common == ext_path.len() {
                    let new_child = self.insert_at(child, &path.slice(common), value)?;
                    return self.store_node(&TrieNode::Extension {
                        path: ext_path,
                        child: new_child,
                    });
                }

                let mut children: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
                let mut branch_value = None;

                let old_idx = ext_path.at(common) as usize;
                let old_rest = ext_path.slice(common + 1);
                let old_child_hash = if old_rest.is_empty() {
                    child
                } else {
                    self.store_node(&TrieNode::Extension {
                        path: old_rest,
                        child,
                    })?
                };
                children[old_idx] = Some(old_child_hash);

                if common == path.len() {
                    branch_value = Some(value);
                } else {
                    let idx = path.at(common) as usize;
                    let rest = path.slice(common + 1);
                    children[idx] = Some(self.store_node(&TrieNode::Leaf { path: rest, value })?);
                }

                let branch_hash = self.store_node(&TrieNode::Branch {
                    children,
                    value: branch_value,
                })?;
                if common > 0 {
                    self.store_node(&TrieNode::Extension {
                        path: path.slice_range(0, common),
                        child: branch_hash,
                    })
                } else {
                    Ok(branch_hash)
                }
            }
            TrieNode::Branch {
                mut children,
                value: branch_value,
            } => {
                if path.is_empty() {
                    self.store_node(&TrieNode::Branch {
                        children,
                        value: Some(value),
                    })
                } else {
                    let idx = path.at(0) as usize;
                    let child_hash = children[idx].unwrap_or(EMPTY_TRIE_ROOT);
                    let new_child = self.insert_at(child_hash, &path.slice(1), value)?;
                    children[idx] = Some(new_child);
                    self.store_node(&TrieNode::Branch {
                        children,
                        value: branch_value,
                    })
                }
            }
        }
    }

    fn delete_at(&self, hash: Hash, path: &Nibbles) -> Result<Option<Hash>, StateError> {
        match self.load(hash)? {
            TrieNode::Empty => Ok(None),
            TrieNode::Leaf { path: leaf_path, .. } => {
                if &leaf_path == path {
                    Ok(None)
                } else {
                    Ok(Some(hash))
                }
            }
            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                if path.len() < ext_path.len() || path.slice_range(0, ext_path.len()) != ext_path {
                    return Ok(Some(hash));
                }
                match self.delete_at(child, &path.slice(ext_path.len()))? {
                    None => Ok(None),
                    Some(new_child) if new_child == child => Ok(Some(hash)),
                    Some(new_child) => Ok(Some(self.merge_into_extension(&ext_path, new_child)?)),
                }
            }
            TrieNode::Branch {
                mut children,
                value,
            } => {
                if path.is_empty() {
                    if value.is_none() {
                        return Ok(Some(hash));
                    }
                    self.normalize_branch(children, None)
                } else {
                    let idx = path.at(0) as usize;
                    let Some(child_hash) = children[idx] else {
                        return Ok(Some(hash));
                    };
                    match self.delete_at(child_hash, &path.slice(1))? {
                        None => {
                            children[idx] = None;
                            self.normalize_branch(children, value)
                        }
                        Some(new_child) if new_child == child_hash => Ok(Some(hash)),
                        Some(new_child) => {
                            children[idx] = Some(new_child);
                            self.store_node(&TrieNode::Branch { children, value }).map(Some)
                        }
                    }
                }
            }
        }
    }

    /// Glue `prefix` onto whatever node now lives at `child`, collapsing
    /// a run of extension nodes rather than letting them pile up.
    fn merge_into_extension(&self, prefix: &Nibbles, child: Hash) -> Result<Hash, StateError> {
        match self.load(child)? {
            TrieNode::Leaf { path, value } => self.store_node(&TrieNode::Leaf {
                path: path.prepend(&prefix.0),
                value,
            }),
            TrieNode::Extension {
                path,
                child: grandchild,
            } => self.store_node(&TrieNode::Extension {
                path: path.prepend(&prefix.0),
                child: grandchild,
            }),
            _ => self.store_node(&TrieNode::Extension {
                path: prefix.clone(),
                child,
            }),
        }
    }

    fn normalize_branch(
        &self,
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    ) -> Result<Option<Hash>, StateError> {
        let present: Vec<usize> = children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|_| i))
            .collect();

        match (present.len(), &value) {
            (0, None) => Ok(None),
            (0, Some(v)) => self
                .store_node(&TrieNode::Leaf {
                    path: Nibbles(Vec::new()),
                    value: v.clone(),
                })
                .map(Some),
            (1, None) => {
                let idx = present[0];
                let child_hash = children[idx].unwrap();
                let merged = match self.load(child_hash)? {
                    TrieNode::Leaf { path, value } => self.store_node(&TrieNode::Leaf {
                        path: path.prepend(&[idx as u8]),
                        value,
                    })?,
                    TrieNode::Extension {
                        path,
                        child: grandchild,
                    } => self.store_node(&TrieNode::Extension {
                        path: path.prepend(&[idx as u8]),
                        child: grandchild,
                    })?,
                    TrieNode::Branch { .. } => self.store_node(&TrieNode::Extension {
                        path: Nibbles(vec![idx as u8]),
                        child: child_hash,
                    })?,
                    TrieNode::Empty => unreachable!("branch child hash is never the empty root"),
                };
                Ok(Some(merged))
            }
            _ => self
                .store_node(&TrieNode::Branch { children, value })
                .map(Some),
        }
    }

    /// Collect every `(key, value)` pair reachable from the current
    /// root. Intended for tests and debugging, not the hot path.
    pub fn iter_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let mut out = Vec::new();
        self.collect(self.root, &Nibbles(Vec::new()), &mut out)?;
        Ok(out)
    }

    fn collect(
        &self,
        hash: Hash,
        prefix: &Nibbles,
        out: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), StateError> {
        match self.load(hash)? {
            TrieNode::Empty => {}
            TrieNode::Leaf { path, value } => {
                out.push((prefix.prepend(&path.0).to_bytes(), value));
            }
            TrieNode::Extension { path, child } => {
                self.collect(child, &prefix.prepend(&path.0), out)?;
            }
            TrieNode::Branch { children, value } => {
                if let Some(v) = value {
                    out.push((prefix.to_bytes(), v));
                }
                for (i, c) in children.iter().enumerate() {
                    if let Some(child) = c {
                        self.collect(*child, &prefix.prepend(&[i as u8]), out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The RLP-encoded nodes along the path to `key`, from the root
    /// down. A light client can replay these against `root_hash()` to
    /// verify (or refute) membership without trusting the responder.
    pub fn get_proof(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, StateError> {
        let path = Nibbles::from_bytes(key);
        let mut proof = Vec::new();
        self.collect_proof(self.root, &path, &mut proof)?;
        Ok(proof)
    }

    fn collect_proof(
        &self,
        hash: Hash,
        path: &Nibbles,
        proof: &mut Vec<Vec<u8>>,
    ) -> Result<(), StateError> {
        if hash == EMPTY_TRIE_ROOT {
            return Ok(());
        }
        let node = self.load(hash)?;
        proof.push(node.rlp_encode());
        match node {
            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                if path.len() >= ext_path.len() && path.slice_range(0, ext_path.len()) == ext_path
                {
                    self.collect_proof(child, &path.slice(ext_path.len()), proof)?;
                }
            }
            TrieNode::Branch { children, .. } => {
                if !path.is_empty() {
                    if let Some(child) = children[path.at(0) as usize] {
                        self.collect_proof(child, &path.slice(1), proof)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl<S: KvStore> Trie for MerklePatriciaTrie<S> {
    fn root_hash(&self) -> Hash {
        self.root
    }

    fn at_root(&self, root: Hash) -> Self {
        Self {
            store: self.store.clone(),
            root,
        }
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        self.get_at(self.root, &Nibbles::from_bytes(key))
    }

    fn update(&self, key: &[u8], value: Vec<u8>) -> Result<Hash, StateError> {
        self.insert_at(self.root, &Nibbles::from_bytes(key), value)
    }

    fn delete(&self, key: &[u8]) -> Result<Hash, StateError> {
        Ok(self
            .delete_at(self.root, &Nibbles::from_bytes(key))?
            .unwrap_or(EMPTY_TRIE_ROOT))
    }
}
