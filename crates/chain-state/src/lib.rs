//! # chain-state
//!
//! Account-based world state, authenticated by a Modified Merkle
//! Patricia Trie (Ethereum Yellow Paper Appendix D) and serialized with
//! a canonical RLP-derived codec.
//!
//! ## Layout
//!
//! - [`codec`] — the chain's five semantic RLP field types (`int`,
//!   `bin`, `addr`, `hash`/`trie_root`), built on the external `rlp`
//!   crate.
//! - [`nibbles`], [`node`] — the trie's internal path and node
//!   representations.
//! - [`trie`] — the `Trie` contract and its `MerklePatriciaTrie`
//!   implementation.
//! - [`kv`] — the `KvStore` contract plus an in-memory and a
//!   `sled`-backed implementation.
//! - [`account`] — the account record and its trie key.
//! - [`cache`] — the write-through state cache and journal that make
//!   transactional execution (`snapshot`/`revert`/`commit`) possible.
//! - [`env`] — [`env::ChainEnv`], the one handle callers actually use.

pub mod account;
pub mod cache;
pub mod codec;
pub mod env;
pub mod errors;
pub mod kv;
pub mod nibbles;
pub mod node;
pub mod trie;

pub use account::AccountRecord;
pub use cache::{DirtySet, Snapshot, StateCache};
pub use env::ChainEnv;
pub use errors::StateError;
pub use kv::{KvStore, MemoryStore, SledStore};
pub use trie::{MerklePatriciaTrie, Trie};
