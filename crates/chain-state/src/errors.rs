//! Error types for codec, trie, and state-cache operations.

use shared_types::Hash;
use thiserror::Error;

/// Errors raised by the state engine.
#[derive(Debug, Error)]
pub enum StateError {
    /// RLP structure did not match the expected field count or type.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// A trie node referenced by hash was not present in the backing
    /// store. Indicates a corrupt or incomplete store.
    #[error("missing trie node for hash {}", hex::encode(.0))]
    MissingNode(Hash),

    /// The backing key-value store returned an error.
    #[error("store error: {0}")]
    Store(String),

    /// A lock guarding shared state was poisoned by a panicking holder.
    #[error("lock poisoned")]
    LockPoisoned,

    /// `commit_state` was asked to commit a journal referencing an
    /// address with no corresponding account record and no storage
    /// changes — this should be unreachable given how the dirty set is
    /// populated, and indicates a caller bypassed the cache API.
    #[error("commit invariant violated: dirty address {} has no cache entries", hex::encode(.0))]
    CommitInvariantViolated(shared_types::Address),
}
