//! Error types for block construction, validation, and replay.

use shared_types::Hash;
use thiserror::Error;

/// Errors raised by block construction, serialization, and validation.
#[derive(Debug, Error)]
pub enum BlockError {
    /// `chain_state` reported a codec or trie failure.
    #[error(transparent)]
    State(#[from] chain_state::StateError),

    /// RLP structure did not match the expected block/header shape.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// Deserializing a block whose `state_root` is neither locally
    /// present nor the genesis sentinel, and whose parent is unknown.
    #[error("unknown parent for block {}", hex::encode(.0))]
    UnknownParent(Hash),

    /// A decoded or replayed block failed a consensus check.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Replaying a block's transactions produced a different
    /// intermediate state root or cumulative gas than recorded.
    #[error("replay mismatch at tx {index}: expected state root {expected}, got {actual}")]
    ReplayMismatch {
        index: u64,
        expected: String,
        actual: String,
    },

    /// A balance delta would have driven the account negative.
    #[error("balance underflow for account {}: balance {balance}, delta {delta}", hex::encode(.address))]
    BalanceUnderflow {
        address: shared_types::Address,
        balance: u128,
        delta: i128,
    },

    /// Proof-of-work did not satisfy the header's declared difficulty.
    #[error("proof of work failed: hash value does not clear target")]
    ProofOfWorkFailed,

    /// A header or block field violated a hard structural invariant.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}
