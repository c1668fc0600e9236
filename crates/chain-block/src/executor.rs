//! # Transaction executor contract (external collaborator)
//!
//! The EVM itself is explicitly out of scope for this crate (spec §1).
//! What belongs here is the seam: the one call block replay needs to
//! make into whatever executor a caller plugs in.

use chain_state::KvStore;

use crate::block::Block;
use crate::errors::BlockError;

/// Applies one already-decoded transaction's raw bytes against a
/// block's state, returning whether it succeeded and its output bytes.
/// Implementations are expected to charge gas, mutate balances/storage
/// through the block's account operations, and leave the block's state
/// cache in the post-transaction snapshot on success.
pub trait TransactionExecutor<S: KvStore> {
    fn apply_transaction(&self, block: &mut Block<S>, tx_bytes: &[u8]) -> Result<(bool, Vec<u8>), BlockError>;
}
