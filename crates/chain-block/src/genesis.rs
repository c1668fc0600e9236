//! # Genesis construction (C6)
//!
//! The genesis block's fields are all fixed constants — no wall clock,
//! no parent, no external input beyond the preallocation map — so its
//! hash is deterministic across every node that builds one.

use std::sync::Arc;

use chain_state::{ChainEnv, KvStore};
use shared_types::{Address, EMPTY_TRIE_ROOT};

use crate::block::Block;
use crate::errors::BlockError;
use crate::header::Header;
use crate::tx_trie::TxListTrie;

/// `2^17`, the genesis block's fixed difficulty.
pub const GENESIS_DIFFICULTY: u128 = 1 << 17;
/// `10^6`, the genesis block's fixed gas limit.
pub const GENESIS_GAS_LIMIT: u128 = 1_000_000;
/// The genesis coinbase sentinel: twenty zero bytes (`"0"*40` hex in
/// the original).
pub const GENESIS_COINBASE: Address = [0u8; 20];
/// Genesis is its own parent: thirty-two zero bytes. Used to recognize
/// a genesis header on deserialization, since a genesis block's
/// `state_root` is not otherwise distinguishable from any other block's.
pub const GENESIS_PREVHASH: shared_types::Hash = [0u8; 32];

/// The eight addresses the original chain's genesis preallocated,
/// parsed from their hex form.
const GENESIS_ALLOC_HEX: [&str; 8] = [
    "51ba59315b3a95761d0863b05ccc7a7f54703d99",
    "e6716f9544a56c530d868e4bfbacb172315bdead",
    "b9c015918bdaba24b4ff057a92a3873d6eb201be",
    "1a26338f0d905e295fccb71fa9ea849ffa12aaf4",
    "2ef47100e0787b915105fd5e3f4ff6752079d5cb",
    "cd2a3d9f938e13cd947ec05abc7fe734df8dd826",
    "6c386a4b26f73c802f34673f7248bb118f97424a",
    "e4157b34ea9615cfbde6b4fda419828124b70c78",
];

/// The original chain credited each preallocated address `2^200` wei —
/// an arbitrary-precision figure with no equivalent once balances are
/// modeled as `u128` (see DESIGN.md). Every genesis account is credited
/// `u128::MAX` instead: a deliberately enormous, never-overflowing
/// stand-in for "more than this test chain will ever spend".
pub const GENESIS_ALLOC_BALANCE: u128 = u128::MAX;

fn genesis_nonce() -> Vec<u8> {
    shared_crypto::keccak256(&[42u8]).to_vec()
}

fn preallocated_addresses() -> Vec<Address> {
    GENESIS_ALLOC_HEX
        .iter()
        .map(|hex_addr| {
            let bytes = hex::decode(hex_addr).expect("genesis address literal is valid hex");
            let mut addr = [0u8; 20];
            addr.copy_from_slice(&bytes);
            addr
        })
        .collect()
}

/// Build the genesis block: fixed header fields, the eight-address
/// preallocation credited into a fresh state trie, then committed and
/// sealed immediately (genesis is always already-finalized).
pub fn build_genesis<S: KvStore>(store: Arc<S>) -> Result<Block<S>, BlockError> {
    let mut env = ChainEnv::empty(store.clone())?;
    for address in preallocated_addresses() {
        env.set_balance(address, GENESIS_ALLOC_BALANCE);
    }
    let state_root = env.commit()?;

    let header = Header {
        prevhash: [0u8; 32],
        uncles_hash: Header::empty_uncles_hash(),
        coinbase: GENESIS_COINBASE,
        state_root,
        tx_list_root: EMPTY_TRIE_ROOT,
        difficulty: GENESIS_DIFFICULTY,
        number: 0,
        min_gas_price: 0,
        gas_limit: GENESIS_GAS_LIMIT,
        gas_used: 0,
        timestamp: 0,
        extra_data: Vec::new(),
        nonce: genesis_nonce(),
    };

    Ok(Block::from_parts(header, Vec::new(), TxListTrie::new(store), env, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_state::MemoryStore;

    #[test]
    fn genesis_hash_is_deterministic_across_builds() {
        let a = build_genesis(Arc::new(MemoryStore::new())).unwrap();
        let b = build_genesis(Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn genesis_has_fixed_constants() {
        let genesis = build_genesis(Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(genesis.header().prevhash, [0u8; 32]);
        assert_eq!(genesis.header().difficulty, GENESIS_DIFFICULTY);
        assert_eq!(genesis.header().number, 0);
        assert_eq!(genesis.header().nonce, genesis_nonce());
        assert_eq!(genesis.header().gas_limit, GENESIS_GAS_LIMIT);
    }

    #[test]
    fn preallocated_addresses_are_credited() {
        let genesis = build_genesis(Arc::new(MemoryStore::new())).unwrap();
        for address in preallocated_addresses() {
            assert_eq!(genesis.get_balance(&address).unwrap(), GENESIS_ALLOC_BALANCE);
        }
    }

    #[test]
    fn genesis_is_already_sealed() {
        let genesis = build_genesis(Arc::new(MemoryStore::new())).unwrap();
        assert!(genesis.is_sealed());
    }
}
