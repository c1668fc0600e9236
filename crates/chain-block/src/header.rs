//! # Block header (part of C5)
//!
//! The thirteen consensus-critical fields, in the order that makes the
//! block hash well-defined. Field order here is normative: changing it
//! changes every hash downstream.

use chain_state::codec::{
    append_addr, append_bin, append_hash, append_int, decode_addr, decode_bin, decode_hash,
    decode_int,
};
use rlp::{Rlp, RlpStream};
use shared_types::{Address, Hash, EMPTY_TRIE_ROOT};

use crate::errors::BlockError;

/// Byte length a non-genesis header's proof-of-work nonce must have.
pub const NONCE_LENGTH: usize = 32;

/// Upper bound on `extra_data`, in bytes.
pub const MAX_EXTRA_DATA: usize = 1024;

/// The thirteen header fields, ordered exactly as in the canonical
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub prevhash: Hash,
    pub uncles_hash: Hash,
    pub coinbase: Address,
    pub state_root: Hash,
    pub tx_list_root: Hash,
    pub difficulty: u128,
    pub number: u64,
    pub min_gas_price: u128,
    pub gas_limit: u128,
    pub gas_used: u128,
    pub timestamp: u64,
    pub extra_data: Vec<u8>,
    pub nonce: Vec<u8>,
}

impl Header {
    /// Hash of the RLP encoding of an empty list, used as the default
    /// `uncles_hash` for a block with no uncles.
    pub fn empty_uncles_hash() -> Hash {
        let s = RlpStream::new_list(0);
        shared_crypto::keccak256(&s.out())
    }

    /// Canonical encoding of all thirteen fields, in order.
    pub fn rlp_encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(13);
        append_hash(&mut s, &self.prevhash);
        append_hash(&mut s, &self.uncles_hash);
        append_addr(&mut s, &self.coinbase);
        append_hash(&mut s, &self.state_root);
        append_hash(&mut s, &self.tx_list_root);
        append_int(&mut s, self.difficulty);
        append_int(&mut s, self.number as u128);
        append_int(&mut s, self.min_gas_price);
        append_int(&mut s, self.gas_limit);
        append_int(&mut s, self.gas_used);
        append_int(&mut s, self.timestamp as u128);
        append_bin(&mut s, &self.extra_data);
        append_bin(&mut s, &self.nonce);
        s.out().to_vec()
    }

    /// Decode a header from its canonical encoding.
    pub fn rlp_decode(bytes: &[u8]) -> Result<Self, BlockError> {
        let rlp = Rlp::new(bytes);
        if !rlp.is_list() || rlp.item_count().unwrap_or(0) != 13 {
            return Err(BlockError::MalformedEncoding(
                "header must be a 13-element list".into(),
            ));
        }
        let number = decode_int(&rlp.at(6).map_err(rlp_err)?)?;
        let timestamp = decode_int(&rlp.at(10).map_err(rlp_err)?)?;
        Ok(Header {
            prevhash: decode_hash(&rlp.at(0).map_err(rlp_err)?)?,
            uncles_hash: decode_hash(&rlp.at(1).map_err(rlp_err)?)?,
            coinbase: decode_addr(&rlp.at(2).map_err(rlp_err)?)?,
            state_root: decode_hash(&rlp.at(3).map_err(rlp_err)?)?,
            tx_list_root: decode_hash(&rlp.at(4).map_err(rlp_err)?)?,
            difficulty: decode_int(&rlp.at(5).map_err(rlp_err)?)?,
            number: number as u64,
            min_gas_price: decode_int(&rlp.at(7).map_err(rlp_err)?)?,
            gas_limit: decode_int(&rlp.at(8).map_err(rlp_err)?)?,
            gas_used: decode_int(&rlp.at(9).map_err(rlp_err)?)?,
            timestamp: timestamp as u64,
            extra_data: decode_bin(&rlp.at(11).map_err(rlp_err)?)?,
            nonce: decode_bin(&rlp.at(12).map_err(rlp_err)?)?,
        })
    }

    /// `sha3(encode(header))` — the block hash.
    pub fn hash(&self) -> Hash {
        shared_crypto::keccak256(&self.rlp_encode())
    }

    /// `Hn`: the canonical encoding of the first twelve fields, i.e.
    /// everything except `nonce` — the part of the header the
    /// proof-of-work mix commits to.
    pub fn rlp_encode_without_nonce(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(12);
        append_hash(&mut s, &self.prevhash);
        append_hash(&mut s, &self.uncles_hash);
        append_addr(&mut s, &self.coinbase);
        append_hash(&mut s, &self.state_root);
        append_hash(&mut s, &self.tx_list_root);
        append_int(&mut s, self.difficulty);
        append_int(&mut s, self.number as u128);
        append_int(&mut s, self.min_gas_price);
        append_int(&mut s, self.gas_limit);
        append_int(&mut s, self.gas_used);
        append_int(&mut s, self.timestamp as u128);
        append_bin(&mut s, &self.extra_data);
        s.out().to_vec()
    }

    /// Structural invariants independent of consensus history: extra
    /// data length. `coinbase` has no distinct "empty" representation
    /// to reject — genesis itself uses the all-zero address.
    pub fn check_structure(&self) -> Result<(), BlockError> {
        if self.extra_data.len() > MAX_EXTRA_DATA {
            return Err(BlockError::InvariantViolated(format!(
                "extra_data is {} bytes, exceeds {MAX_EXTRA_DATA}",
                self.extra_data.len()
            )));
        }
        Ok(())
    }

    /// A header with every field at its genesis-ready default, ready to
    /// have `coinbase`, `nonce`, and preallocation-derived `state_root`
    /// filled in by the caller.
    pub fn default_header() -> Self {
        Header {
            prevhash: [0u8; 32],
            uncles_hash: Self::empty_uncles_hash(),
            coinbase: [0u8; 20],
            state_root: EMPTY_TRIE_ROOT,
            tx_list_root: EMPTY_TRIE_ROOT,
            difficulty: 0,
            number: 0,
            min_gas_price: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Vec::new(),
            nonce: Vec::new(),
        }
    }
}

fn rlp_err(e: rlp::DecoderError) -> BlockError {
    BlockError::MalformedEncoding(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        Header {
            prevhash: [1u8; 32],
            uncles_hash: Header::empty_uncles_hash(),
            coinbase: [2u8; 20],
            state_root: [3u8; 32],
            tx_list_root: [4u8; 32],
            difficulty: 131072,
            number: 1,
            min_gas_price: 0,
            gas_limit: 1_000_000,
            gas_used: 21_000,
            timestamp: 1000,
            extra_data: vec![0xaa, 0xbb],
            nonce: vec![9u8; 32],
        }
    }

    #[test]
    fn header_roundtrips_through_rlp() {
        let header = sample();
        let bytes = header.rlp_encode();
        let decoded = Header::rlp_decode(&bytes).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn hash_is_deterministic() {
        let header = sample();
        assert_eq!(header.hash(), header.hash());
    }

    #[test]
    fn empty_uncles_hash_matches_known_value() {
        // sha3(rlp.encode([])) — the empty list's canonical hash.
        let h = Header::empty_uncles_hash();
        assert_eq!(h, shared_crypto::keccak256(&[0xc0]));
    }

    #[test]
    fn rejects_oversized_extra_data() {
        let mut header = sample();
        header.extra_data = vec![0u8; MAX_EXTRA_DATA + 1];
        assert!(header.check_structure().is_err());
    }

    #[test]
    fn accepts_all_zero_coinbase() {
        let mut header = sample();
        header.coinbase = [0u8; 20];
        assert!(header.check_structure().is_ok());
    }

    #[test]
    fn without_nonce_encoding_is_prefix_of_full_encoding_semantics() {
        let header = sample();
        let hn = header.rlp_encode_without_nonce();
        let rlp = Rlp::new(&hn);
        assert_eq!(rlp.item_count().unwrap(), 12);
    }
}
