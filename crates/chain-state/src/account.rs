//! # Account record (C2)
//!
//! An account is the 4-tuple Ethereum's Yellow Paper defines:
//! `(nonce, balance, storage_root, code_hash)`. There is no separate
//! "account exists" bit — an address with no entry in the state trie is
//! indistinguishable from a "blank" account with all-zero fields, and
//! [`AccountRecord::blank`] is exactly that value.

use rlp::{Rlp, RlpStream};
use shared_types::{Address, Hash, EMPTY_CODE_HASH, EMPTY_TRIE_ROOT};

use crate::codec::{append_addr, append_hash, append_int, decode_addr, decode_hash, decode_int};
use crate::errors::StateError;

/// The per-address state-trie value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountRecord {
    pub nonce: u64,
    pub balance: u128,
    pub storage_root: Hash,
    pub code_hash: Hash,
}

impl AccountRecord {
    /// A brand-new account: no transactions sent, no funds, an empty
    /// storage trie, and the hash of the empty code blob. Every account
    /// that has never executed code still gets `code_hash` set to
    /// `EMPTY_CODE_HASH` rather than left unset, so a blank account's
    /// RLP encoding is stable regardless of whether it is later used to
    /// hold a contract.
    pub fn blank() -> Self {
        Self {
            nonce: 0,
            balance: 0,
            storage_root: EMPTY_TRIE_ROOT,
            code_hash: EMPTY_CODE_HASH,
        }
    }

    /// Whether this is indistinguishable from an account that was never
    /// written — the state trie may as well not contain this address at
    /// all.
    pub fn is_blank(&self) -> bool {
        self == &Self::blank()
    }

    /// Canonical RLP encoding, in field order `(nonce, balance,
    /// storage_root, code_hash)`.
    pub fn rlp_encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.begin_list(4);
        append_int(&mut s, self.nonce as u128);
        append_int(&mut s, self.balance);
        append_hash(&mut s, &self.storage_root);
        append_hash(&mut s, &self.code_hash);
        s.out().to_vec()
    }

    /// Decode an account record from its stored RLP bytes.
    pub fn rlp_decode(bytes: &[u8]) -> Result<Self, StateError> {
        let rlp = Rlp::new(bytes);
        let count = rlp
            .item_count()
            .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
        if count != 4 {
            return Err(StateError::MalformedEncoding(format!(
                "account record with {count} fields, want 4"
            )));
        }
        let nonce = decode_int(&rlp.at(0).map_err(|e| StateError::MalformedEncoding(e.to_string()))?)?;
        let balance = decode_int(&rlp.at(1).map_err(|e| StateError::MalformedEncoding(e.to_string()))?)?;
        let storage_root = decode_hash(&rlp.at(2).map_err(|e| StateError::MalformedEncoding(e.to_string()))?)?;
        let code_hash = decode_hash(&rlp.at(3).map_err(|e| StateError::MalformedEncoding(e.to_string()))?)?;
        if nonce > u64::MAX as u128 {
            return Err(StateError::MalformedEncoding("nonce exceeds u64".into()));
        }
        Ok(Self {
            nonce: nonce as u64,
            balance,
            storage_root,
            code_hash,
        })
    }
}

/// Append an account's trie key (its address, used verbatim — the
/// state trie is keyed nibble-wise over the raw 20 bytes, not a hash of
/// them).
pub fn account_trie_key(address: &Address) -> Vec<u8> {
    address.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_account_has_empty_trie_root_and_empty_code_hash() {
        let blank = AccountRecord::blank();
        assert_eq!(blank.storage_root, EMPTY_TRIE_ROOT);
        assert_eq!(blank.code_hash, EMPTY_CODE_HASH);
        assert_eq!(blank.nonce, 0);
        assert_eq!(blank.balance, 0);
    }

    #[test]
    fn account_roundtrips_through_rlp() {
        let account = AccountRecord {
            nonce: 7,
            balance: 2_000_000_000_000_000_000_000,
            storage_root: [3u8; 32],
            code_hash: [4u8; 32],
        };
        let encoded = account.rlp_encode();
        let decoded = AccountRecord::rlp_decode(&encoded).unwrap();
        assert_eq!(decoded, account);
    }

    #[test]
    fn blank_account_roundtrips() {
        let blank = AccountRecord::blank();
        let encoded = blank.rlp_encode();
        let decoded = AccountRecord::rlp_decode(&encoded).unwrap();
        assert!(decoded.is_blank());
    }

    #[test]
    fn rejects_wrong_field_count() {
        let mut s = RlpStream::new();
        s.begin_list(3);
        append_int(&mut s, 1);
        append_int(&mut s, 2);
        append_int(&mut s, 3);
        let bytes = s.out().to_vec();
        assert!(AccountRecord::rlp_decode(&bytes).is_err());
    }

    #[test]
    fn account_trie_key_is_raw_address_bytes() {
        let addr: Address = [0xAAu8; 20];
        assert_eq!(account_trie_key(&addr), addr.to_vec());
    }
}
