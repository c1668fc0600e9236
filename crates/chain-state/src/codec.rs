//! # Canonical codec (C1)
//!
//! The chain's byte layout is normatively fixed: every header field,
//! account field, and trie node hashes to the same bytes on every node
//! that implements this spec, or the PoW check and the authenticated
//! tries it feeds become meaningless. We get the *generic* recursive
//! byte-string/list framing from the external [`rlp`] crate and add
//! only the chain's five semantic field types on top of it:
//!
//! - `int`  — a non-negative integer, encoded as its shortest
//!   big-endian byte representation (zero encodes as the empty string).
//! - `bin`  — an arbitrary byte string, encoded as-is.
//! - `addr` — a 20-byte account address, always encoded at full width.
//! - `trie_root` / `hash` — a 32-byte digest, always encoded at full
//!   width.
//!
//! None of these add framing of their own; they are all RLP byte
//! strings and differ only in how the numeric/digest value in Rust maps
//! to that byte string.

use crate::errors::StateError;
use rlp::{Rlp, RlpStream};
use shared_types::{Address, Hash};

/// Append an `int` field: the value's shortest big-endian encoding,
/// with leading zero bytes stripped (zero itself becomes an empty
/// string, matching the original chain's `encode_int`).
pub fn append_int(stream: &mut RlpStream, value: u128) {
    let bytes = value.to_be_bytes();
    let trimmed = match bytes.iter().position(|&b| b != 0) {
        Some(idx) => &bytes[idx..],
        None => &bytes[bytes.len()..],
    };
    stream.append(&trimmed);
}

/// Decode an `int` field back into a `u128`. Rejects encodings longer
/// than 16 bytes since they cannot round-trip through `u128`.
pub fn decode_int(rlp: &Rlp) -> Result<u128, StateError> {
    let bytes: Vec<u8> = rlp
        .data()
        .map_err(|e| StateError::MalformedEncoding(e.to_string()))?
        .to_vec();
    if bytes.len() > 16 {
        return Err(StateError::MalformedEncoding(format!(
            "int field {} bytes wide, exceeds u128",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(&bytes);
    Ok(u128::from_be_bytes(buf))
}

/// Append a `bin` field: an arbitrary byte string, verbatim.
pub fn append_bin(stream: &mut RlpStream, value: &[u8]) {
    stream.append(&value);
}

/// Decode a `bin` field.
pub fn decode_bin(rlp: &Rlp) -> Result<Vec<u8>, StateError> {
    rlp.data()
        .map(|d| d.to_vec())
        .map_err(|e| StateError::MalformedEncoding(e.to_string()))
}

/// Append an `addr` field: exactly 20 bytes, never trimmed.
pub fn append_addr(stream: &mut RlpStream, value: &Address) {
    stream.append(&value.as_slice());
}

/// Decode an `addr` field, rejecting anything not exactly 20 bytes.
pub fn decode_addr(rlp: &Rlp) -> Result<Address, StateError> {
    let bytes = rlp
        .data()
        .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| StateError::MalformedEncoding(format!("addr field {} bytes, want 20", bytes.len())))
}

/// Append a `hash` / `trie_root` field: exactly 32 bytes, never
/// trimmed (the two semantic names share one encoding).
pub fn append_hash(stream: &mut RlpStream, value: &Hash) {
    stream.append(&value.as_slice());
}

/// Decode a `hash` / `trie_root` field, rejecting anything not exactly
/// 32 bytes.
pub fn decode_hash(rlp: &Rlp) -> Result<Hash, StateError> {
    let bytes = rlp
        .data()
        .map_err(|e| StateError::MalformedEncoding(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| StateError::MalformedEncoding(format!("hash field {} bytes, want 32", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_zero_encodes_as_empty_string() {
        let mut s = RlpStream::new();
        append_int(&mut s, 0);
        let out = s.out();
        let rlp = Rlp::new(&out);
        assert_eq!(decode_int(&rlp).unwrap(), 0);
    }

    #[test]
    fn int_roundtrips_large_value() {
        let mut s = RlpStream::new();
        append_int(&mut s, 1_500_000_000_000_000_000u128);
        let out = s.out();
        let rlp = Rlp::new(&out);
        assert_eq!(decode_int(&rlp).unwrap(), 1_500_000_000_000_000_000u128);
    }

    #[test]
    fn addr_rejects_wrong_length() {
        let mut s = RlpStream::new();
        s.append(&vec![1u8, 2, 3].as_slice());
        let out = s.out();
        let rlp = Rlp::new(&out);
        assert!(decode_addr(&rlp).is_err());
    }

    #[test]
    fn hash_roundtrips() {
        let h: Hash = [7u8; 32];
        let mut s = RlpStream::new();
        append_hash(&mut s, &h);
        let out = s.out();
        let rlp = Rlp::new(&out);
        assert_eq!(decode_hash(&rlp).unwrap(), h);
    }
}
