//! # Keccak-256 Hashing
//!
//! The single hash function used throughout the chain: block headers,
//! account records, trie nodes, and the PoW check all hash with
//! Keccak-256 (not the later NIST SHA3-256 variant — the padding differs).

use sha3::{Digest, Keccak256};

/// Keccak-256 digest output.
pub type Hash = [u8; 32];

/// Hash a single input.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash the concatenation of several inputs without allocating an
/// intermediate buffer.
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_empty_input_to_known_value() {
        let h = keccak256(b"");
        assert_eq!(
            hex::encode(h),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a47"
        );
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(keccak256(b"test"), keccak256(b"test"));
    }

    #[test]
    fn differs_on_different_input() {
        assert_ne!(keccak256(b"a"), keccak256(b"b"));
    }

    #[test]
    fn concat_matches_manual_concatenation() {
        let manual = keccak256(b"helloworld");
        let concat = keccak256_concat(&[b"hello", b"world"]);
        assert_eq!(manual, concat);
    }
}
