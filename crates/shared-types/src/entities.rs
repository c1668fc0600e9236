//! # Core Domain Entities
//!
//! Primitive types shared by every crate in the workspace: addresses,
//! hashes, and the handful of small value types that cross crate
//! boundaries without needing a full codec of their own.

/// A 32-byte hash (Keccak-256 throughout this workspace).
pub type Hash = [u8; 32];

/// A 20-byte account address.
pub type Address = [u8; 20];

/// The Keccak-256 hash of the RLP encoding of the empty string, i.e. the
/// root hash of an empty trie. Used as the default `storage_root` for a
/// blank account and as the initial transaction-list root of a block
/// with no transactions.
pub const EMPTY_TRIE_ROOT: Hash = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];

/// The Keccak-256 hash of the empty byte string. Used as `code_hash` for
/// an account with no associated code.
pub const EMPTY_CODE_HASH: Hash = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
];
