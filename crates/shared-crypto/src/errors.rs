//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Input could not be hashed into the expected fixed-length digest.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
