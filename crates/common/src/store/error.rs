//! Error types for the state store.

use crate::crypto::{CipherError, MasterKeyError};

/// Errors that can occur when opening or flushing the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem read/write failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key unwrap or payload authentication failed. The state file belongs
    /// to another machine or has been corrupted.
    #[error("integrity check failed: {0}")]
    Integrity(&'static str),

    /// Key derivation or RNG failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The state file is not a valid durable record
    #[error("malformed state file: {0}")]
    Format(String),

    /// A value could not be (de)serialized
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, StoreError::Integrity(_))
    }
}

impl From<CipherError> for StoreError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Integrity(reason) => StoreError::Integrity(reason),
            CipherError::Rng(e) => StoreError::Crypto(e.to_string()),
        }
    }
}

impl From<MasterKeyError> for StoreError {
    fn from(err: MasterKeyError) -> Self {
        match err {
            MasterKeyError::Cipher(e) => e.into(),
            MasterKeyError::Derivation(msg) => StoreError::Crypto(msg),
            MasterKeyError::Rng(e) => StoreError::Crypto(e.to_string()),
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
