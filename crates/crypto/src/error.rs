//! Error types for the parley-crypto crate.

use thiserror::Error;

/// Errors that can occur during key handling, sealing, and local storage.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key pair could not be generated. Fatal to registration.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The plaintext could not be sealed for the recipient (bad key, oversized message).
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The payload could not be opened (absent key, wrong recipient, corrupt ciphertext).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The provided key material is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Local key-value storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for CryptoError {
    fn from(err: rusqlite::Error) -> Self {
        CryptoError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        CryptoError::InvalidKey(format!("invalid base64: {err}"))
    }
}
