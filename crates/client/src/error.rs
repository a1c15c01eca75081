//! Error types for the parley-client crate.

use parley_crypto::error::CryptoError;
use thiserror::Error;

/// Errors surfaced to callers of the client. Collaborator failures (HTTP,
/// storage, crypto) are converted into one of these at the component boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No key pair could be generated; registration cannot proceed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// A message could not be sealed for its recipient and was not submitted.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// A payload could not be opened. Degraded to a placeholder during sync.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The server history could not be fetched. Retryable.
    #[error("could not load messages: {0}")]
    Fetch(String),

    /// The server rejected or never received a message. Retryable.
    #[error("could not send message: {0}")]
    Send(String),

    #[error("{0}")]
    Validation(String),

    /// Registration or login was refused.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("local storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The conversation changed while a load was in flight; its result was discarded.
    #[error("conversation changed before the result arrived")]
    StaleConversation,

    #[error("no conversation is open")]
    NoActiveConversation,
}

impl ClientError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Fetch(_) | ClientError::Send(_))
    }
}

impl From<CryptoError> for ClientError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyGeneration(msg) => ClientError::KeyGeneration(msg),
            CryptoError::Encryption(msg) => ClientError::Encryption(msg),
            CryptoError::Decryption(msg) => ClientError::Decryption(msg),
            CryptoError::InvalidKey(msg) => ClientError::Validation(format!("invalid key: {msg}")),
            CryptoError::Storage(msg) | CryptoError::Serialization(msg) => {
                ClientError::Storage(msg)
            }
        }
    }
}

impl From<parley_shared::error::ParleyError> for ClientError {
    fn from(err: parley_shared::error::ParleyError) -> Self {
        let parley_shared::error::ParleyError::Validation(msg) = err;
        ClientError::Validation(msg)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Storage(format!("corrupt cache entry: {err}"))
    }
}
