//! Per-identity private key persistence.
//!
//! The private key is stored only on this device, scoped to the identity that
//! owns it. Absence is a normal state (accounts registered elsewhere, fresh
//! devices) and is reported as `Ok(None)`, never as an error.

use std::sync::Arc;

use parley_shared::ids::Username;

use crate::error::CryptoError;
use crate::keys::{self, KeyPair, PrivateKey};
use crate::storage::{identity_prefix, private_key_entry, KvStore};

#[derive(Clone)]
pub struct KeyStore {
    store: Arc<dyn KvStore>,
    owner: Username,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    pub fn new(store: Arc<dyn KvStore>, owner: Username) -> Self {
        Self { store, owner }
    }

    /// Generate a new identity key pair. Nothing is persisted.
    pub fn generate() -> Result<KeyPair, CryptoError> {
        keys::generate_key_pair()
    }

    /// Store the private key for this identity, replacing any previous one.
    pub fn persist_private_key(&self, key: &PrivateKey) -> Result<(), CryptoError> {
        self.store
            .set(&private_key_entry(&self.owner), key.as_base64())?;
        tracing::info!(user = %self.owner, "persisted private key");
        Ok(())
    }

    pub fn load_private_key(&self) -> Result<Option<PrivateKey>, CryptoError> {
        Ok(self
            .store
            .get(&private_key_entry(&self.owner))?
            .map(PrivateKey::from_base64))
    }

    /// The public key matching the stored private key, if there is one.
    pub fn public_key(&self) -> Result<Option<String>, CryptoError> {
        self.load_private_key()?
            .map(|key| keys::public_key_from_private(&key))
            .transpose()
    }

    /// Erase every key entry of this identity.
    pub fn clear(&self) -> Result<(), CryptoError> {
        let removed = self.store.remove_prefix(&identity_prefix(&self.owner))?;
        tracing::info!(user = %self.owner, removed, "cleared identity key material");
        Ok(())
    }
}
