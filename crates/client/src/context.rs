//! The logged-in identity.
//!
//! A [`SessionContext`] is built once at login or registration and handed to
//! every component that needs to know who "me" is. It is torn down by
//! [`SessionContext::close`].

use std::sync::Arc;

use parley_crypto::key_store::KeyStore;
use parley_crypto::keys::PrivateKey;
use parley_crypto::storage::{KvStore, CURRENT_USER_KEY};
use parley_shared::ids::Username;

use crate::error::ClientError;

pub struct SessionContext {
    username: Username,
    key_store: KeyStore,
    private_key: Option<PrivateKey>,
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("username", &self.username)
            .field("has_private_key", &self.private_key.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Record `username` as the current user and load its private key, if this
    /// device has one.
    pub fn open(store: Arc<dyn KvStore>, username: Username) -> Result<Self, ClientError> {
        store.set(CURRENT_USER_KEY, username.as_str())?;
        let key_store = KeyStore::new(store.clone(), username.clone());
        let private_key = key_store.load_private_key()?;
        if private_key.is_none() {
            tracing::warn!(
                user = %username,
                "no private key on this device; incoming encrypted messages will not be readable"
            );
        }
        tracing::info!(user = %username, "session opened");
        Ok(Self {
            username,
            key_store,
            private_key,
            store,
        })
    }

    /// Rebuild the session of whoever was logged in last, or `None`.
    pub fn resume(store: Arc<dyn KvStore>) -> Result<Option<Self>, ClientError> {
        let Some(raw) = store.get(CURRENT_USER_KEY)? else {
            return Ok(None);
        };
        let username = match Username::parse(raw) {
            Ok(username) => username,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable current user entry");
                store.remove(CURRENT_USER_KEY)?;
                return Ok(None);
            }
        };
        Self::open(store, username).map(Some)
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// End the session. Conversation caches are kept either way.
    pub fn close(self, clear_keys: bool) -> Result<(), ClientError> {
        self.store.remove(CURRENT_USER_KEY)?;
        if clear_keys {
            self.key_store.clear()?;
        }
        tracing::info!(user = %self.username, clear_keys, "session closed");
        Ok(())
    }
}
