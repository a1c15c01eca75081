use std::sync::Arc;

use parley_crypto::key_store::KeyStore;
use parley_crypto::storage::KvStore;
use parley_shared::api::auth::{LoginRequest, RegisterRequest};
use parley_shared::constants::LOGIN_SUCCESS_MESSAGE;
use parley_shared::ids::Username;

use crate::api::MessagingApi;
use crate::context::SessionContext;
use crate::error::ClientError;

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

fn require_fields(fields: &[&str]) -> Result<(), ClientError> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(ClientError::Validation("All fields are required".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AuthService
// ---------------------------------------------------------------------------

/// Registration, login and logout against the Messaging API.
pub struct AuthService {
    api: Arc<dyn MessagingApi>,
    store: Arc<dyn KvStore>,
    clear_keys_on_logout: bool,
}

impl AuthService {
    pub fn new(api: Arc<dyn MessagingApi>, store: Arc<dyn KvStore>, clear_keys_on_logout: bool) -> Self {
        Self {
            api,
            store,
            clear_keys_on_logout,
        }
    }

    /// Create an account with a fresh key pair and log into it.
    ///
    /// The private key is persisted only after the server accepted the
    /// registration, so a refused registration leaves nothing behind.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<SessionContext, ClientError> {
        require_fields(&[username, password, confirm_password])?;
        if password != confirm_password {
            return Err(ClientError::Validation("Passwords do not match".into()));
        }
        let username = Username::parse(username)?;

        let pair = tokio::task::spawn_blocking(KeyStore::generate)
            .await
            .map_err(|e| ClientError::KeyGeneration(format!("key generation task failed: {e}")))??;

        self.api
            .register(&RegisterRequest {
                username: username.to_string(),
                password: password.to_string(),
                public_key: pair.public_key.clone(),
            })
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        KeyStore::new(self.store.clone(), username.clone()).persist_private_key(&pair.private_key)?;
        tracing::info!(user = %username, "registered");
        SessionContext::open(self.store.clone(), username)
    }

    /// Log in with an existing account. Whatever key this device holds for the
    /// account is loaded; none at all is allowed.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionContext, ClientError> {
        require_fields(&[username, password])?;
        let username = Username::parse(username)?;

        let response = self
            .api
            .login(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        if response.message.as_deref() != Some(LOGIN_SUCCESS_MESSAGE) {
            let reason = response
                .error
                .unwrap_or_else(|| "Invalid username or password".into());
            tracing::warn!(user = %username, "login refused");
            return Err(ClientError::Auth(reason));
        }

        SessionContext::open(self.store.clone(), username)
    }

    pub fn logout(&self, context: SessionContext) -> Result<(), ClientError> {
        context.close(self.clear_keys_on_logout)
    }
}
