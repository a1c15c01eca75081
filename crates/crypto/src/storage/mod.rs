//! Device-local key-value storage.
//!
//! Everything the client keeps on disk (the private key, the current user, the
//! per-conversation plaintext caches) is a string value under a scoped key.
//! Nothing here expires; callers remove entries explicitly.

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use parley_shared::conversation::ConversationKey;
use parley_shared::ids::Username;

use crate::error::CryptoError;

/// Scoped get/set/remove of string values.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CryptoError>;

    /// Insert or overwrite.
    fn set(&self, key: &str, value: &str) -> Result<(), CryptoError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), CryptoError>;

    /// Remove every key starting with `prefix`, returning how many were removed.
    fn remove_prefix(&self, prefix: &str) -> Result<usize, CryptoError>;
}

/// Key under which the logged-in username is remembered.
pub const CURRENT_USER_KEY: &str = "session:current_user";

/// Key under which `user`'s private key is stored on this device.
pub fn private_key_entry(user: &Username) -> String {
    format!("identity:{user}:private_key")
}

/// Prefix of every entry scoped to `user`'s identity.
pub fn identity_prefix(user: &Username) -> String {
    format!("identity:{user}:")
}

/// Key under which the plaintext cache of a conversation is stored.
pub fn conversation_entry(key: &ConversationKey) -> String {
    format!("conversation:{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_scoped() {
        let alice = Username::parse("alice").unwrap();
        let bob = Username::parse("bob").unwrap();
        assert_eq!(private_key_entry(&alice), "identity:alice:private_key");
        assert!(private_key_entry(&alice).starts_with(&identity_prefix(&alice)));
        assert_eq!(
            conversation_entry(&ConversationKey::new(&bob, &alice)),
            "conversation:alice:bob"
        );
    }

    #[test]
    fn identity_prefix_does_not_cover_similar_names() {
        let al = Username::parse("al").unwrap();
        let alice = Username::parse("alice").unwrap();
        assert!(!private_key_entry(&alice).starts_with(&identity_prefix(&al)));
    }
}
