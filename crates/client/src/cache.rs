//! Local plaintext log of outgoing messages, one per conversation.
//!
//! The server only ever holds outgoing messages sealed for the peer, so this
//! cache is the sender's sole source for their own text. It lives on this
//! device only.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parley_crypto::storage::{conversation_entry, KvStore};
use parley_shared::conversation::ConversationKey;
use parley_shared::ids::{MessageId, Username};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender: Username,
    pub receiver: Username,
    pub plaintext: String,
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
}

impl StoredMessage {
    /// A new outgoing message stamped with the current time.
    pub fn compose(sender: Username, receiver: Username, plaintext: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            receiver,
            plaintext: plaintext.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Clone)]
pub struct MessageCache {
    store: Arc<dyn KvStore>,
}

impl MessageCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Append `message` unless an entry with the same id is already present.
    /// Returns whether anything was written.
    pub fn append(&self, key: &ConversationKey, message: StoredMessage) -> Result<bool, ClientError> {
        let mut entries = self.read_all(key)?;
        if entries.iter().any(|m| m.id == message.id) {
            return Ok(false);
        }
        entries.push(message);
        self.write(key, &entries)?;
        Ok(true)
    }

    /// Every cached message of the conversation, in insertion order.
    pub fn read_all(&self, key: &ConversationKey) -> Result<Vec<StoredMessage>, ClientError> {
        match self.store.get(&conversation_entry(key))? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Drop the entry with `id`. Returns whether it was present.
    pub fn remove(&self, key: &ConversationKey, id: MessageId) -> Result<bool, ClientError> {
        let mut entries = self.read_all(key)?;
        let before = entries.len();
        entries.retain(|m| m.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        if entries.is_empty() {
            self.store.remove(&conversation_entry(key))?;
        } else {
            self.write(key, &entries)?;
        }
        Ok(true)
    }

    fn write(&self, key: &ConversationKey, entries: &[StoredMessage]) -> Result<(), ClientError> {
        let raw = serde_json::to_string(entries)?;
        self.store.set(&conversation_entry(key), &raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::user;
    use parley_crypto::storage::{MemoryStore, SqliteStore};

    fn conversation() -> ConversationKey {
        ConversationKey::new(&user("alice"), &user("bob"))
    }

    fn msg(text: &str) -> StoredMessage {
        StoredMessage::compose(user("alice"), user("bob"), text)
    }

    #[test]
    fn read_all_is_empty_for_unknown_conversation() {
        let cache = MessageCache::new(Arc::new(MemoryStore::new()));
        assert!(cache.read_all(&conversation()).unwrap().is_empty());
    }

    #[test]
    fn append_preserves_insertion_order() {
        let cache = MessageCache::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let key = conversation();
        for text in ["one", "two", "three"] {
            assert!(cache.append(&key, msg(text)).unwrap());
        }
        let texts: Vec<_> = cache
            .read_all(&key)
            .unwrap()
            .into_iter()
            .map(|m| m.plaintext)
            .collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn append_is_idempotent_by_id() {
        let cache = MessageCache::new(Arc::new(MemoryStore::new()));
        let key = conversation();
        let m = msg("hello");
        assert!(cache.append(&key, m.clone()).unwrap());
        assert!(!cache.append(&key, m).unwrap());
        assert_eq!(cache.read_all(&key).unwrap().len(), 1);
    }

    #[test]
    fn conversation_key_is_unordered() {
        let cache = MessageCache::new(Arc::new(MemoryStore::new()));
        cache
            .append(&ConversationKey::new(&user("bob"), &user("alice")), msg("hi"))
            .unwrap();
        assert_eq!(cache.read_all(&conversation()).unwrap().len(), 1);
    }

    #[test]
    fn remove_drops_only_the_target() {
        let backing = Arc::new(MemoryStore::new());
        let cache = MessageCache::new(backing.clone());
        let key = conversation();
        let keep = msg("keep");
        let drop = msg("drop");
        cache.append(&key, keep.clone()).unwrap();
        cache.append(&key, drop.clone()).unwrap();

        assert!(cache.remove(&key, drop.id).unwrap());
        assert!(!cache.remove(&key, drop.id).unwrap());
        assert_eq!(cache.read_all(&key).unwrap(), vec![keep.clone()]);

        cache.remove(&key, keep.id).unwrap();
        assert!(backing.is_empty());
    }

    #[test]
    fn corrupt_entry_is_storage_error() {
        let backing = Arc::new(MemoryStore::new());
        backing.set(&conversation_entry(&conversation()), "{not json").unwrap();
        let cache = MessageCache::new(backing);
        assert!(matches!(
            cache.read_all(&conversation()),
            Err(ClientError::Storage(_))
        ));
    }

    #[test]
    fn compose_stamps_rfc3339_millis() {
        let m = msg("x");
        assert!(m.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&m.timestamp).is_ok());
        assert_eq!(m.timestamp.len(), "2024-01-01T00:00:00.000Z".len());
    }
}
