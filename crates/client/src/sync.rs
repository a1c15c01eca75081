//! Timeline reconstruction.
//!
//! The server history is authoritative for what was said and when, but the
//! local user's own messages in it are sealed for the peer and unreadable here.
//! [`merge_timeline`] combines it with the plaintext cache into one ordered,
//! render-ready sequence.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use parley_crypto::keys::PrivateKey;
use parley_crypto::policy::EncryptionPolicy;
use parley_shared::api::message::ServerMessage;
use parley_shared::conversation::ConversationKey;
use parley_shared::ids::Username;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::api::MessagingApi;
use crate::cache::{MessageCache, StoredMessage};
use crate::context::SessionContext;
use crate::error::ClientError;

/// Shown for a self-authored server message with no cached plaintext.
pub const SELF_ECHO_PLACEHOLDER: &str =
    "You sent an encrypted message that can only be read on the device it was sent from";

fn undecryptable_placeholder(sender: &str) -> String {
    format!("[Encrypted message from {sender} could not be decrypted]")
}

/// One render-ready timeline entry. Derived on every merge, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    /// The server payload this entry was derived from; `None` for cached entries.
    pub original_payload: Option<String>,
    pub timestamp: String,
    pub decrypted: bool,
    pub is_mine: bool,
}

impl DisplayMessage {
    pub fn from_stored(message: &StoredMessage, me: &Username) -> Self {
        Self {
            id: message.id.to_string(),
            sender: message.sender.to_string(),
            content: message.plaintext.clone(),
            original_payload: None,
            timestamp: message.timestamp.clone(),
            decrypted: true,
            is_mine: &message.sender == me,
        }
    }
}

/// Parse a timestamp as produced by this client or the Messaging API.
///
/// Naive forms carry no offset and are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(raw) {
        return Some(t.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.and_utc())
}

/// Stable id for a server message that did not come with one.
fn derived_id(message: &ServerMessage) -> String {
    let mut hasher = Sha256::new();
    for part in [
        &message.sender,
        &message.receiver,
        &message.timestamp,
        &message.content,
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("srv-{}", &digest[..32])
}

/// Pick the self-authored server messages that echo a cached entry.
///
/// Id matches are settled first. The rest pair up closest in time first, so a
/// message sent from another device cannot take the entry its neighbour echoes.
fn pair_self_echoes(
    local: &[StoredMessage],
    server: &[ServerMessage],
    me: &Username,
    policy: EncryptionPolicy,
    window: chrono::Duration,
) -> HashSet<usize> {
    let mut echoes = HashSet::new();
    let mut matched = vec![false; local.len()];
    let mut unpaired = Vec::new();

    for (i, message) in server.iter().enumerate() {
        if message.sender != me.as_str() {
            continue;
        }
        let by_id = message
            .id
            .as_ref()
            .and_then(|id| local.iter().position(|m| &m.id.to_string() == id));
        match by_id {
            Some(j) if !matched[j] => {
                matched[j] = true;
                echoes.insert(i);
            }
            Some(_) => {}
            None => unpaired.push(i),
        }
    }

    let local_times: Vec<_> = local.iter().map(|m| parse_timestamp(&m.timestamp)).collect();
    let mut candidates = Vec::new();
    for i in unpaired {
        let message = &server[i];
        let Some(server_time) = parse_timestamp(&message.timestamp) else {
            continue;
        };
        for (j, cached) in local.iter().enumerate() {
            if matched[j] || cached.receiver.as_str() != message.receiver {
                continue;
            }
            // Without encryption the payload is the text itself.
            if policy == EncryptionPolicy::None && cached.plaintext != message.content {
                continue;
            }
            let Some(cached_time) = local_times[j] else {
                continue;
            };
            let distance = (cached_time - server_time).abs();
            if distance <= window {
                candidates.push((distance, server_time, i, j));
            }
        }
    }

    candidates.sort();
    for (_, _, i, j) in candidates {
        if matched[j] || echoes.contains(&i) {
            continue;
        }
        matched[j] = true;
        echoes.insert(i);
    }
    echoes
}

/// Merge cached outgoing plaintext with the server history into one timeline
/// sorted by timestamp. Entries with unparseable timestamps go last; ties keep
/// their relative order.
///
/// Never fails: payloads that cannot be opened become placeholders.
pub fn merge_timeline(
    local: &[StoredMessage],
    server: &[ServerMessage],
    me: &Username,
    policy: EncryptionPolicy,
    private_key: Option<&PrivateKey>,
    self_echo_window: chrono::Duration,
) -> Vec<DisplayMessage> {
    let mut timeline: Vec<DisplayMessage> = local
        .iter()
        .map(|m| DisplayMessage::from_stored(m, me))
        .collect();

    let echoes = pair_self_echoes(local, server, me, policy, self_echo_window);

    // Ids are assigned oldest first so duplicate suffixes stay put as history grows.
    let mut server_order: Vec<usize> = (0..server.len()).collect();
    server_order.sort_by_key(|&i| {
        let t = parse_timestamp(&server[i].timestamp);
        (t.is_none(), t)
    });

    let mut seen_ids: HashSet<String> = timeline.iter().map(|m| m.id.clone()).collect();
    let mut derived = Vec::with_capacity(server.len());

    for i in server_order {
        let message = &server[i];
        let is_mine = message.sender == me.as_str();

        let (content, decrypted) = if is_mine {
            if echoes.contains(&i) {
                continue;
            }
            match policy {
                EncryptionPolicy::None => (message.content.clone(), true),
                EncryptionPolicy::RsaOaep => (SELF_ECHO_PLACEHOLDER.to_string(), false),
            }
        } else {
            match policy.open(&message.content, private_key) {
                Ok(text) => (text, true),
                Err(e) => {
                    tracing::debug!(sender = %message.sender, error = %e, "message could not be opened");
                    (undecryptable_placeholder(&message.sender), false)
                }
            }
        };

        let base_id = message.id.clone().unwrap_or_else(|| derived_id(message));
        let mut id = base_id.clone();
        let mut n = 1;
        while !seen_ids.insert(id.clone()) {
            n += 1;
            id = format!("{base_id}-{n}");
        }

        derived.push((
            i,
            DisplayMessage {
                id,
                sender: message.sender.clone(),
                content,
                original_payload: Some(message.content.clone()),
                timestamp: message.timestamp.clone(),
                decrypted,
                is_mine,
            },
        ));
    }

    // Restore server order so ties between server entries keep it.
    derived.sort_by_key(|(i, _)| *i);
    timeline.extend(derived.into_iter().map(|(_, m)| m));

    timeline.sort_by_cached_key(|m| {
        let t = parse_timestamp(&m.timestamp);
        (t.is_none(), t)
    });
    timeline
}

/// Produces the timeline of a conversation from the cache and the server.
pub struct ConversationSync {
    api: Arc<dyn MessagingApi>,
    cache: MessageCache,
    policy: EncryptionPolicy,
    self_echo_window: chrono::Duration,
}

impl ConversationSync {
    pub fn new(
        api: Arc<dyn MessagingApi>,
        cache: MessageCache,
        policy: EncryptionPolicy,
        self_echo_window: chrono::Duration,
    ) -> Self {
        Self {
            api,
            cache,
            policy,
            self_echo_window,
        }
    }

    pub fn policy(&self) -> EncryptionPolicy {
        self.policy
    }

    /// Build the timeline of `key` as seen by the session's user.
    ///
    /// Only a failed server fetch fails the merge. An unreadable cache is
    /// logged and treated as empty.
    pub async fn merge(
        &self,
        key: &ConversationKey,
        ctx: &SessionContext,
    ) -> Result<Vec<DisplayMessage>, ClientError> {
        let me = ctx.username();
        let peer = key.peer_of(me).ok_or_else(|| {
            ClientError::Validation(format!("{me} is not a participant of {key}"))
        })?;

        let local = self.cache.read_all(key).unwrap_or_else(|e| {
            tracing::warn!(conversation = %key, error = %e, "could not read message cache");
            Vec::new()
        });

        let server = self
            .api
            .fetch_messages(me, peer)
            .await
            .map_err(|e| ClientError::Fetch(e.to_string()))?;

        let timeline = merge_timeline(
            &local,
            &server,
            me,
            self.policy,
            ctx.private_key(),
            self.self_echo_window,
        );
        tracing::debug!(
            conversation = %key,
            cached = local.len(),
            fetched = server.len(),
            merged = timeline.len(),
            "merged conversation"
        );
        Ok(timeline)
    }
}
