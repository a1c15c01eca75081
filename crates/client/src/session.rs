//! The active conversation: optimistic sends and a continuously merged timeline.
//!
//! A send goes through two phases. The message is first applied locally
//! (cache and timeline), then submitted; if submission fails, the local
//! effect is compensated and the failure is reported in the [`SendOutcome`].
//!
//! Every timeline load is tagged with the generation of the conversation it
//! was started for. Opening another conversation bumps the generation, so a
//! load that completes afterwards is discarded instead of being applied to
//! the wrong conversation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use parley_crypto::policy::EncryptionPolicy;
use parley_shared::api::message::SendMessageRequest;
use parley_shared::conversation::ConversationKey;
use parley_shared::ids::Username;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::MessagingApi;
use crate::cache::{MessageCache, StoredMessage};
use crate::context::SessionContext;
use crate::error::ClientError;
use crate::sync::{ConversationSync, DisplayMessage};

/// What the watch channel publishes: the open conversation and its messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    pub conversation: Option<ConversationKey>,
    pub messages: Vec<DisplayMessage>,
}

/// Result of [`MessageSession::send`].
///
/// `applied` means the message was stored locally and shown; `confirmed`
/// means the server accepted it. Applied but unconfirmed messages have been
/// rolled back by the time the outcome is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub message: Option<DisplayMessage>,
    pub applied: bool,
    pub confirmed: bool,
    pub error: Option<ClientError>,
}

impl SendOutcome {
    fn skipped() -> Self {
        Self {
            message: None,
            applied: false,
            confirmed: false,
            error: None,
        }
    }

    fn not_applied(error: ClientError) -> Self {
        Self {
            message: None,
            applied: false,
            confirmed: false,
            error: Some(error),
        }
    }

    /// The confirmed message, `None` if there was nothing to send, or the error.
    pub fn into_result(self) -> Result<Option<DisplayMessage>, ClientError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.message),
        }
    }
}

/// Stops its poll task when stopped or dropped.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Inner {
    ctx: Arc<SessionContext>,
    api: Arc<dyn MessagingApi>,
    cache: MessageCache,
    sync: ConversationSync,
    /// Guards switches of the active conversation together with `generation`.
    active: Mutex<Option<ConversationKey>>,
    generation: AtomicU64,
    timeline: watch::Sender<Timeline>,
    send_locks: DashMap<ConversationKey, Arc<tokio::sync::Mutex<()>>>,
    /// Optimistic entries whose submission has not completed yet.
    pending: Mutex<Vec<(ConversationKey, DisplayMessage)>>,
    /// Ids removed by rollback; a merge that read the cache earlier must not bring them back.
    /// Emptied whenever the active conversation changes, which invalidates every such merge.
    rolled_back: Mutex<HashSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct MessageSession {
    inner: Arc<Inner>,
}

impl MessageSession {
    pub fn new(
        ctx: Arc<SessionContext>,
        api: Arc<dyn MessagingApi>,
        policy: EncryptionPolicy,
        self_echo_window: chrono::Duration,
    ) -> Self {
        let cache = MessageCache::new(ctx.store().clone());
        let sync = ConversationSync::new(api.clone(), cache.clone(), policy, self_echo_window);
        let (timeline, _) = watch::channel(Timeline::default());
        Self {
            inner: Arc::new(Inner {
                ctx,
                api,
                cache,
                sync,
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
                timeline,
                send_locks: DashMap::new(),
                pending: Mutex::new(Vec::new()),
                rolled_back: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn me(&self) -> &Username {
        self.inner.ctx.username()
    }

    pub fn active_conversation(&self) -> Option<ConversationKey> {
        lock(&self.inner.active).clone()
    }

    /// Snapshot of the active conversation's timeline.
    pub fn timeline(&self) -> Vec<DisplayMessage> {
        self.inner.timeline.borrow().messages.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Timeline> {
        self.inner.timeline.subscribe()
    }

    /// Everyone the local user has a conversation with, in server order.
    pub async fn partners(&self) -> Result<Vec<Username>, ClientError> {
        let me = self.me();
        let raw = self
            .inner
            .api
            .fetch_partners(me)
            .await
            .map_err(|e| ClientError::Fetch(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut partners = Vec::with_capacity(raw.len());
        for name in raw {
            match Username::parse(name.as_str()) {
                Ok(user) if &user != me => {
                    if seen.insert(user.clone()) {
                        partners.push(user);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "skipping malformed partner name"),
            }
        }
        Ok(partners)
    }

    /// Make the conversation with `peer` the active one and load it.
    ///
    /// Switching conversations discards any load still in flight for the
    /// previous one and ends its poll. Reopening the active conversation is a
    /// plain refresh.
    pub async fn open(&self, peer: &Username) -> Result<Vec<DisplayMessage>, ClientError> {
        let key = ConversationKey::new(self.me(), peer);
        let generation = {
            let mut active = lock(&self.inner.active);
            if active.as_ref() != Some(&key) {
                *active = Some(key.clone());
                lock(&self.inner.rolled_back).clear();
                self.inner.timeline.send_replace(Timeline {
                    conversation: Some(key.clone()),
                    messages: Vec::new(),
                });
                tracing::info!(conversation = %key, "opened conversation");
                self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
            } else {
                self.inner.generation.load(Ordering::SeqCst)
            }
        };
        self.load(key, generation).await
    }

    /// Re-merge the active conversation.
    pub async fn refresh(&self) -> Result<Vec<DisplayMessage>, ClientError> {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.refresh_generation(generation).await
    }

    async fn refresh_generation(&self, generation: u64) -> Result<Vec<DisplayMessage>, ClientError> {
        let key = {
            let active = lock(&self.inner.active);
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return Err(ClientError::StaleConversation);
            }
            active.clone().ok_or(ClientError::NoActiveConversation)?
        };
        self.load(key, generation).await
    }

    async fn load(
        &self,
        key: ConversationKey,
        generation: u64,
    ) -> Result<Vec<DisplayMessage>, ClientError> {
        let result = self.inner.sync.merge(&key, &self.inner.ctx).await;

        let _active = lock(&self.inner.active);
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(conversation = %key, "discarding stale merge");
            return Err(ClientError::StaleConversation);
        }
        // On failure the previous timeline stays as it is.
        let mut messages = result?;

        {
            let rolled_back = lock(&self.inner.rolled_back);
            messages.retain(|m| !rolled_back.contains(&m.id));
        }
        for (pending_key, message) in lock(&self.inner.pending).iter() {
            if pending_key == &key && !messages.iter().any(|m| m.id == message.id) {
                messages.push(message.clone());
            }
        }

        self.inner.timeline.send_replace(Timeline {
            conversation: Some(key),
            messages: messages.clone(),
        });
        Ok(messages)
    }

    /// Send `plaintext` to `peer`.
    ///
    /// Empty or whitespace-only text is ignored. Sends to the same
    /// conversation are serialized; the text is sent as typed.
    pub async fn send(&self, peer: &Username, plaintext: &str) -> SendOutcome {
        if plaintext.trim().is_empty() {
            return SendOutcome::skipped();
        }
        let me = self.me().clone();
        let key = ConversationKey::new(&me, peer);

        let send_lock = self
            .inner
            .send_locks
            .entry(key.clone())
            .or_default()
            .value()
            .clone();
        let _serialized = send_lock.lock().await;

        // Phase 1: apply locally.
        let stored = StoredMessage::compose(me.clone(), peer.clone(), plaintext);
        if let Err(e) = self.inner.cache.append(&key, stored.clone()) {
            tracing::error!(conversation = %key, error = %e, "could not cache outgoing message");
            return SendOutcome::not_applied(e);
        }
        let display = DisplayMessage::from_stored(&stored, &me);
        lock(&self.inner.pending).push((key.clone(), display.clone()));
        self.publish_if_active(&key, |messages| messages.push(display.clone()));

        // Phase 2: seal and submit, or compensate.
        let result = self.submit(&key, peer, plaintext).await;
        lock(&self.inner.pending).retain(|(_, m)| m.id != display.id);

        match result {
            Ok(()) => {
                tracing::info!(conversation = %key, "message sent");
                SendOutcome {
                    message: Some(display),
                    applied: true,
                    confirmed: true,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(conversation = %key, error = %e, "send failed; rolling back");
                self.roll_back(&key, &stored);
                SendOutcome {
                    message: Some(display),
                    applied: true,
                    confirmed: false,
                    error: Some(e),
                }
            }
        }
    }

    async fn submit(
        &self,
        key: &ConversationKey,
        peer: &Username,
        plaintext: &str,
    ) -> Result<(), ClientError> {
        let policy = self.inner.sync.policy();
        if let Some(max) = policy.max_plaintext_len() {
            if plaintext.len() > max {
                return Err(ClientError::Encryption(format!(
                    "message is {} bytes; at most {max} bytes can be encrypted",
                    plaintext.len()
                )));
            }
        }

        let peer_key = if policy.requires_peer_key() {
            let fetched = self
                .inner
                .api
                .fetch_public_key(peer)
                .await
                .map_err(|e| ClientError::Send(e.to_string()))?;
            match fetched {
                Some(k) => Some(k),
                None => {
                    return Err(ClientError::Encryption(format!(
                        "{peer} has no registered public key"
                    )))
                }
            }
        } else {
            None
        };

        let payload = policy.seal(plaintext, peer_key.as_deref())?;
        tracing::debug!(conversation = %key, %policy, "submitting message");

        self.inner
            .api
            .send_message(&SendMessageRequest {
                sender: self.me().to_string(),
                receiver: peer.to_string(),
                message: payload,
            })
            .await
            .map_err(|e| ClientError::Send(e.to_string()))?;
        Ok(())
    }

    fn roll_back(&self, key: &ConversationKey, stored: &StoredMessage) {
        let id = stored.id.to_string();
        {
            // Held across the cache write so a conversation switch cannot clear
            // the id while the entry is still readable.
            let mut rolled_back = lock(&self.inner.rolled_back);
            rolled_back.insert(id.clone());
            if let Err(e) = self.inner.cache.remove(key, stored.id) {
                tracing::error!(conversation = %key, error = %e, "could not remove rolled back message from cache");
            }
        }
        self.publish_if_active(key, |messages| messages.retain(|m| m.id != id));
    }

    fn publish_if_active(&self, key: &ConversationKey, edit: impl FnOnce(&mut Vec<DisplayMessage>)) {
        let _active = lock(&self.inner.active);
        self.inner.timeline.send_if_modified(|timeline| {
            if timeline.conversation.as_ref() != Some(key) {
                return false;
            }
            edit(&mut timeline.messages);
            true
        });
    }

    /// Refresh the active conversation every `interval` until the
    /// conversation changes or the handle is dropped.
    pub fn start_polling(&self, interval: Duration) -> PollHandle {
        let session = self.clone();
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the caller has just loaded.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match session.refresh_generation(generation).await {
                    Ok(_) => {}
                    Err(ClientError::StaleConversation | ClientError::NoActiveConversation) => {
                        tracing::debug!("conversation changed; polling stopped");
                        break;
                    }
                    Err(e) => tracing::warn!(error = %e, "poll failed"),
                }
            }
        });
        PollHandle { task }
    }

    /// Leave the active conversation. In-flight loads and polls are discarded.
    pub fn close(&self) {
        let mut active = lock(&self.inner.active);
        if let Some(key) = active.take() {
            tracing::info!(conversation = %key, "closed conversation");
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.rolled_back).clear();
        self.inner.timeline.send_replace(Timeline::default());
    }
}
