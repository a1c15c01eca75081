//! In-memory Messaging API used by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use parley_crypto::keys::{generate_key_pair, KeyPair};
use parley_shared::api::auth::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use parley_shared::api::message::{SendMessageRequest, SendMessageResponse, ServerMessage};
use parley_shared::constants::LOGIN_SUCCESS_MESSAGE;
use parley_shared::ids::Username;

use crate::api::{ApiError, MessagingApi};

/// Two real key pairs, generated once per test binary.
pub(crate) fn key_pairs() -> &'static (KeyPair, KeyPair) {
    static PAIRS: OnceLock<(KeyPair, KeyPair)> = OnceLock::new();
    PAIRS.get_or_init(|| (generate_key_pair().unwrap(), generate_key_pair().unwrap()))
}

pub(crate) fn user(name: &str) -> Username {
    Username::parse(name).unwrap()
}

#[derive(Default)]
pub(crate) struct FakeApi {
    users: Mutex<HashMap<String, (String, String)>>,
    messages: Mutex<Vec<ServerMessage>>,
    pub fail_sends: AtomicBool,
    pub fail_fetches: AtomicBool,
    pub fetches: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account directly, bypassing the HTTP surface.
    pub fn add_user(&self, username: &str, password: &str, public_key: &str) {
        self.users.lock().unwrap().insert(
            username.to_string(),
            (password.to_string(), public_key.to_string()),
        );
    }

    pub fn public_key_of(&self, username: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .get(username)
            .map(|(_, key)| key.clone())
    }

    /// Store a message as if another client had sent it.
    pub fn push(&self, sender: &str, receiver: &str, content: &str, timestamp: &str) {
        self.messages.lock().unwrap().push(ServerMessage {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            content: content.to_string(),
            timestamp: timestamp.to_string(),
            id: None,
        });
    }

    pub fn stored(&self) -> Vec<ServerMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingApi for FakeApi {
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&request.username) {
            return Err(ApiError::Status {
                status: 409,
                message: "Username already exists".into(),
            });
        }
        users.insert(
            request.username.clone(),
            (request.password.clone(), request.public_key.clone()),
        );
        Ok(RegisterResponse {
            registration_status: Some("Registration successful".into()),
        })
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let users = self.users.lock().unwrap();
        match users.get(&request.username) {
            Some((password, _)) if *password == request.password => Ok(LoginResponse {
                message: Some(LOGIN_SUCCESS_MESSAGE.into()),
                error: None,
            }),
            _ => Err(ApiError::Status {
                status: 401,
                message: "Invalid username or password".into(),
            }),
        }
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                message: "failed to send message (HTTP 500 Internal Server Error)".into(),
            });
        }
        let timestamp = chrono::Utc::now()
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string();
        self.push(&request.sender, &request.receiver, &request.message, &timestamp);
        Ok(SendMessageResponse {
            status: Some("Message sent".into()),
            error: None,
        })
    }

    async fn fetch_messages(
        &self,
        username: &Username,
        partner: &Username,
    ) -> Result<Vec<ServerMessage>, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("could not connect to server".into()));
        }
        let (me, peer) = (username.as_str(), partner.as_str());
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                (m.sender == me && m.receiver == peer) || (m.sender == peer && m.receiver == me)
            })
            .cloned()
            .collect())
    }

    async fn fetch_partners(&self, username: &Username) -> Result<Vec<String>, ApiError> {
        let me = username.as_str();
        let mut partners = Vec::new();
        for m in self.messages.lock().unwrap().iter() {
            let other = if m.sender == me {
                &m.receiver
            } else if m.receiver == me {
                &m.sender
            } else {
                continue;
            };
            partners.push(other.clone());
        }
        Ok(partners)
    }

    async fn fetch_public_key(&self, username: &Username) -> Result<Option<String>, ApiError> {
        Ok(self.public_key_of(username.as_str()))
    }
}
