//! Conversation addressing.
//!
//! A direct-message conversation is identified by the unordered pair of its two
//! participants, so both sides derive the same key regardless of who is "me".

use serde::{Deserialize, Serialize};

use crate::ids::Username;

/// Canonical, order-independent key for the conversation between two users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    low: Username,
    high: Username,
}

impl ConversationKey {
    pub fn new(a: &Username, b: &Username) -> Self {
        if a <= b {
            Self {
                low: a.clone(),
                high: b.clone(),
            }
        } else {
            Self {
                low: b.clone(),
                high: a.clone(),
            }
        }
    }

    /// The participant that is not `me`. Returns `None` if `me` is not part of
    /// the conversation. In a self-conversation the peer is `me`.
    pub fn peer_of(&self, me: &Username) -> Option<&Username> {
        if &self.low == me {
            Some(&self.high)
        } else if &self.high == me {
            Some(&self.low)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}
