//! Request/response bodies of the Messaging API.

pub mod auth;
pub mod message;
pub mod user;

use serde::{Deserialize, Serialize};

/// Error body returned by the API on non-success responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
