//! End-to-end encrypted direct messaging on top of the Parley Messaging API.
//!
//! [`auth::AuthService`] registers and logs in, producing a
//! [`context::SessionContext`]; a [`session::MessageSession`] built on that
//! context sends messages optimistically and keeps the active conversation's
//! timeline in sync by merging the server history with the local plaintext cache.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod session;
pub mod sync;

#[cfg(test)]
mod testing;
