//! Wire types, ids and conversation addressing shared by the Parley crates.

pub mod api;
pub mod constants;
pub mod conversation;
pub mod error;
pub mod ids;
