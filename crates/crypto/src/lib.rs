//! Cryptographic core of Parley direct messaging.
//!
//! Provides RSA-2048 identity key pairs (SPKI public / PKCS#8 private, base64),
//! RSA-OAEP/SHA-256 message sealing, the pluggable encryption policy used by the
//! client, and the device-local key-value storage the private key and message
//! caches live in.

pub mod codec;
pub mod error;
pub mod key_store;
pub mod keys;
pub mod policy;
pub mod storage;
