//! Encryption policy for direct-message payloads.
//!
//! The client sends either plaintext or RSA-OAEP ciphertext; sender and reader
//! must agree on the policy for a conversation to be readable.

use parley_shared::constants::MAX_RSA_OAEP_PLAINTEXT_BYTES;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::CryptoError;
use crate::keys::PrivateKey;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionPolicy {
    /// Payloads travel as plaintext.
    None,
    /// Payloads are sealed under the receiver's RSA public key.
    #[default]
    RsaOaep,
}

impl EncryptionPolicy {
    /// Whether sealing needs the peer's registered public key.
    pub fn requires_peer_key(&self) -> bool {
        matches!(self, EncryptionPolicy::RsaOaep)
    }

    /// Largest plaintext this policy can carry, if bounded.
    pub fn max_plaintext_len(&self) -> Option<usize> {
        match self {
            EncryptionPolicy::None => None,
            EncryptionPolicy::RsaOaep => Some(MAX_RSA_OAEP_PLAINTEXT_BYTES),
        }
    }

    /// Turn `plaintext` into the payload submitted to the server.
    pub fn seal(
        &self,
        plaintext: &str,
        peer_public_key: Option<&str>,
    ) -> Result<String, CryptoError> {
        match self {
            EncryptionPolicy::None => Ok(plaintext.to_string()),
            EncryptionPolicy::RsaOaep => {
                let key = peer_public_key.ok_or_else(|| {
                    CryptoError::Encryption("recipient has no registered public key".into())
                })?;
                codec::encrypt(plaintext, key)
            }
        }
    }

    /// Turn a payload addressed to the local user back into text.
    pub fn open(
        &self,
        payload: &str,
        private_key: Option<&PrivateKey>,
    ) -> Result<String, CryptoError> {
        match self {
            EncryptionPolicy::None => Ok(payload.to_string()),
            EncryptionPolicy::RsaOaep => {
                let key = private_key.ok_or_else(|| {
                    CryptoError::Decryption("no private key on this device".into())
                })?;
                codec::decrypt(payload, key)
            }
        }
    }
}

impl std::fmt::Display for EncryptionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncryptionPolicy::None => f.write_str("none"),
            EncryptionPolicy::RsaOaep => f.write_str("rsa-oaep"),
        }
    }
}

impl std::str::FromStr for EncryptionPolicy {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "plaintext" => Ok(EncryptionPolicy::None),
            "rsa-oaep" | "rsa" => Ok(EncryptionPolicy::RsaOaep),
            other => Err(CryptoError::Serialization(format!(
                "unknown encryption policy: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_key_pairs;

    #[test]
    fn none_policy_is_identity() {
        let policy = EncryptionPolicy::None;
        assert_eq!(policy.seal("hi", None).unwrap(), "hi");
        assert_eq!(policy.open("hi", None).unwrap(), "hi");
        assert!(!policy.requires_peer_key());
        assert_eq!(policy.max_plaintext_len(), None);
    }

    #[test]
    fn rsa_policy_roundtrips() {
        let (bob, _) = test_key_pairs();
        let policy = EncryptionPolicy::RsaOaep;
        let sealed = policy.seal("hi bob", Some(&bob.public_key)).unwrap();
        assert_ne!(sealed, "hi bob");
        assert_eq!(policy.open(&sealed, Some(&bob.private_key)).unwrap(), "hi bob");
    }

    #[test]
    fn rsa_policy_without_peer_key_is_encryption_error() {
        assert!(matches!(
            EncryptionPolicy::RsaOaep.seal("hi", None),
            Err(CryptoError::Encryption(_))
        ));
    }

    #[test]
    fn rsa_policy_without_private_key_is_decryption_error() {
        assert!(matches!(
            EncryptionPolicy::RsaOaep.open("AAAA", None),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn parses_from_config_strings() {
        assert_eq!("none".parse::<EncryptionPolicy>().unwrap(), EncryptionPolicy::None);
        assert_eq!(
            "RSA-OAEP".parse::<EncryptionPolicy>().unwrap(),
            EncryptionPolicy::RsaOaep
        );
        assert!("rot13".parse::<EncryptionPolicy>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case() {
        assert_eq!(
            serde_json::to_string(&EncryptionPolicy::RsaOaep).unwrap(),
            r#""rsa-oaep""#
        );
        let back: EncryptionPolicy = serde_json::from_str(r#""none""#).unwrap();
        assert_eq!(back, EncryptionPolicy::None);
    }

    #[test]
    fn display_matches_from_str() {
        for policy in [EncryptionPolicy::None, EncryptionPolicy::RsaOaep] {
            assert_eq!(policy.to_string().parse::<EncryptionPolicy>().unwrap(), policy);
        }
    }
}
