//! Identity key pairs.
//!
//! Every identity owns one RSA-2048 key pair (public exponent 65537), generated on
//! the device at registration. Keys travel and rest as base64: SPKI DER for the
//! public half, PKCS#8 DER for the private half.

use base64::Engine;
use parley_shared::constants::{RSA_MODULUS_BITS, RSA_PUBLIC_EXPONENT};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Base64 PKCS#8 private key, securely wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    encoded: String,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("encoded", &"[REDACTED]")
            .finish()
    }
}

impl PrivateKey {
    /// Wrap an already-encoded key. The encoding is validated lazily, on use.
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    pub fn as_base64(&self) -> &str {
        &self.encoded
    }

    pub(crate) fn decode(&self) -> Result<RsaPrivateKey, CryptoError> {
        let der = Zeroizing::new(
            base64::engine::general_purpose::STANDARD.decode(self.encoded.as_bytes())?,
        );
        RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| CryptoError::InvalidKey(format!("not a PKCS#8 RSA private key: {e}")))
    }
}

/// A freshly generated identity key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Base64 SPKI DER. Safe to publish.
    pub public_key: String,
    /// Base64 PKCS#8 DER. Never leaves the device.
    pub private_key: PrivateKey,
}

/// Generate a new RSA-2048 identity key pair.
///
/// CPU heavy (hundreds of milliseconds in release builds); async callers should
/// run it on a blocking thread.
pub fn generate_key_pair() -> Result<KeyPair, CryptoError> {
    let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
    let private = RsaPrivateKey::new_with_exp(&mut OsRng, RSA_MODULUS_BITS, &exponent)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public_key = encode_public_key(&RsaPublicKey::from(&private))
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let pkcs8 = private
        .to_pkcs8_der()
        .map_err(|e| CryptoError::KeyGeneration(format!("PKCS#8 export failed: {e}")))?;
    let private_key =
        PrivateKey::from_base64(base64::engine::general_purpose::STANDARD.encode(pkcs8.as_bytes()));

    Ok(KeyPair {
        public_key,
        private_key,
    })
}

/// Re-derive the base64 SPKI public key belonging to a stored private key.
pub fn public_key_from_private(private_key: &PrivateKey) -> Result<String, CryptoError> {
    let private = private_key.decode()?;
    encode_public_key(&RsaPublicKey::from(&private))
}

pub(crate) fn decode_public_key(encoded: &str) -> Result<RsaPublicKey, CryptoError> {
    if encoded.trim().is_empty() {
        return Err(CryptoError::InvalidKey("public key is empty".into()));
    }
    let der = base64::engine::general_purpose::STANDARD.decode(encoded.trim().as_bytes())?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| CryptoError::InvalidKey(format!("not an SPKI RSA public key: {e}")))
}

fn encode_public_key(public: &RsaPublicKey) -> Result<String, CryptoError> {
    let spki = public
        .to_public_key_der()
        .map_err(|e| CryptoError::InvalidKey(format!("SPKI export failed: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(spki.as_bytes()))
}

/// Two distinct key pairs shared by every test in the crate; 2048-bit generation
/// is too slow to repeat per test.
#[cfg(test)]
pub(crate) fn test_key_pairs() -> &'static (KeyPair, KeyPair) {
    static PAIRS: std::sync::OnceLock<(KeyPair, KeyPair)> = std::sync::OnceLock::new();
    PAIRS.get_or_init(|| (generate_key_pair().unwrap(), generate_key_pair().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    #[test]
    fn generated_key_has_2048_bit_modulus_and_f4_exponent() {
        let (pair, _) = test_key_pairs();
        let public = decode_public_key(&pair.public_key).unwrap();
        assert_eq!(public.size() * 8, RSA_MODULUS_BITS);
        assert_eq!(public.e(), &BigUint::from(65537u32));
    }

    #[test]
    fn private_key_is_pkcs8_and_decodes() {
        let (pair, _) = test_key_pairs();
        let private = pair.private_key.decode().unwrap();
        assert_eq!(private.size() * 8, RSA_MODULUS_BITS);
    }

    #[test]
    fn public_key_from_private_matches_generated_public_key() {
        let (pair, _) = test_key_pairs();
        let derived = public_key_from_private(&pair.private_key).unwrap();
        assert_eq!(derived, pair.public_key);
    }

    #[test]
    fn two_generations_produce_different_keys() {
        let (a, b) = test_key_pairs();
        assert_ne!(a.public_key, b.public_key);
        assert_ne!(a.private_key, b.private_key);
    }

    #[test]
    fn private_key_debug_is_redacted() {
        let (pair, _) = test_key_pairs();
        let debug = format!("{:?}", pair.private_key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(pair.private_key.as_base64()));
    }

    #[test]
    fn decode_public_key_rejects_garbage() {
        assert!(matches!(
            decode_public_key("not base64 at all!"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            decode_public_key("aGVsbG8="),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(decode_public_key(""), Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn private_key_swapped_for_public_key_is_rejected() {
        let (pair, _) = test_key_pairs();
        let wrong = PrivateKey::from_base64(pair.public_key.clone());
        assert!(matches!(wrong.decode(), Err(CryptoError::InvalidKey(_))));
    }
}
