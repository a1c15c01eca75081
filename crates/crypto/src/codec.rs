//! RSA-OAEP/SHA-256 message sealing.
//!
//! Messages are sealed directly under the recipient's public key, with no hybrid
//! scheme and no chunking, so the modulus caps the message length: 190 bytes of
//! UTF-8 for a 2048-bit key. OAEP is randomized; sealing the same plaintext twice
//! yields different ciphertexts.

use base64::Engine;
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::Oaep;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::keys::{decode_public_key, PrivateKey};

/// SHA-256 output length, which OAEP charges twice against the modulus.
const DIGEST_LEN: usize = 32;

fn oaep_ceiling(modulus_bytes: usize) -> usize {
    modulus_bytes.saturating_sub(2 * DIGEST_LEN + 2)
}

/// Largest plaintext, in bytes, that can be sealed under `recipient_public_key`.
pub fn max_plaintext_len(recipient_public_key: &str) -> Result<usize, CryptoError> {
    let public = decode_public_key(recipient_public_key)?;
    Ok(oaep_ceiling(public.size()))
}

/// Seal `plaintext` for the holder of `recipient_public_key` (base64 SPKI).
///
/// Returns base64 ciphertext. Fails with [`CryptoError::Encryption`] when the key
/// cannot be parsed or the plaintext exceeds the OAEP ceiling.
pub fn encrypt(plaintext: &str, recipient_public_key: &str) -> Result<String, CryptoError> {
    let public = decode_public_key(recipient_public_key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let limit = oaep_ceiling(public.size());
    if plaintext.len() > limit {
        return Err(CryptoError::Encryption(format!(
            "message is {} bytes; at most {limit} bytes can be encrypted",
            plaintext.len()
        )));
    }

    let ciphertext = public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(ciphertext))
}

/// Open base64 `ciphertext` with the local private key.
///
/// Fails with [`CryptoError::Decryption`] when the key is malformed, the
/// ciphertext was sealed for someone else, or the payload is corrupt.
pub fn decrypt(ciphertext: &str, private_key: &PrivateKey) -> Result<String, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::Decryption("ciphertext is empty".into()));
    }
    let private = private_key
        .decode()
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(ciphertext.trim().as_bytes())
        .map_err(|e| CryptoError::Decryption(format!("ciphertext is not base64: {e}")))?;

    let plaintext = private
        .decrypt(Oaep::new::<Sha256>(), &bytes)
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".into()))
}
