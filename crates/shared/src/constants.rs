/// RSA modulus size used for every identity key pair.
pub const RSA_MODULUS_BITS: usize = 2048;
/// Public exponent used for every identity key pair (F4).
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;
/// Largest plaintext RSA-OAEP/SHA-256 can seal under a 2048-bit key: `256 - 2*32 - 2`.
pub const MAX_RSA_OAEP_PLAINTEXT_BYTES: usize = RSA_MODULUS_BITS / 8 - 2 * 32 - 2;
/// Maximum length for usernames in bytes.
pub const MAX_USERNAME_LENGTH: usize = 64;
/// Reply the login endpoint sends on success; anything else is a failed login.
pub const LOGIN_SUCCESS_MESSAGE: &str = "Login successful";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oaep_ceiling_is_190_bytes_for_2048_bit_keys() {
        assert_eq!(MAX_RSA_OAEP_PLAINTEXT_BYTES, 190);
    }

    #[test]
    fn public_exponent_is_f4() {
        assert_eq!(RSA_PUBLIC_EXPONENT, 0x10001);
    }
}
