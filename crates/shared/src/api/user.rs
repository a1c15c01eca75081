use serde::{Deserialize, Serialize};

/// Query for `GET /api/users/public_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyQuery {
    pub username: String,
}

/// The registered SPKI public key of a user, base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub username: String,
    pub public_key: String,
}
