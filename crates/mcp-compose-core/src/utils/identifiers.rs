//! Identifier and secret generation.
//!
//! Every opaque credential (authorization code, access token, refresh token,
//! client secret) comes from the thread-local CSPRNG. Counter-based ids are
//! only used for JSON-RPC correlation, never for credentials.

use uuid::Uuid;

/// Session id for a backend connection.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Registered client id, `mcp_` + uuid.
pub fn generate_client_id() -> String {
    format!("mcp_{}", Uuid::new_v4())
}

/// Cryptographically random alphanumeric string. `length` is in characters;
/// at 62 symbols per character, 86 characters carry just over 512 bits.
pub fn generate_secure_token(length: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Token length giving at least 64 bytes of entropy (spec floor for access
/// tokens and client secrets).
pub const SECURE_TOKEN_LENGTH: usize = 86;
