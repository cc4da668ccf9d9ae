//! PKCE (RFC 7636) generation and verification.

use base64::Engine;
use mcp_compose_core::utils::generate_secure_token;
use sha2::Digest;

use crate::error::AuthError;

/// Parameters a client carries through an authorization-code flow.
#[derive(Debug, Clone)]
pub struct PkceParams {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

/// Generate an S256 verifier/challenge pair. The verifier uses the maximum
/// permitted length (128 chars from the unreserved set).
pub fn generate_pkce_params() -> PkceParams {
    let code_verifier = generate_secure_token(128);
    let code_challenge = s256_challenge(&code_verifier);
    PkceParams {
        code_verifier,
        code_challenge,
        code_challenge_method: "S256".to_string(),
    }
}

/// base64url(no padding) of SHA-256(verifier).
pub fn s256_challenge(verifier: &str) -> String {
    let digest = sha2::Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

fn verifier_charset_ok(verifier: &str) -> bool {
    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Verify a token-endpoint `code_verifier` against the challenge bound to
/// the authorization code.
///
/// `plain` is honored only when `allow_plain` is set from the client
/// registration; otherwise it fails closed.
pub fn verify_code_challenge(
    verifier: &str,
    challenge: &str,
    method: &str,
    allow_plain: bool,
) -> Result<(), AuthError> {
    if verifier.len() < 43 || verifier.len() > 128 || !verifier_charset_ok(verifier) {
        return Err(AuthError::InvalidRequest(
            "code_verifier must be 43-128 unreserved characters".to_string(),
        ));
    }

    let ok = match method {
        "S256" => s256_challenge(verifier) == challenge,
        "plain" if allow_plain => verifier == challenge,
        "plain" => {
            return Err(AuthError::InvalidGrant(
                "plain code_challenge_method is not permitted for this client".to_string(),
            ))
        }
        other => {
            return Err(AuthError::InvalidRequest(format!(
                "unknown code_challenge_method: {other}"
            )))
        }
    };

    if ok {
        Ok(())
    } else {
        Err(AuthError::PkceChallengeFailed)
    }
}
