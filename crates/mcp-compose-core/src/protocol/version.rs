//! Protocol version constants and negotiation.

/// Protocol version the proxy offers during `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Versions the bridge accepts from backends, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Pick the version to run a session at, given what the backend answered
/// with. Returns `None` when no supported version matches; the session is
/// then closed with a protocol error.
pub fn negotiate_version(server_version: &str) -> Option<&'static str> {
    SUPPORTED_VERSIONS
        .iter()
        .find(|v| **v == server_version)
        .copied()
}
