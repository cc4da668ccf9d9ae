//! Manifest and OAuth fixtures.

use mcp_compose_core::config::ComposeConfig;

/// RFC 7636 appendix B PKCE vector, shared by unit and integration tests.
pub const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const PKCE_CHALLENGE_S256: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

/// Diamond dependency fleet: `b` and `c` depend on `a`; `d` depends on
/// both.
pub fn diamond_manifest() -> ComposeConfig {
    ComposeConfig::parse(
        r#"
version: "1"
servers:
  a:
    transport: stdio
    command: cat
  b:
    transport: stdio
    command: cat
    depends_on: [a]
  c:
    transport: stdio
    command: cat
    depends_on: [a]
  d:
    transport: stdio
    command: cat
    depends_on: [b, c]
"#,
    )
    .expect("diamond manifest parses")
}

/// A manifest with a public OAuth client and an API key, for proxy tests.
pub fn oauth_manifest() -> ComposeConfig {
    ComposeConfig::parse(
        r#"
version: "1"
servers:
  weather:
    transport: stdio
    command: cat
oauth:
  issuer: http://localhost:9876
  api_key: fixture-api-key-0123456789
  clients:
    - client_id: pub1
      redirect_uris: ["http://c/cb"]
"#,
    )
    .expect("oauth manifest parses")
}
