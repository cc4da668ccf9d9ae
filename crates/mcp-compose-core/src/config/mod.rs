//! The `mcp-compose.yaml` manifest model.
//!
//! Unknown fields are rejected everywhere (`deny_unknown_fields`): a typo in
//! a manifest must fail at load time, not silently configure nothing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ComposeError, ComposeResult};

/// Backend transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Sse,
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::Http => write!(f, "http"),
        }
    }
}

/// Top-level manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeConfig {
    pub version: String,

    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,

    #[serde(default)]
    pub connections: ConnectionsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub oauth: OAuthServerConfig,
}

/// One server entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub transport: TransportKind,

    /// Container image to run. Mutually exclusive with `build`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Build context directory, for servers built from source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Port bindings, `host:container` strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,

    /// Backend URL for `http`/`sse` transports. For `stdio` the command is
    /// the endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceLimits>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthProbe>,

    #[serde(default)]
    pub authentication: AuthPolicy,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ServerConfig {
    /// Stable hash of this entry, used by reload to detect changed servers.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_drop: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,

    #[serde(default)]
    pub read_only_root: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp_profile: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub apparmor_profile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthProbe {
    /// URL path (http/sse) or exec command (stdio) probed for liveness.
    pub test: String,

    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_probe_retries")]
    pub retries: u32,
}

fn default_probe_interval_secs() -> u64 {
    30
}

fn default_probe_retries() -> u32 {
    3
}

/// Per-server authentication policy enforced by the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthPolicy {
    #[serde(default = "default_true")]
    pub required: bool,

    /// Scope a caller needs for this server's tool routes.
    #[serde(default = "default_tool_scope")]
    pub scope: String,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            required: true,
            scope: default_tool_scope(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_tool_scope() -> String {
    "mcp:tools".to_string()
}

/// Timeout profiles applied to the proxy's HTTP server and upstream calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionsConfig {
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_read_timeout_secs")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Default deadline for one bridged MCP call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Inflight drain window during shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Per-session concurrent request cap; exceeding returns 429.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_read_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            max_inflight: default_max_inflight(),
        }
    }
}

fn default_read_timeout_secs() -> u64 {
    120
}

fn default_idle_timeout_secs() -> u64 {
    90
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_max_inflight() -> usize {
    128
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_audit_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_audit_max_age_secs")]
    pub max_age_secs: u64,

    /// Event tags to record; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_audit_max_entries(),
            max_age_secs: default_audit_max_age_secs(),
            events: Vec::new(),
        }
    }
}

fn default_audit_max_entries() -> usize {
    10_000
}

fn default_audit_max_age_secs() -> u64 {
    7 * 24 * 3600
}

/// Authorization server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_scopes")]
    pub scopes_supported: Vec<String>,

    #[serde(default = "default_access_ttl_secs")]
    pub access_token_ttl_secs: u64,

    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_token_ttl_secs: u64,

    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: u64,

    #[serde(default = "default_true")]
    pub dynamic_registration: bool,

    /// Legacy shared-secret auth accepted alongside OAuth. Bypasses scope
    /// checks; operators are warned at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Clients provisioned from the manifest rather than via registration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<StaticClientConfig>,
}

impl Default for OAuthServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            issuer: default_issuer(),
            scopes_supported: default_scopes(),
            access_token_ttl_secs: default_access_ttl_secs(),
            refresh_token_ttl_secs: default_refresh_ttl_secs(),
            code_ttl_secs: default_code_ttl_secs(),
            dynamic_registration: true,
            api_key: None,
            clients: Vec::new(),
        }
    }
}

fn default_issuer() -> String {
    "http://localhost:9876".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "mcp:*".to_string(),
        "mcp:tools".to_string(),
        "mcp:resources".to_string(),
        "mcp:prompts".to_string(),
    ]
}

fn default_access_ttl_secs() -> u64 {
    3600
}

fn default_refresh_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_code_ttl_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticClientConfig {
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    pub redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    /// Allow the `plain` PKCE method for this client. Off unless stated.
    #[serde(default)]
    pub allow_plain_pkce: bool,
}

impl ComposeConfig {
    /// Load and validate a manifest from disk.
    pub fn load(path: &Path) -> ComposeResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ComposeError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate manifest text.
    pub fn parse(raw: &str) -> ComposeResult<Self> {
        let config: ComposeConfig = serde_yaml::from_str(raw)
            .map_err(|e| ComposeError::config(format!("invalid manifest: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> ComposeResult<()> {
        for (name, server) in &self.servers {
            if server.image.is_some() && server.build.is_some() {
                return Err(ComposeError::config(format!(
                    "server '{name}': image and build are mutually exclusive"
                )));
            }
            match server.transport {
                TransportKind::Stdio => {
                    if server.command.is_none() && server.image.is_none() {
                        return Err(ComposeError::config(format!(
                            "server '{name}': stdio transport needs a command or image"
                        )));
                    }
                }
                TransportKind::Http | TransportKind::Sse => {
                    if server.endpoint.is_none() && server.ports.is_empty() {
                        return Err(ComposeError::config(format!(
                            "server '{name}': {} transport needs an endpoint or port binding",
                            server.transport
                        )));
                    }
                    if let Some(endpoint) = &server.endpoint {
                        url::Url::parse(endpoint).map_err(|e| {
                            ComposeError::config(format!(
                                "server '{name}': invalid endpoint '{endpoint}': {e}"
                            ))
                        })?;
                    }
                }
            }
            for dep in &server.depends_on {
                if !self.servers.contains_key(dep) {
                    tracing::warn!(
                        server = %name,
                        dependency = %dep,
                        "depends_on references an undefined server; it will be skipped"
                    );
                }
            }
        }

        for client in &self.oauth.clients {
            if client.redirect_uris.is_empty() {
                return Err(ComposeError::config(format!(
                    "oauth client '{}': at least one redirect URI is required",
                    client.client_id
                )));
            }
            for uri in &client.redirect_uris {
                let parsed = url::Url::parse(uri).map_err(|e| {
                    ComposeError::config(format!(
                        "oauth client '{}': invalid redirect URI '{uri}': {e}",
                        client.client_id
                    ))
                })?;
                if !parsed.has_host() {
                    return Err(ComposeError::config(format!(
                        "oauth client '{}': redirect URI '{uri}' must be absolute",
                        client.client_id
                    )));
                }
            }
        }

        if let Some(key) = &self.oauth.api_key {
            if key.len() < 16 {
                return Err(ComposeError::config(
                    "oauth.api_key must be at least 16 characters",
                ));
            }
        }

        Ok(())
    }

    /// Names of servers whose dependencies are declared but missing.
    pub fn missing_dependencies(&self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for (name, server) in &self.servers {
            for dep in &server.depends_on {
                if !self.servers.contains_key(dep) {
                    missing.push((name.clone(), dep.clone()));
                }
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
version: "1"
servers:
  weather:
    transport: http
    image: example/weather:1
    ports: ["8081:8080"]
    authentication:
      scope: mcp:tools
  files:
    transport: stdio
    command: mcp-files
    args: ["--root", "/data"]
    depends_on: [weather]
oauth:
  issuer: http://localhost:9876
  clients:
    - client_id: dashboard
      redirect_uris: ["http://localhost:3000/callback"]
"#;

    #[test]
    fn parses_valid_manifest() {
        let config = ComposeConfig::parse(MANIFEST).unwrap();
        assert_eq!(config.servers.len(), 2);
        let weather = &config.servers["weather"];
        assert_eq!(weather.transport, TransportKind::Http);
        assert_eq!(config.servers["files"].depends_on, vec!["weather"]);
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = r#"
version: "1"
servers:
  broken:
    transport: stdio
    command: x
    comand_typo: y
"#;
        assert!(ComposeConfig::parse(raw).is_err());
    }

    #[test]
    fn rejects_http_server_without_endpoint() {
        let raw = r#"
version: "1"
servers:
  lonely:
    transport: http
    image: example/lonely:1
"#;
        let err = ComposeConfig::parse(raw).unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn rejects_relative_redirect_uri() {
        let raw = r#"
version: "1"
oauth:
  clients:
    - client_id: bad
      redirect_uris: ["/callback"]
"#;
        assert!(ComposeConfig::parse(raw).is_err());
    }

    #[test]
    fn content_hash_tracks_changes() {
        let config = ComposeConfig::parse(MANIFEST).unwrap();
        let mut changed = config.servers["weather"].clone();
        let original = config.servers["weather"].content_hash();
        assert_eq!(original, config.servers["weather"].content_hash());
        changed.args.push("--debug".to_string());
        assert_ne!(original, changed.content_hash());
    }

    #[test]
    fn missing_dependency_reported() {
        let raw = r#"
version: "1"
servers:
  a:
    transport: stdio
    command: a
    depends_on: [ghost]
"#;
        let config = ComposeConfig::parse(raw).unwrap();
        assert_eq!(
            config.missing_dependencies(),
            vec![("a".to_string(), "ghost".to_string())]
        );
    }

    #[test]
    fn defaults_applied() {
        let config = ComposeConfig::parse("version: \"1\"\n").unwrap();
        assert_eq!(config.connections.max_inflight, 128);
        assert_eq!(config.oauth.access_token_ttl_secs, 3600);
        assert_eq!(config.audit.max_entries, 10_000);
        assert!(config.oauth.dynamic_registration);
    }
}
