//! # mcp-compose proxy
//!
//! The single-origin HTTP front door over a fleet of MCP backends. One axum
//! application serves:
//!
//! - the OAuth 2.1 authorization server (mounted from `mcp-compose-auth`)
//! - the protocol bridge: `POST /{server}` forwards raw JSON-RPC,
//!   `POST /{server}/{tool}` wraps a plain JSON body into `tools/call`
//! - aggregated discovery and OpenAPI documents
//! - reload and subscription administration
//!
//! Requests authenticate through the bearer/API-key middleware and are
//! scope-checked per route before the bridge dispatches them onto a backend
//! session.

pub mod discovery;
pub mod handlers;
pub mod openapi;
pub mod reload;
pub mod server;

pub use discovery::{DiscoveryService, HealthStatus};
pub use reload::{ReloadController, ReloadReport};
pub use server::{ProxyServer, ProxySettings, ProxyState};

use mcp_compose_core::config::{ServerConfig, TransportKind};
use mcp_compose_session::TransportConfig;

/// Derive the session transport for a manifest server.
///
/// `stdio` servers need a local command (the manifest `command`); `http` and
/// `sse` servers need an endpoint, either explicit or derived from the first
/// port binding.
pub fn transport_for(server: &ServerConfig) -> Option<TransportConfig> {
    match server.transport {
        TransportKind::Stdio => server.command.as_ref().map(|command| TransportConfig::Stdio {
            command: command.clone(),
            args: server.args.clone(),
            env: server.env.clone(),
        }),
        TransportKind::Sse | TransportKind::Http => {
            let url = server.endpoint.clone().or_else(|| {
                let binding = server.ports.first()?;
                let host_port = binding.split(':').next()?;
                Some(format!("http://localhost:{host_port}"))
            })?;
            Some(match server.transport {
                TransportKind::Sse => TransportConfig::Sse { url },
                _ => TransportConfig::Streamable { url },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_compose_core::config::ComposeConfig;

    #[test]
    fn stdio_transport_from_command() {
        let config = ComposeConfig::parse(
            "version: \"1\"\nservers:\n  files:\n    transport: stdio\n    command: mcp-files\n    args: [\"--root\", \"/data\"]\n",
        )
        .unwrap();
        let transport = transport_for(&config.servers["files"]).unwrap();
        assert!(matches!(
            transport,
            TransportConfig::Stdio { command, .. } if command == "mcp-files"
        ));
    }

    #[test]
    fn http_endpoint_derived_from_port_binding() {
        let config = ComposeConfig::parse(
            "version: \"1\"\nservers:\n  weather:\n    transport: http\n    image: w:1\n    ports: [\"8081:8080\"]\n",
        )
        .unwrap();
        let transport = transport_for(&config.servers["weather"]).unwrap();
        assert_eq!(
            transport,
            TransportConfig::Streamable {
                url: "http://localhost:8081".to_string()
            }
        );
    }

    #[test]
    fn explicit_endpoint_wins() {
        let config = ComposeConfig::parse(
            "version: \"1\"\nservers:\n  events:\n    transport: sse\n    image: e:1\n    endpoint: http://10.0.0.5:9000/sse\n",
        )
        .unwrap();
        let transport = transport_for(&config.servers["events"]).unwrap();
        assert_eq!(
            transport,
            TransportConfig::Sse {
                url: "http://10.0.0.5:9000/sse".to_string()
            }
        );
    }
}
