//! # mcp-compose core
//!
//! Shared foundation for the mcp-compose workspace: the JSON-RPC 2.0 envelope
//! in the MCP profile, the manifest (compose file) data model, the error
//! taxonomy used across crates, and identifier generation.
//!
//! Nothing in this crate performs I/O besides [`config::ComposeConfig::load`];
//! the proxy, session, and lifecycle crates build on these types.
//!
//! ## Modules
//!
//! - [`protocol`]: JSON-RPC messages, protocol versions, capabilities, and
//!   MCP method names
//! - [`types`]: tool, resource, and prompt definitions exchanged with
//!   backends
//! - [`config`]: the `mcp-compose.yaml` manifest model and loader
//! - [`error`]: the `ComposeError` hierarchy
//! - [`utils`]: identifier and secret generation

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;
pub mod utils;

pub use config::{ComposeConfig, ServerConfig, TransportKind};
pub use error::{ComposeError, ComposeResult};
pub use protocol::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use protocol::version::PROTOCOL_VERSION;
