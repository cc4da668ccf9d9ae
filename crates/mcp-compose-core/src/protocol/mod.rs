//! MCP protocol layer: JSON-RPC envelope, versions, capabilities, methods.

pub mod capabilities;
pub mod jsonrpc;
pub mod methods;
pub mod version;

pub use capabilities::{
    ClientCapabilities, ClientInfo, InitializeRequest, InitializeResponse, ServerCapabilities,
    ServerInfo,
};
pub use jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use version::{negotiate_version, PROTOCOL_VERSION, SUPPORTED_VERSIONS};
