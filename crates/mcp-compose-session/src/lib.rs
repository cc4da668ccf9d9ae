//! # mcp-compose session
//!
//! Per-backend MCP sessions for the proxy: transport plumbing
//! (stdio subprocess, HTTP+SSE, streamable HTTP), the `initialize`
//! handshake, request/response correlation, reconnect with backoff, and the
//! session table the bridge and reload controller operate on.
//!
//! Every transport reduces to the same shape: a **single writer task** that
//! serializes outbound frames, and a **reader task** that feeds inbound
//! frames to the session's dispatcher, which correlates them by JSON-RPC id.
//! [`connect_transport`] hides which tasks a given transport needs.

pub mod manager;
pub mod session;
pub mod sse;
pub mod stdio;
pub mod streamable;

pub use manager::SessionManager;
pub use session::{BackendSession, SessionConfig, SessionSnapshot, SessionState};

use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use mcp_compose_core::protocol::jsonrpc::JsonRpcMessage;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Capacity of the outbound (write-serializing) channel. A full channel
/// backpressures callers rather than interleaving writes.
pub const OUTBOUND_CAPACITY: usize = 64;

/// Capacity of the inbound frame channel.
pub const INBOUND_CAPACITY: usize = 256;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {message}")]
    ConnectionError { message: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("serialization error: {message}")]
    SerializationError { message: String },

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    #[error("spawn error: {message}")]
    SpawnError { message: String },
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }
}

/// Transport selection for one backend.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportConfig {
    /// Subprocess speaking newline-delimited JSON-RPC on stdio.
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },

    /// Legacy HTTP+SSE: persistent GET event stream, requests over a POST
    /// endpoint announced during the handshake.
    Sse { url: String },

    /// Streamable HTTP: JSON-RPC request/response per POST.
    Streamable { url: String },
}

/// A connected transport: frame channels plus the shutdown signal for its
/// I/O tasks.
pub struct TransportHandle {
    /// Single-writer path to the backend. Cloned senders all funnel into one
    /// writer task, so frames never interleave.
    pub outbound: mpsc::Sender<JsonRpcMessage>,

    /// Frames read from the backend, in arrival order.
    pub inbound: mpsc::Receiver<JsonRpcMessage>,

    shutdown: watch::Sender<bool>,
}

impl TransportHandle {
    pub(crate) fn new(
        outbound: mpsc::Sender<JsonRpcMessage>,
        inbound: mpsc::Receiver<JsonRpcMessage>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            shutdown,
        }
    }

    /// Stop the transport's I/O tasks. Inflight reads end with channel
    /// closure, which the session observes as a disconnect.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Split into the writer path, the frame source, and the shutdown
    /// signal. The session keeps the pieces in different places.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Sender<JsonRpcMessage>,
        mpsc::Receiver<JsonRpcMessage>,
        watch::Sender<bool>,
    ) {
        (self.outbound, self.inbound, self.shutdown)
    }
}

/// Connect a transport from its configuration.
pub async fn connect_transport(config: &TransportConfig) -> Result<TransportHandle> {
    match config {
        TransportConfig::Stdio { command, args, env } => {
            stdio::connect(command, args, env).await
        }
        TransportConfig::Sse { url } => sse::connect(url).await,
        TransportConfig::Streamable { url } => streamable::connect(url).await,
    }
}
