//! Streamable HTTP transport.
//!
//! Each JSON-RPC frame goes out as one POST; the response body carries the
//! matching JSON-RPC response, which the writer task forwards onto the
//! inbound channel so the session's dispatcher sees a single frame source
//! regardless of transport. The backend may issue an `mcp-session-id` header
//! on the first exchange; it is echoed on every later request.

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use mcp_compose_core::protocol::jsonrpc::JsonRpcMessage;

use crate::{Result, TransportError, TransportHandle, INBOUND_CAPACITY, OUTBOUND_CAPACITY};

const SESSION_HEADER: &str = "mcp-session-id";

pub async fn connect(url: &str) -> Result<TransportHandle> {
    let endpoint = reqwest::Url::parse(url).map_err(|e| TransportError::ConnectionError {
        message: format!("invalid streamable url '{url}': {e}"),
    })?;
    let client = reqwest::Client::new();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<JsonRpcMessage>(OUTBOUND_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel::<JsonRpcMessage>(INBOUND_CAPACITY);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut session_id: Option<String> = None;
        loop {
            let frame = tokio::select! {
                frame = outbound_rx.recv() => frame,
                _ = shutdown_rx.changed() => break,
            };
            let Some(frame) = frame else { break };

            let mut request = client
                .post(endpoint.clone())
                .header(reqwest::header::ACCEPT, "application/json")
                .json(&frame);
            if let Some(id) = &session_id {
                request = request.header(SESSION_HEADER, id);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("streamable POST failed: {e}");
                    break;
                }
            };

            if let Some(id) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                if session_id.as_deref() != Some(id) {
                    debug!(session = %id, "streamable session established");
                    session_id = Some(id.to_string());
                }
            }

            let status = response.status();
            if !status.is_success() {
                warn!("streamable POST returned {status}");
                continue;
            }
            // notifications are acknowledged with an empty 202
            if status == reqwest::StatusCode::ACCEPTED {
                continue;
            }

            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("streamable body read failed: {e}");
                    break;
                }
            };
            if body.is_empty() {
                continue;
            }
            trace!("streamable recv: {}", String::from_utf8_lossy(&body));
            match serde_json::from_slice::<JsonRpcMessage>(&body) {
                Ok(frame) => {
                    if inbound_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("streamable: dropping malformed response body: {e}"),
            }
        }
    });

    Ok(TransportHandle::new(outbound_tx, inbound_rx, shutdown_tx))
}
