//! HTTP+SSE transport (legacy MCP transport).
//!
//! The backend keeps a persistent `text/event-stream` GET open and announces
//! a POST endpoint in its first `endpoint` event; requests go out over that
//! endpoint, responses and notifications come back as `message` events on
//! the stream.

use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use mcp_compose_core::protocol::jsonrpc::JsonRpcMessage;

use crate::{Result, TransportError, TransportHandle, INBOUND_CAPACITY, OUTBOUND_CAPACITY};

/// How long to wait for the backend to announce its POST endpoint.
const ENDPOINT_WAIT: Duration = Duration::from_secs(10);

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental SSE parser over arbitrary byte chunks.
#[derive(Default)]
pub(crate) struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();
        while let Some(split) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..split + 2).collect();
            if let Some(event) = Self::parse_block(block.trim_end()) {
                events.push(event);
            }
        }
        events
    }

    fn parse_block(block: &str) -> Option<SseEvent> {
        let mut event = "message".to_string();
        let mut data_lines = Vec::new();
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.trim_start().to_string());
            }
            // comments (`:`) and ids are ignored
        }
        if data_lines.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: data_lines.join("\n"),
        })
    }
}

pub async fn connect(url: &str) -> Result<TransportHandle> {
    let base = reqwest::Url::parse(url).map_err(|e| TransportError::ConnectionError {
        message: format!("invalid SSE url '{url}': {e}"),
    })?;
    let client = reqwest::Client::new();

    let response = client
        .get(base.clone())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| TransportError::network(format!("SSE connect failed: {e}")))?;
    if !response.status().is_success() {
        return Err(TransportError::ConnectionError {
            message: format!("SSE connect returned {}", response.status()),
        });
    }

    let mut stream = response.bytes_stream();
    let (inbound_tx, inbound_rx) = mpsc::channel::<JsonRpcMessage>(INBOUND_CAPACITY);
    let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // reader: parse the event stream until it ends
    let mut reader_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut parser = SseParser::default();
        let mut endpoint_tx = Some(endpoint_tx);
        loop {
            let chunk: Option<reqwest::Result<Bytes>> = tokio::select! {
                chunk = stream.next() => chunk,
                _ = reader_shutdown.changed() => break,
            };
            let Some(chunk) = chunk else {
                debug!("SSE stream ended");
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("SSE stream error: {e}");
                    break;
                }
            };
            for event in parser.push(&chunk) {
                trace!(event = %event.event, "sse event");
                match event.event.as_str() {
                    "endpoint" => {
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(event.data);
                        }
                    }
                    "message" => match serde_json::from_str::<JsonRpcMessage>(&event.data) {
                        Ok(frame) => {
                            if inbound_tx.send(frame).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("SSE: dropping malformed message event: {e}"),
                    },
                    other => debug!("SSE: ignoring event type '{other}'"),
                }
            }
        }
    });

    // handshake: the backend must announce where requests go
    let endpoint = tokio::time::timeout(ENDPOINT_WAIT, endpoint_rx)
        .await
        .map_err(|_| TransportError::protocol("no endpoint event within handshake window"))?
        .map_err(|_| TransportError::ConnectionClosed)?;
    let endpoint_url = base
        .join(&endpoint)
        .map_err(|e| TransportError::protocol(format!("invalid endpoint '{endpoint}': {e}")))?;
    debug!(endpoint = %endpoint_url, "SSE endpoint established");

    // writer: serialize requests onto the POST endpoint; responses arrive
    // on the stream, so POST bodies are not read
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<JsonRpcMessage>(OUTBOUND_CAPACITY);
    let mut writer_shutdown = shutdown_rx;
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = outbound_rx.recv() => frame,
                _ = writer_shutdown.changed() => break,
            };
            let Some(frame) = frame else { break };
            match client.post(endpoint_url.clone()).json(&frame).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!("SSE POST returned {}", response.status()),
                Err(e) => {
                    warn!("SSE POST failed: {e}");
                    break;
                }
            }
        }
    });

    Ok(TransportHandle::new(outbound_tx, inbound_rx, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_handles_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"event: endpoint\nda").is_empty());
        let events = parser.push(b"ta: /messages?session=1\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "endpoint".to_string(),
                data: "/messages?session=1".to_string(),
            }]
        );
    }

    #[test]
    fn parser_defaults_to_message_event() {
        let mut parser = SseParser::default();
        let events = parser.push(b"data: {\"jsonrpc\":\"2.0\",\"result\":{},\"id\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn parser_joins_multiline_data() {
        let mut parser = SseParser::default();
        let events = parser.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn parser_ignores_comment_only_blocks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b": keepalive\n\n").is_empty());
    }

    #[test]
    fn parser_multiple_events_in_one_chunk() {
        let mut parser = SseParser::default();
        let events = parser.push(b"data: a\n\ndata: b\n\n");
        assert_eq!(events.len(), 2);
    }
}
