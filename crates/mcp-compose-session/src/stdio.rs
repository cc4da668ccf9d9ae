//! Stdio transport: a subprocess speaking newline-delimited JSON-RPC.
//!
//! The writer task owns the child's stdin and is the only writer, so frames
//! cannot interleave. The reader task owns stdout and forwards one parsed
//! frame per line; EOF ends the inbound channel, which the session treats as
//! a disconnect. Child stderr passes through for operator visibility.

use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use mcp_compose_core::protocol::jsonrpc::JsonRpcMessage;

use crate::{Result, TransportError, TransportHandle, INBOUND_CAPACITY, OUTBOUND_CAPACITY};

pub async fn connect(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<TransportHandle> {
    let mut child = Command::new(command)
        .args(args)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TransportError::SpawnError {
            message: format!("failed to spawn '{command}': {e}"),
        })?;

    let stdin = child.stdin.take().ok_or_else(|| TransportError::SpawnError {
        message: "child stdin unavailable".to_string(),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| TransportError::SpawnError {
        message: "child stdout unavailable".to_string(),
    })?;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<JsonRpcMessage>(OUTBOUND_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel::<JsonRpcMessage>(INBOUND_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // writer: the single path to the child's stdin
    let mut writer_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut stdin = BufWriter::new(stdin);
        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let line = match serde_json::to_string(&frame) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("dropping unserializable frame: {e}");
                            continue;
                        }
                    };
                    trace!("stdio send: {line}");
                    if stdin.write_all(line.as_bytes()).await.is_err()
                        || stdin.write_all(b"\n").await.is_err()
                        || stdin.flush().await.is_err()
                    {
                        debug!("stdio writer: child stdin closed");
                        break;
                    }
                }
                _ = writer_shutdown.changed() => break,
            }
        }
    });

    // reader: one frame per line until EOF
    let mut reader_shutdown = shutdown_rx;
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            trace!("stdio recv: {line}");
                            match serde_json::from_str::<JsonRpcMessage>(line) {
                                Ok(frame) => {
                                    if inbound_tx.send(frame).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("stdio: dropping malformed frame: {e}"),
                            }
                        }
                        Ok(None) => {
                            debug!("stdio reader: EOF");
                            break;
                        }
                        Err(e) => {
                            warn!("stdio reader: {e}");
                            break;
                        }
                    }
                }
                _ = reader_shutdown.changed() => break,
            }
        }
        // child reaped here so a closed session does not leave a zombie
        let _ = child.kill().await;
    });

    Ok(TransportHandle::new(outbound_tx, inbound_rx, shutdown_tx))
}
