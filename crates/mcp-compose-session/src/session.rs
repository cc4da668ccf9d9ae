//! One backend session: handshake, correlation, reconnect.
//!
//! A session owns the only mutable protocol state for its backend. Writes
//! are serialized by the transport's writer task; the dispatcher task here
//! is the only reader, resolving responses into the inflight map by JSON-RPC
//! id. Requests against a session that is not `Ready` fail fast; transport
//! loss degrades the session and reconnects with capped exponential backoff.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use mcp_compose_core::error::ComposeError;
use mcp_compose_core::protocol::capabilities::{
    ClientCapabilities, ClientInfo, InitializeRequest, InitializeResponse, ServerCapabilities,
    ServerInfo,
};
use mcp_compose_core::protocol::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use mcp_compose_core::protocol::version::{negotiate_version, PROTOCOL_VERSION};
use mcp_compose_core::protocol::methods;

use crate::{connect_transport, TransportConfig};

/// Reconnect backoff: 500 ms base, doubling, 30 s cap, ±20 % jitter.
const BACKOFF_BASE_MS: f64 = 500.0;
const BACKOFF_CAP_MS: f64 = 30_000.0;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Handshaking,
    Ready,
    Degraded,
    Closed,
}

/// How a bridged call failed.
#[derive(Debug)]
pub enum CallError {
    /// The backend answered with a JSON-RPC error; the bridge maps the code
    /// onto an HTTP status.
    Rpc(JsonRpcError),
    /// Everything else (transport, timeout, state, capacity).
    Compose(ComposeError),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Rpc(err) => write!(f, "backend error {err}"),
            CallError::Compose(err) => write!(f, "{err}"),
        }
    }
}

impl From<ComposeError> for CallError {
    fn from(err: ComposeError) -> Self {
        CallError::Compose(err)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub request_timeout: Duration,
    pub max_inflight: usize,
}

impl SessionConfig {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            request_timeout: Duration::from_secs(30),
            max_inflight: 128,
        }
    }
}

/// Read-only view for status endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSnapshot {
    pub name: String,
    pub state: SessionState,
    pub transport: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ServerCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
    pub inflight: usize,
}

type Waiter = oneshot::Sender<Result<Value, CallError>>;

struct Shared {
    name: String,
    state: RwLock<SessionState>,
    capabilities: RwLock<Option<ServerCapabilities>>,
    protocol_version: RwLock<Option<String>>,
    server_info: RwLock<Option<ServerInfo>>,
    outbound: RwLock<Option<mpsc::Sender<JsonRpcMessage>>>,
    transport_shutdown: Mutex<Option<watch::Sender<bool>>>,
    inflight: Mutex<HashMap<i64, Waiter>>,
    progress: Mutex<HashMap<String, mpsc::Sender<Value>>>,
    next_id: AtomicI64,
    last_activity: RwLock<SystemTime>,
    reconnect_attempt: AtomicU32,
    /// Bumped on every (re)connect so a stale dispatcher cannot degrade a
    /// newer connection.
    generation: AtomicU64,
}

pub struct BackendSession {
    config: SessionConfig,
    shared: Arc<Shared>,
}

impl BackendSession {
    pub fn new(name: impl Into<String>, config: SessionConfig) -> Self {
        let name = name.into();
        Self {
            config,
            shared: Arc::new(Shared {
                name,
                state: RwLock::new(SessionState::Init),
                capabilities: RwLock::new(None),
                protocol_version: RwLock::new(None),
                server_info: RwLock::new(None),
                outbound: RwLock::new(None),
                transport_shutdown: Mutex::new(None),
                inflight: Mutex::new(HashMap::new()),
                progress: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                last_activity: RwLock::new(SystemTime::now()),
                reconnect_attempt: AtomicU32::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub async fn state(&self) -> SessionState {
        *self.shared.state.read().await
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await == SessionState::Ready
    }

    pub async fn capabilities(&self) -> Option<ServerCapabilities> {
        self.shared.capabilities.read().await.clone()
    }

    /// Instant of the last successful round-trip.
    pub async fn last_activity(&self) -> SystemTime {
        *self.shared.last_activity.read().await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            name: self.shared.name.clone(),
            state: self.state().await,
            transport: match &self.config.transport {
                TransportConfig::Stdio { .. } => "stdio".to_string(),
                TransportConfig::Sse { .. } => "sse".to_string(),
                TransportConfig::Streamable { .. } => "http".to_string(),
            },
            protocol_version: self.shared.protocol_version.read().await.clone(),
            capabilities: self.capabilities().await,
            server_info: self.shared.server_info.read().await.clone(),
            inflight: self.shared.inflight.lock().await.len(),
        }
    }

    /// Connect and handshake. On handshake failure the session lands in
    /// `Degraded` and reconnects in the background.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ComposeError> {
        match self.try_connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(SessionState::Degraded).await;
                self.spawn_reconnect();
                Err(e)
            }
        }
    }

    async fn try_connect(self: &Arc<Self>) -> Result<(), ComposeError> {
        self.set_state(SessionState::Handshaking).await;
        let handle = connect_transport(&self.config.transport)
            .await
            .map_err(|e| ComposeError::transport(e.to_string()))?;
        let (outbound, inbound, shutdown) = handle.into_parts();

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared.outbound.write().await = Some(outbound);
        {
            let mut guard = self.shared.transport_shutdown.lock().await;
            if let Some(previous) = guard.replace(shutdown) {
                let _ = previous.send(true);
            }
        }
        self.spawn_dispatcher(inbound, generation);

        self.handshake().await?;
        self.set_state(SessionState::Ready).await;
        self.shared.reconnect_attempt.store(0, Ordering::Relaxed);
        info!(server = %self.shared.name, "session ready");
        Ok(())
    }

    async fn handshake(&self) -> Result<(), ComposeError> {
        let request = InitializeRequest {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        };
        let result = self
            .raw_call(
                methods::INITIALIZE,
                Some(serde_json::to_value(&request)?),
                self.config.request_timeout,
            )
            .await
            .map_err(|e| match e {
                CallError::Rpc(err) => ComposeError::protocol(format!("initialize failed: {err}")),
                CallError::Compose(err) => err,
            })?;

        let response: InitializeResponse = serde_json::from_value(result)
            .map_err(|e| ComposeError::protocol(format!("bad initialize response: {e}")))?;
        let version = negotiate_version(&response.protocol_version).ok_or_else(|| {
            ComposeError::protocol(format!(
                "unsupported protocol version: {}",
                response.protocol_version
            ))
        })?;

        *self.shared.capabilities.write().await = Some(response.capabilities);
        *self.shared.protocol_version.write().await = Some(version.to_string());
        *self.shared.server_info.write().await = Some(response.server_info);

        self.notify(methods::INITIALIZED, None).await?;
        Ok(())
    }

    /// Send a notification (no correlation, no reply).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ComposeError> {
        let frame = JsonRpcMessage::Request(JsonRpcRequest::notification(method, params));
        let outbound = self.shared.outbound.read().await;
        let sender = outbound
            .as_ref()
            .ok_or_else(|| ComposeError::transport("session has no transport"))?;
        sender
            .send(frame)
            .await
            .map_err(|_| ComposeError::transport("transport writer gone"))
    }

    /// Dispatch one MCP call with the given deadline. Fails fast unless the
    /// session is `Ready`.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Option<Duration>,
    ) -> Result<Value, CallError> {
        let state = self.state().await;
        if state != SessionState::Ready {
            return Err(CallError::Compose(ComposeError::transport(format!(
                "session '{}' is {state:?}, not ready",
                self.shared.name
            ))));
        }
        {
            let inflight = self.shared.inflight.lock().await;
            if inflight.len() >= self.config.max_inflight {
                return Err(CallError::Compose(ComposeError::RateLimit(format!(
                    "session '{}' at max inflight ({})",
                    self.shared.name, self.config.max_inflight
                ))));
            }
        }
        self.raw_call(method, params, deadline.unwrap_or(self.config.request_timeout))
            .await
    }

    /// Correlated request/response without the `Ready` gate (the handshake
    /// itself needs this).
    async fn raw_call(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, CallError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut inflight = self.shared.inflight.lock().await;
            inflight.insert(id, tx);
        }

        let frame = JsonRpcMessage::Request(JsonRpcRequest::new(
            method,
            params,
            RequestId::number(id),
        ));
        let send_result = {
            let outbound = self.shared.outbound.read().await;
            match outbound.as_ref() {
                Some(sender) => sender.send(frame).await,
                None => {
                    self.shared.inflight.lock().await.remove(&id);
                    return Err(CallError::Compose(ComposeError::transport(
                        "session has no transport",
                    )));
                }
            }
        };
        if send_result.is_err() {
            self.shared.inflight.lock().await.remove(&id);
            return Err(CallError::Compose(ComposeError::transport(
                "transport writer gone",
            )));
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => {
                *self.shared.last_activity.write().await = SystemTime::now();
                result
            }
            Ok(Err(_)) => Err(CallError::Compose(ComposeError::transport(
                "session dispatcher stopped",
            ))),
            Err(_) => {
                // the entry is removed so a late reply is dropped, not
                // delivered to a caller that already gave up
                self.shared.inflight.lock().await.remove(&id);
                Err(CallError::Compose(ComposeError::Timeout(deadline)))
            }
        }
    }

    /// Register for progress notifications carrying `token`.
    pub async fn register_progress(&self, token: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(32);
        self.shared.progress.lock().await.insert(token.to_string(), tx);
        rx
    }

    pub async fn unregister_progress(&self, token: &str) {
        self.shared.progress.lock().await.remove(token);
    }

    /// Close permanently. Inflight calls fail; no reconnect is scheduled.
    pub async fn close(&self) {
        self.set_state(SessionState::Closed).await;
        *self.shared.outbound.write().await = None;
        if let Some(shutdown) = self.shared.transport_shutdown.lock().await.take() {
            let _ = shutdown.send(true);
        }
        Self::fail_inflight(&self.shared, "session closed").await;
        debug!(server = %self.shared.name, "session closed");
    }

    async fn set_state(&self, state: SessionState) {
        *self.shared.state.write().await = state;
    }

    async fn fail_inflight(shared: &Shared, reason: &str) {
        let mut inflight = shared.inflight.lock().await;
        for (_, waiter) in inflight.drain() {
            let _ = waiter.send(Err(CallError::Compose(ComposeError::transport(reason))));
        }
    }

    fn spawn_dispatcher(
        self: &Arc<Self>,
        mut inbound: mpsc::Receiver<JsonRpcMessage>,
        generation: u64,
    ) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                match frame {
                    JsonRpcMessage::Response(response) => {
                        session.dispatch_response(response).await;
                    }
                    JsonRpcMessage::Request(request) => {
                        session.dispatch_server_frame(request).await;
                    }
                }
            }
            // frame source gone: only the current generation may degrade
            if session.shared.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let state = session.state().await;
            if state == SessionState::Closed {
                return;
            }
            warn!(server = %session.shared.name, "backend connection lost");
            Self::fail_inflight(&session.shared, "backend connection lost").await;
            session.set_state(SessionState::Degraded).await;
            session.spawn_reconnect();
        });
    }

    async fn dispatch_response(&self, response: JsonRpcResponse) {
        let Some(RequestId::Number(id)) = response.id else {
            debug!(server = %self.shared.name, "dropping response with foreign id");
            return;
        };
        let waiter = self.shared.inflight.lock().await.remove(&id);
        match waiter {
            Some(waiter) => {
                let result = match response.error {
                    Some(error) => Err(CallError::Rpc(error)),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                let _ = waiter.send(result);
            }
            None => {
                // deadline already fired for this id
                debug!(server = %self.shared.name, id, "dropping late reply");
            }
        }
    }

    async fn dispatch_server_frame(&self, request: JsonRpcRequest) {
        match request.method.as_str() {
            methods::PROGRESS_NOTIFICATION => {
                let token = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("progressToken"))
                    .and_then(|t| t.as_str())
                    .map(str::to_string);
                if let Some(token) = token {
                    let progress = self.shared.progress.lock().await;
                    if let Some(subscriber) = progress.get(&token) {
                        let _ = subscriber
                            .send(request.params.clone().unwrap_or(Value::Null))
                            .await;
                    }
                }
            }
            methods::PING if request.id.is_some() => {
                // keep-alive from the backend; answer inline
                let reply = JsonRpcMessage::Response(JsonRpcResponse::success(
                    Value::Object(Default::default()),
                    request.id,
                ));
                let outbound = self.shared.outbound.read().await;
                if let Some(sender) = outbound.as_ref() {
                    let _ = sender.send(reply).await;
                }
            }
            other => {
                debug!(server = %self.shared.name, method = %other, "ignoring server frame");
            }
        }
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let attempt = session.shared.reconnect_attempt.fetch_add(1, Ordering::Relaxed);
                let delay = backoff_delay(attempt);
                debug!(
                    server = %session.shared.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                tokio::time::sleep(delay).await;
                if session.state().await == SessionState::Closed {
                    return;
                }
                match session.try_connect().await {
                    Ok(()) => return,
                    Err(e) => {
                        warn!(server = %session.shared.name, "reconnect failed: {e}");
                        session.set_state(SessionState::Degraded).await;
                    }
                }
            }
        });
    }
}

/// Exponential backoff with jitter. Attempt 0 ⇒ ~500 ms.
fn backoff_delay(attempt: u32) -> Duration {
    use rand::Rng;
    let exp = BACKOFF_BASE_MS * 2f64.powi(attempt.min(16) as i32);
    let capped = exp.min(BACKOFF_CAP_MS);
    let jitter = rand::rng().random_range(0.8..=1.2);
    Duration::from_millis((capped * jitter) as u64)
}
