//! Request handlers for the proxy surface.
//!
//! Routes authenticate through the shared middleware, check the per-server
//! scope policy, then dispatch onto the backend session. MCP errors coming
//! back from a backend are translated onto HTTP statuses with the numeric
//! JSON-RPC code echoed in `X-MCP-Error-Code`.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{sse::Event, Html, IntoResponse, Json, Response, Sse},
    body::Bytes,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

use mcp_compose_auth::error::AuthError;
use mcp_compose_auth::middleware::AuthContext;
use mcp_compose_core::config::AuthPolicy;
use mcp_compose_core::error::ComposeError;
use mcp_compose_core::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use mcp_compose_core::protocol::methods;
use mcp_compose_core::types::ToolCallResponse;
use mcp_compose_session::session::CallError;
use mcp_compose_session::BackendSession;

use crate::openapi;
use crate::server::ProxyState;

const REALM: &str = "mcp-compose";

/// 401/403 with the standard OAuth error body and `WWW-Authenticate` on 401.
pub(crate) fn auth_error_response(err: &AuthError) -> Response {
    let status = match err {
        AuthError::MissingScope { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::UNAUTHORIZED,
    };
    let body = json!({
        "error": err.oauth_error_code(),
        "error_description": err.to_string(),
    });
    let mut response = (status, Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
        if let Ok(value) = format!("Bearer realm=\"{REALM}\"").parse() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
    }
    response
}

/// Translate a failed bridged call onto HTTP.
pub(crate) fn call_error_response(err: CallError) -> Response {
    match err {
        CallError::Rpc(rpc) => {
            let status = match rpc.code {
                -32601 => StatusCode::NOT_FOUND,
                -32602 => StatusCode::BAD_REQUEST,
                -32603 => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = json!({"error": rpc.message, "code": rpc.code});
            let mut response = (status, Json(body)).into_response();
            if let Ok(value) = rpc.code.to_string().parse() {
                response.headers_mut().insert("x-mcp-error-code", value);
            }
            response
        }
        CallError::Compose(ComposeError::Timeout(deadline)) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({
                "error": "upstream_timeout",
                "error_description": format!("backend did not answer within {deadline:?}"),
            })),
        )
            .into_response(),
        CallError::Compose(ComposeError::RateLimit(message)) => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": "rate_limited", "error_description": message})),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from_static("1"));
            response
        }
        CallError::Compose(other) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "upstream_error",
                "error_description": other.to_string(),
            })),
        )
            .into_response(),
    }
}

fn not_ready_response(server: &str) -> Response {
    let mut response = (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "server_not_ready",
            "error_description": format!("session '{server}' is not ready"),
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, header::HeaderValue::from_static("2"));
    response
}

fn unknown_server_response(server: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "unknown_server",
            "error_description": format!("no server named '{server}' in the manifest"),
        })),
    )
        .into_response()
}

/// Authenticate and scope-check one request against a server's policy.
/// `Ok(None)` means the policy waives authentication.
async fn authorize_request(
    state: &ProxyState,
    headers: &HeaderMap,
    policy: &AuthPolicy,
) -> Result<Option<AuthContext>, Response> {
    if !policy.required {
        return Ok(None);
    }
    let context = state
        .middleware
        .authenticate(headers)
        .await
        .map_err(|e| auth_error_response(&e))?;
    state
        .middleware
        .require_scope(&context, &policy.scope)
        .map_err(|e| auth_error_response(&e))?;
    Ok(Some(context))
}

async fn server_policy(state: &ProxyState, server: &str) -> Option<AuthPolicy> {
    let config = state.config.read().await;
    config.servers.get(server).map(|s| s.authentication.clone())
}

async fn ready_session(
    state: &ProxyState,
    server: &str,
) -> Result<Arc<BackendSession>, Response> {
    let session = state
        .manager
        .get(server)
        .await
        .ok_or_else(|| unknown_server_response(server))?;
    if !session.is_ready().await {
        return Err(not_ready_response(server));
    }
    Ok(session)
}

async fn request_deadline(state: &ProxyState) -> Duration {
    let config = state.config.read().await;
    Duration::from_secs(config.connections.request_timeout_secs)
}

/// `GET /` — plain HTML fleet listing.
pub async fn dashboard(State(state): State<Arc<ProxyState>>) -> Html<String> {
    let snapshots = state.manager.snapshots().await;
    let mut rows = String::new();
    for snapshot in snapshots {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:?}</td></tr>",
            snapshot.name, snapshot.transport, snapshot.state
        ));
    }
    Html(format!(
        "<!doctype html><html><head><title>mcp-compose</title></head><body>\
         <h1>mcp-compose</h1>\
         <table><tr><th>server</th><th>transport</th><th>state</th></tr>{rows}</table>\
         </body></html>"
    ))
}

/// `GET /api/servers` — session status and capabilities.
pub async fn api_servers(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize_request(&state, &headers, &AuthPolicy::default()).await {
        return response;
    }
    let snapshots = state.manager.snapshots().await;
    Json(json!({ "servers": snapshots })).into_response()
}

/// `GET /api/discovery` — merged tool/resource/prompt inventory.
pub async fn api_discovery(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize_request(&state, &headers, &AuthPolicy::default()).await {
        return response;
    }
    Json(state.discovery.inventory().await).into_response()
}

/// `POST /api/discovery/refresh` — drop the inventory cache.
pub async fn api_discovery_refresh(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize_request(&state, &headers, &AuthPolicy::default()).await {
        return response;
    }
    state.discovery.invalidate().await;
    StatusCode::NO_CONTENT.into_response()
}

/// `POST /api/reload` — re-read the manifest and swap sessions.
pub async fn api_reload(State(state): State<Arc<ProxyState>>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize_request(&state, &headers, &AuthPolicy::default()).await {
        return response;
    }
    match state.reload.reload().await {
        Ok(report) => {
            state.discovery.invalidate().await;
            Json(report).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "reload_failed", "error_description": e.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub server: String,
    pub uri: String,
    #[serde(default = "default_subscribe")]
    pub action: String,
}

fn default_subscribe() -> String {
    "subscribe".to_string()
}

/// `GET /api/subscriptions` — active resource subscriptions.
pub async fn api_subscriptions_list(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
) -> Response {
    let policy = AuthPolicy {
        required: true,
        scope: "mcp:resources".to_string(),
    };
    if let Err(response) = authorize_request(&state, &headers, &policy).await {
        return response;
    }
    let subscriptions = state.subscriptions.read().await;
    let list: Vec<Value> = subscriptions
        .iter()
        .map(|(server, uri)| json!({"server": server, "uri": uri}))
        .collect();
    Json(json!({ "subscriptions": list })).into_response()
}

/// `POST /api/subscriptions` — subscribe or unsubscribe a resource.
pub async fn api_subscriptions_change(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
    Json(request): Json<SubscriptionRequest>,
) -> Response {
    if !state.settings.enable_subscriptions {
        return (
            StatusCode::NOT_IMPLEMENTED,
            Json(json!({"error": "subscriptions_disabled"})),
        )
            .into_response();
    }
    let policy = AuthPolicy {
        required: true,
        scope: "mcp:resources".to_string(),
    };
    if let Err(response) = authorize_request(&state, &headers, &policy).await {
        return response;
    }
    let session = match ready_session(&state, &request.server).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let method = match request.action.as_str() {
        "subscribe" => methods::RESOURCES_SUBSCRIBE,
        "unsubscribe" => methods::RESOURCES_UNSUBSCRIBE,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_action", "error_description": other})),
            )
                .into_response()
        }
    };
    let deadline = request_deadline(&state).await;
    match session
        .call(method, Some(json!({"uri": request.uri})), Some(deadline))
        .await
    {
        Ok(_) => {
            let mut subscriptions = state.subscriptions.write().await;
            let key = (request.server.clone(), request.uri.clone());
            if request.action == "subscribe" {
                subscriptions.insert(key);
            } else {
                subscriptions.remove(&key);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => call_error_response(e),
    }
}

/// `GET /openapi.json` — aggregated OpenAPI across the fleet.
pub async fn aggregate_openapi(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize_request(&state, &headers, &AuthPolicy::default()).await {
        return response;
    }
    let snapshot = state.discovery.inventory().await;
    Json(openapi::aggregate_document(&snapshot, &state.issuer)).into_response()
}

/// `GET /{server}/openapi.json` — one server's OpenAPI.
pub async fn server_openapi(
    State(state): State<Arc<ProxyState>>,
    Path(server): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize_request(&state, &headers, &AuthPolicy::default()).await {
        return response;
    }
    let snapshot = state.discovery.inventory().await;
    let Some(inventory) = snapshot.servers.iter().find(|s| s.name == server) else {
        return unknown_server_response(&server);
    };
    Json(openapi::server_document(
        &server,
        &inventory.tools,
        &state.issuer,
    ))
    .into_response()
}

/// `POST /{server}` — forward a raw JSON-RPC body.
pub async fn forward_raw(
    State(state): State<Arc<ProxyState>>,
    Path(server): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(policy) = server_policy(&state, &server).await else {
        return unknown_server_response(&server);
    };
    if let Err(response) = authorize_request(&state, &headers, &policy).await {
        return response;
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_json_rpc", "error_description": e.to_string()})),
            )
                .into_response()
        }
    };

    let session = match ready_session(&state, &server).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    if request.is_notification() {
        return match session.notify(&request.method, request.params).await {
            Ok(()) => StatusCode::ACCEPTED.into_response(),
            Err(e) => call_error_response(CallError::Compose(e)),
        };
    }

    let deadline = request_deadline(&state).await;
    let id = request.id.clone();
    match session
        .call(&request.method, request.params, Some(deadline))
        .await
    {
        Ok(result) => Json(JsonRpcResponse::success(result, id)).into_response(),
        // JSON-RPC errors ride back in the envelope with a 200, like any
        // compliant JSON-RPC-over-HTTP endpoint
        Err(CallError::Rpc(rpc)) => Json(JsonRpcResponse::error(rpc, id)).into_response(),
        Err(other) => call_error_response(other),
    }
}

/// `POST /{server}/{tool}` — body is the tool's arguments; the bridge wraps
/// it as `tools/call` and strips the MCP envelope from the result.
pub async fn call_tool(
    State(state): State<Arc<ProxyState>>,
    Path((server, tool)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // basic protocol mode serves raw JSON-RPC forwarding only
    if !state.settings.enhanced {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "not_found",
                "error_description": "tool routes require enhanced protocol mode",
            })),
        )
            .into_response();
    }
    let Some(policy) = server_policy(&state, &server).await else {
        return unknown_server_response(&server);
    };
    if let Err(response) = authorize_request(&state, &headers, &policy).await {
        return response;
    }

    let arguments: Value = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_arguments",
                        "error_description": e.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    };

    let session = match ready_session(&state, &server).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let deadline = request_deadline(&state).await;

    let wants_progress = state.settings.enable_progress
        && headers
            .get("x-mcp-progress")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
    if wants_progress {
        return stream_tool_call(session, tool, arguments, deadline).await;
    }

    let params = json!({"name": tool, "arguments": arguments});
    match session
        .call(methods::TOOLS_CALL, Some(params), Some(deadline))
        .await
    {
        Ok(result) => tool_result_response(&server, &tool, result),
        Err(e) => {
            debug!(server = %server, tool = %tool, "tool call failed: {e}");
            call_error_response(e)
        }
    }
}

fn tool_result_response(server: &str, tool: &str, result: Value) -> Response {
    match serde_json::from_value::<ToolCallResponse>(result.clone()) {
        Ok(response) => {
            if response.is_error == Some(true) {
                warn!(server = %server, tool = %tool, "tool reported an error result");
            }
            Json(response.content).into_response()
        }
        // a non-conforming backend still gets its payload through
        Err(_) => Json(result).into_response(),
    }
}

/// Progress-streaming variant: SSE with `progress` events for each MCP
/// progress notification, then one `result` or `error` event.
async fn stream_tool_call(
    session: Arc<BackendSession>,
    tool: String,
    arguments: Value,
    deadline: Duration,
) -> Response {
    let token = Uuid::new_v4().to_string();
    let mut progress_rx = session.register_progress(&token).await;
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(32);

    tokio::spawn(async move {
        let params = json!({
            "name": tool,
            "arguments": arguments,
            "_meta": {"progressToken": token.clone()},
        });
        let call = session.call(methods::TOOLS_CALL, Some(params), Some(deadline));
        tokio::pin!(call);
        loop {
            tokio::select! {
                progress = progress_rx.recv() => {
                    if let Some(progress) = progress {
                        if let Ok(event) = Event::default().event("progress").json_data(&progress) {
                            if event_tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                result = &mut call => {
                    let event = match result {
                        Ok(value) => Event::default().event("result").json_data(&value),
                        Err(e) => Event::default()
                            .event("error")
                            .json_data(&json!({"error": e.to_string()})),
                    };
                    if let Ok(event) = event {
                        let _ = event_tx.send(Ok(event)).await;
                    }
                    break;
                }
            }
        }
        session.unregister_progress(&token).await;
    });

    Sse::new(ReceiverStream::new(event_rx)).into_response()
}
