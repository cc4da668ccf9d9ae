//! Scripted stdio backends.
//!
//! A shell one-liner stands in for an MCP server: it answers `initialize`
//! (request id 1), swallows the `notifications/initialized` line, then plays
//! back one prepared reply per subsequent request. Ids are deterministic
//! because each session numbers requests from 1.

use mcp_compose_session::TransportConfig;
use serde_json::json;

/// JSON the mock returns for `initialize`.
pub fn initialize_reply() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "protocolVersion": "2025-06-18",
            "capabilities": {"tools": {}, "resources": {"subscribe": true}},
            "serverInfo": {"name": "mock", "version": "0.0.0"}
        }
    })
    .to_string()
}

/// A backend that completes the handshake and then answers each further
/// request with the next entry of `replies` (full JSON-RPC response lines;
/// the first such request has id 2).
pub fn scripted_backend(replies: &[String]) -> TransportConfig {
    let mut script = format!(
        "read _r; printf '%s\\n' '{}'; read _n; ",
        initialize_reply()
    );
    for reply in replies {
        script.push_str(&format!("read _r; printf '%s\\n' '{reply}'; "));
    }
    script.push_str("cat >/dev/null");
    TransportConfig::Stdio {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script],
        env: Default::default(),
    }
}

/// A backend that only completes the handshake; every later call times out.
pub fn handshake_only_backend() -> TransportConfig {
    scripted_backend(&[])
}

/// Reply for a `tools/call` carrying a single text content element.
pub fn tool_result_reply(id: i64, text: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"content": [{"type": "text", "text": text}]}
    })
    .to_string()
}

/// Reply failing a request with a JSON-RPC error.
pub fn error_reply(id: i64, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message}
    })
    .to_string()
}

/// Reply for a `tools/list` advertising one `get_forecast` tool.
pub fn forecast_tools_reply(id: i64) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"tools": [{
            "name": "get_forecast",
            "description": "Forecast for a location",
            "inputSchema": {
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            },
            "annotations": {"readOnlyHint": true}
        }]}
    })
    .to_string()
}
