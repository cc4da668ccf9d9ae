//! OpenAPI 3.1 generation from MCP tool inventories.
//!
//! Each tool becomes a `POST /{server}/{tool}` operation whose request body
//! is the tool's JSON Schema verbatim. MCP behavior hints ride along as
//! `x-mcp-hints`, and every operation references the `MCPBearerAuth`
//! security scheme pointing at the proxy's own authorization server.

use serde_json::{json, Map, Value};

use mcp_compose_core::types::Tool;

use crate::discovery::DiscoverySnapshot;

/// OpenAPI document for one server's tools.
pub fn server_document(server: &str, tools: &[Tool], issuer: &str) -> Value {
    let mut paths = Map::new();
    for tool in tools {
        paths.insert(
            format!("/{server}/{}", tool.name),
            tool_path_item(server, tool),
        );
    }
    document(
        format!("{server} (via mcp-compose)"),
        Value::Object(paths),
        issuer,
    )
}

/// One document across every server.
pub fn aggregate_document(snapshot: &DiscoverySnapshot, issuer: &str) -> Value {
    let mut paths = Map::new();
    for server in &snapshot.servers {
        for tool in &server.tools {
            paths.insert(
                format!("/{}/{}", server.name, tool.name),
                tool_path_item(&server.name, tool),
            );
        }
    }
    document("mcp-compose fleet".to_string(), Value::Object(paths), issuer)
}

fn document(title: String, paths: Value, issuer: &str) -> Value {
    json!({
        "openapi": "3.1.0",
        "info": {
            "title": title,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
        "components": {
            "securitySchemes": {
                "MCPBearerAuth": {
                    "type": "http",
                    "scheme": "bearer",
                    "description": format!(
                        "OAuth 2.1 bearer token issued by {issuer}/oauth/token"
                    ),
                }
            }
        },
        "security": [{"MCPBearerAuth": []}],
    })
}

fn tool_path_item(server: &str, tool: &Tool) -> Value {
    let mut operation = Map::new();
    operation.insert("operationId".to_string(), json!(format!("{server}_{}", tool.name)));
    operation.insert("summary".to_string(), json!(tool.description));
    operation.insert("tags".to_string(), json!([server]));
    operation.insert(
        "requestBody".to_string(),
        json!({
            "required": true,
            "content": {"application/json": {"schema": tool.input_schema}}
        }),
    );
    operation.insert(
        "responses".to_string(),
        json!({
            "200": {
                "description": "Tool result content array",
                "content": {"application/json": {"schema": {"type": "array"}}}
            },
            "404": {"description": "Unknown tool"},
            "503": {"description": "Backend session not ready"}
        }),
    );
    if let Some(annotations) = &tool.annotations {
        operation.insert(
            "x-mcp-hints".to_string(),
            json!({
                "readOnly": annotations.read_only_hint,
                "destructive": annotations.destructive_hint,
                "idempotent": annotations.idempotent_hint,
                "openWorld": annotations.open_world_hint,
            }),
        );
    }
    json!({ "post": Value::Object(operation) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_compose_core::types::ToolAnnotations;
    use serde_json::json;

    fn forecast_tool() -> Tool {
        Tool {
            name: "get_forecast".to_string(),
            description: "Forecast for a location".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            }),
            output_schema: None,
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(true),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn server_document_shapes_paths_and_hints() {
        let doc = server_document("weather", &[forecast_tool()], "http://localhost:9876");
        assert_eq!(doc["openapi"], "3.1.0");
        let op = &doc["paths"]["/weather/get_forecast"]["post"];
        assert_eq!(op["operationId"], "weather_get_forecast");
        assert_eq!(
            op["requestBody"]["content"]["application/json"]["schema"]["required"][0],
            "location"
        );
        assert_eq!(op["x-mcp-hints"]["readOnly"], true);
        assert!(doc["components"]["securitySchemes"]["MCPBearerAuth"]["description"]
            .as_str()
            .unwrap()
            .contains("http://localhost:9876"));
    }

    #[test]
    fn aggregate_covers_all_servers() {
        use crate::discovery::{HealthStatus, ServerInventory};
        use mcp_compose_session::SessionState;
        let snapshot = DiscoverySnapshot {
            servers: vec![
                ServerInventory {
                    name: "weather".to_string(),
                    state: SessionState::Ready,
                    health: HealthStatus::Healthy,
                    tools: vec![forecast_tool()],
                    resources: vec![],
                    prompts: vec![],
                },
                ServerInventory {
                    name: "files".to_string(),
                    state: SessionState::Ready,
                    health: HealthStatus::Healthy,
                    tools: vec![Tool {
                        name: "read".to_string(),
                        description: String::new(),
                        input_schema: json!({"type": "object"}),
                        output_schema: None,
                        annotations: None,
                    }],
                    resources: vec![],
                    prompts: vec![],
                },
            ],
        };
        let doc = aggregate_document(&snapshot, "http://localhost:9876");
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/weather/get_forecast"));
        assert!(paths.contains_key("/files/read"));
    }
}
