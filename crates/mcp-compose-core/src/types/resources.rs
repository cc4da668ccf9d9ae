//! Resource definitions (MCP `resources/*`).

use serde::{Deserialize, Serialize};

/// A resource advertised by a backend via `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub uri: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// `resources/list` result payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListResourcesResponse {
    pub resources: Vec<Resource>,

    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_parses() {
        let res: Resource = serde_json::from_value(json!({
            "uri": "file:///data/report.txt",
            "name": "report",
            "mimeType": "text/plain"
        }))
        .unwrap();
        assert_eq!(res.mime_type.as_deref(), Some("text/plain"));
    }
}
