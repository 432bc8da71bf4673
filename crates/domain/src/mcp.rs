//! Tool-endpoint descriptors persisted on a task.
//!
//! Opaque to the control plane: recorded at creation, handed to the LLM
//! facade at execution time, never interpreted here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One remote tool server the model may call during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServerInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Map of server name to endpoint, as stored in `tasks.mcp_server_infos`.
pub type McpServerInfos = BTreeMap<String, McpServerInfo>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialises_sparse_entries() {
        let infos: McpServerInfos = serde_json::from_str(
            r#"{"search":{"url":"https://tools.example/sse","headers":{"x-key":"k"}},"empty":{}}"#,
        )
        .unwrap();
        assert_eq!(
            infos["search"].url.as_deref(),
            Some("https://tools.example/sse")
        );
        assert!(infos["empty"].url.is_none());
        assert!(infos["empty"].headers.is_empty());
    }
}
