//! The facade trait and its OpenAI-compatible Responses-API adapter.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use ad_domain::config::LlmConfig;
use ad_domain::{Error, McpServerInfos, Result};

use crate::prompts::Phase;
use crate::usage::TokenUsage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One structured-generation call: prompt messages plus the tool servers
/// scoped to this run.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub phase: Phase,
    pub messages: Vec<ChatMessage>,
    pub mcp_servers: McpServerInfos,
}

impl LlmRequest {
    pub fn new(phase: Phase, messages: Vec<ChatMessage>) -> Self {
        Self {
            phase,
            messages,
            mcp_servers: McpServerInfos::new(),
        }
    }

    pub fn with_mcp_servers(mut self, servers: McpServerInfos) -> Self {
        self.mcp_servers = servers;
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Facade trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structured generation: prompt in, JSON text plus token counters out.
#[async_trait]
pub trait StructuredLlm: Send + Sync {
    async fn run_text(&self, request: LlmRequest) -> Result<(String, TokenUsage)>;
}

/// Run a phase and deserialise its JSON reply into the phase's output
/// struct. A reply that does not match the schema is an [`Error::Llm`].
pub async fn run_structured<T: DeserializeOwned>(
    llm: &dyn StructuredLlm,
    request: LlmRequest,
) -> Result<(T, TokenUsage)> {
    let phase = request.phase;
    let (text, usage) = llm.run_text(request).await?;
    let parsed = parse_structured(&text)
        .map_err(|e| Error::Llm(format!("{phase} reply did not match schema: {e}")))?;
    Ok((parsed, usage))
}

/// Parse a model reply as JSON, tolerating a markdown code fence around it.
fn parse_structured<T: DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OpenAI-compatible Responses adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiResponsesClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    config: LlmConfig,
}

impl OpenAiResponsesClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env_var = %config.api_key_env,
                "LLM API key env var not set; calls will fail"
            );
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Llm(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            config: config.clone(),
        })
    }

    fn build_body(&self, request: &LlmRequest) -> Value {
        let input: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "input": input,
            "text": { "format": { "type": "json_object" } },
        });

        // Tool servers are bound to exactly this request; nothing persists
        // between runs.
        let tools: Vec<Value> = request
            .mcp_servers
            .iter()
            .filter_map(|(name, info)| {
                info.url.as_ref().map(|url| {
                    json!({
                        "type": "mcp",
                        "server_label": name,
                        "server_url": url,
                        "headers": info.headers,
                    })
                })
            })
            .collect();
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }

        body
    }
}

#[async_trait]
impl StructuredLlm for OpenAiResponsesClient {
    async fn run_text(&self, request: LlmRequest) -> Result<(String, TokenUsage)> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Llm("no API key configured".into()))?;

        let timeout = self.config.timeout_for(request.phase.name());
        let body = self.build_body(&request);

        let response = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("{} request failed: {e}", request.phase)))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("{} bad response body: {e}", request.phase)))?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("no error detail");
            return Err(Error::Llm(format!(
                "{} returned {status}: {detail}",
                request.phase
            )));
        }

        let text = extract_output_text(&payload).ok_or_else(|| {
            Error::Llm(format!("{} reply had no output text", request.phase))
        })?;

        Ok((text, parse_usage(&payload)))
    }
}

/// Pull the first `output_text` block out of a Responses-API reply.
fn extract_output_text(payload: &Value) -> Option<String> {
    for item in payload["output"].as_array()? {
        if item["type"].as_str() != Some("message") {
            continue;
        }
        for part in item["content"].as_array()? {
            if part["type"].as_str() == Some("output_text") {
                if let Some(text) = part["text"].as_str() {
                    return Some(text.to_string());
                }
            }
        }
    }
    None
}

fn parse_usage(payload: &Value) -> TokenUsage {
    let usage = &payload["usage"];
    TokenUsage {
        input_tokens: usage["input_tokens"].as_u64().unwrap_or(0),
        output_tokens: usage["output_tokens"].as_u64().unwrap_or(0),
        cached_tokens: usage["input_tokens_details"]["cached_tokens"]
            .as_u64()
            .unwrap_or(0),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use ad_domain::McpServerInfo;

    fn sample_client() -> OpenAiResponsesClient {
        OpenAiResponsesClient {
            http: reqwest::Client::new(),
            base_url: "https://api.example/v1".into(),
            api_key: Some("k".into()),
            config: LlmConfig::default(),
        }
    }

    #[test]
    fn body_carries_messages_and_json_format() {
        let client = sample_client();
        let request = LlmRequest::new(
            Phase::Analyst,
            vec![ChatMessage::system("sys"), ChatMessage::user("hello")],
        );
        let body = client.build_body(&request);

        assert_eq!(body["model"], "gpt-4.1");
        assert_eq!(body["input"][0]["role"], "system");
        assert_eq!(body["input"][1]["content"], "hello");
        assert_eq!(body["text"]["format"]["type"], "json_object");
        assert!(body.get("tools").is_none(), "no tools without MCP servers");
    }

    #[test]
    fn body_attaches_mcp_servers_as_tools() {
        let client = sample_client();
        let mut servers = McpServerInfos::new();
        servers.insert(
            "search".into(),
            McpServerInfo {
                url: Some("https://tools.example/sse".into()),
                headers: [("x-key".to_string(), "v".to_string())].into(),
            },
        );
        servers.insert("broken".into(), McpServerInfo::default());

        let request =
            LlmRequest::new(Phase::UnitExecutor, vec![ChatMessage::user("go")])
                .with_mcp_servers(servers);
        let body = client.build_body(&request);

        let tools = body["tools"].as_array().unwrap();
        // Entries without a URL are dropped.
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["type"], "mcp");
        assert_eq!(tools[0]["server_label"], "search");
        assert_eq!(tools[0]["server_url"], "https://tools.example/sse");
        assert_eq!(tools[0]["headers"]["x-key"], "v");
    }

    #[test]
    fn extracts_output_text_from_reply() {
        let payload = json!({
            "output": [
                { "type": "reasoning", "content": [] },
                {
                    "type": "message",
                    "content": [
                        { "type": "output_text", "text": "{\"thinking\":\"ok\"}" }
                    ]
                }
            ],
            "usage": {
                "input_tokens": 120,
                "output_tokens": 30,
                "input_tokens_details": { "cached_tokens": 100 }
            }
        });
        assert_eq!(
            extract_output_text(&payload).as_deref(),
            Some("{\"thinking\":\"ok\"}")
        );
        let usage = parse_usage(&payload);
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 30);
        assert_eq!(usage.cached_tokens, 100);
    }

    #[test]
    fn missing_output_text_is_none() {
        let payload = json!({ "output": [], "usage": {} });
        assert!(extract_output_text(&payload).is_none());
        assert_eq!(parse_usage(&payload), TokenUsage::default());
    }

    #[test]
    fn parse_structured_tolerates_code_fences() {
        #[derive(Deserialize)]
        struct Out {
            thinking: String,
        }

        let plain: Out = parse_structured("{\"thinking\":\"a\"}").unwrap();
        assert_eq!(plain.thinking, "a");

        let fenced: Out =
            parse_structured("```json\n{\"thinking\":\"b\"}\n```").unwrap();
        assert_eq!(fenced.thinking, "b");

        let bare_fence: Out = parse_structured("```\n{\"thinking\":\"c\"}\n```").unwrap();
        assert_eq!(bare_fence.thinking, "c");

        assert!(parse_structured::<Out>("not json").is_err());
    }
}
