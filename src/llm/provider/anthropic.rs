//! Anthropic Messages API provider
//!
//! Maps turns onto `user`/`assistant` messages with `text`, `tool_use` and
//! `tool_result` content blocks.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::core::config::ProviderConfig;
use crate::core::{
    Credentials, ParleyError, Result, Role, Segment, ToolDeclaration, ToolInvocationRequest, Turn,
};
use crate::llm::provider::transport_error;
use crate::llm::traits::{CacheHint, CompletionRequest, ProviderClient, ProviderReply};

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    api_version: String,
    timeout_secs: u64,
    credentials: Credentials,
}

/// Messages API request body
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Clone, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "is_false")]
        is_error: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ContentBlock {
    fn set_cache_control(&mut self) {
        let marker = Some(CacheControl { kind: "ephemeral" });
        match self {
            ContentBlock::Text { cache_control, .. }
            | ContentBlock::ToolUse { cache_control, .. }
            | ContentBlock::ToolResult { cache_control, .. } => *cache_control = marker,
        }
    }
}

/// Messages API response body (only the parts we use)
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl AnthropicClient {
    /// Create a client from provider configuration
    pub fn from_config(config: &ProviderConfig, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ParleyError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            model: config.model().to_string(),
            max_tokens: config.max_tokens(),
            api_version: config.anthropic_version.clone(),
            timeout_secs: config.timeout_secs,
            credentials,
        })
    }

    /// Build the wire request. The cache marker is applied here, on the
    /// payload, so there is nothing to undo afterwards.
    fn build_request<'a>(&'a self, request: &CompletionRequest<'a>) -> MessagesRequest<'a> {
        let mut messages: Vec<WireMessage> =
            request.state.turns().iter().map(to_wire_message).collect();

        if request.cache_hint == CacheHint::LastTurn {
            if let Some(block) = messages.last_mut().and_then(|m| m.content.last_mut()) {
                block.set_cache_control();
            }
        }

        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: request.state.system_instruction(),
            messages,
            tools: request.tools.iter().map(to_wire_tool).collect(),
        }
    }
}

fn to_wire_tool(declaration: &ToolDeclaration) -> WireTool<'_> {
    WireTool {
        name: &declaration.name,
        description: &declaration.description,
        input_schema: &declaration.input_schema,
    }
}

fn to_wire_message(turn: &Turn) -> WireMessage {
    let mut content: Vec<ContentBlock> = turn
        .segments
        .iter()
        .filter_map(|segment| match segment {
            // The API rejects empty text blocks
            Segment::Text { text } if text.is_empty() => None,
            Segment::Text { text } => Some(ContentBlock::Text {
                text: text.clone(),
                cache_control: None,
            }),
            Segment::ToolRequest(req) => Some(ContentBlock::ToolUse {
                id: req.id.clone(),
                name: req.tool_name.clone(),
                input: req.arguments.clone(),
                cache_control: None,
            }),
            Segment::ToolResult(res) => Some(ContentBlock::ToolResult {
                tool_use_id: res.request_id.clone(),
                content: res.content.clone(),
                is_error: res.is_error,
                cache_control: None,
            }),
        })
        .collect();

    if content.is_empty() {
        content.push(ContentBlock::Text {
            text: "(no content)".to_string(),
            cache_control: None,
        });
    }

    WireMessage {
        role: match turn.role {
            Role::Human => "user",
            Role::Agent => "assistant",
        },
        content,
    }
}

fn to_reply(response: MessagesResponse) -> ProviderReply {
    let mut reply = ProviderReply::default();
    for block in response.content {
        match block {
            ResponseBlock::Text { text } => reply.text_segments.push(text),
            ResponseBlock::ToolUse { id, name, input } => {
                let arguments = if input.is_null() {
                    Value::Object(Default::default())
                } else {
                    input
                };
                reply
                    .tool_requests
                    .push(ToolInvocationRequest::new(id, name, arguments));
            }
            ResponseBlock::Other => {}
        }
    }
    reply
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderReply> {
        let body = self.build_request(&request);
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "sending messages request"
        );

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.credentials.api_key())
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, &self.base_url, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ParleyError::provider(format!(
                "Anthropic API error ({}): {}",
                status, error_text
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| transport_error(e, &self.base_url, self.timeout_secs))?;

        let parsed: MessagesResponse = serde_json::from_str(&response_text)
            .map_err(|e| ParleyError::provider(format!("Failed to parse response: {}", e)))?;

        debug!(
            blocks = parsed.content.len(),
            stop_reason = ?parsed.stop_reason,
            "received messages response"
        );

        Ok(to_reply(parsed))
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ConversationState;
    use crate::core::{ProviderKind, ToolInvocationResult};
    use serde_json::json;

    fn client() -> AnthropicClient {
        let config = ProviderConfig {
            kind: ProviderKind::Anthropic,
            model: None,
            max_tokens: None,
            ..ProviderConfig::default()
        };
        AnthropicClient::from_config(&config, Credentials::new("test-key")).unwrap()
    }

    fn state_with_tool_round() -> ConversationState {
        let mut state = ConversationState::new("system text");
        state.append(Turn::human("what day is it?"));
        state.append(Turn::agent(
            &["Checking.".to_string()],
            &[ToolInvocationRequest::new("toolu_1", "bash", json!({"command": "date"}))],
        ));
        state.append(Turn::tool_results(vec![ToolInvocationResult::success(
            "toolu_1", "STDOUT:\nMon",
        )]));
        state
    }

    #[test]
    fn test_request_shape() {
        let client = client();
        let state = state_with_tool_round();
        let tools = vec![ToolDeclaration::new("bash", "run", json!({"type": "object"}))];
        let request = CompletionRequest::new(&state, &tools);

        let body = serde_json::to_value(client.build_request(&request)).unwrap();
        assert_eq!(body["system"], "system text");
        assert_eq!(body["max_tokens"], 20_000);
        assert_eq!(body["tools"][0]["name"], "bash");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][0]["type"], "text");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["input"]["command"], "date");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
        assert!(messages[2]["content"][0].get("is_error").is_none());
        assert!(messages[2]["content"][0].get("cache_control").is_none());
    }

    #[test]
    fn test_cache_hint_marks_only_the_payload() {
        let client = client();
        let state = state_with_tool_round();
        let request = CompletionRequest::new(&state, &[]).with_cache_hint(CacheHint::LastTurn);

        let body = serde_json::to_value(client.build_request(&request)).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(
            messages[2]["content"][0]["cache_control"],
            json!({"type": "ephemeral"})
        );
        assert!(messages[0]["content"][0].get("cache_control").is_none());
        assert!(body.get("tools").is_none());

        // A second build without the hint carries no marker at all
        let plain = CompletionRequest::new(&state, &[]);
        let body = serde_json::to_value(client.build_request(&plain)).unwrap();
        assert!(!body.to_string().contains("cache_control"));
    }

    #[test]
    fn test_empty_agent_turn_gets_placeholder() {
        let turn = Turn::agent(&[String::new()], &[]);
        let message = serde_json::to_value(to_wire_message(&turn)).unwrap();
        assert_eq!(message["content"][0]["text"], "(no content)");
    }

    #[test]
    fn test_parse_mixed_response() {
        let raw = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_9", "name": "sql", "input": {"query": "select 1"}}
            ],
            "stop_reason": "tool_use"
        });
        let parsed: MessagesResponse = serde_json::from_value(raw).unwrap();
        let reply = to_reply(parsed);

        assert_eq!(reply.text_segments, vec!["Let me look."]);
        assert_eq!(reply.tool_requests.len(), 1);
        assert_eq!(reply.tool_requests[0].id, "toolu_9");
        assert_eq!(reply.tool_requests[0].get_string("query"), Some("select 1"));
    }
}
