//! OpenAI-compatible Chat Completions provider
//!
//! Tool results travel as `role: "tool"` messages. Caching hints are ignored;
//! these endpoints cache prefixes on their own.

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
use crate::llm::traits::{CompletionRequest, ProviderClient, ProviderReply};

/// OpenAI-compatible API client
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout_secs: u64,
    credentials: Credentials,
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    /// Null is allowed on assistant messages that only call tools
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDefinition<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

/// Chat completion response (only the parts we use)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl OpenAiClient {
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
            timeout_secs: config.timeout_secs,
            credentials,
        })
    }

    fn build_request<'a>(&'a self, request: &CompletionRequest<'a>) -> ChatRequest<'a> {
        let mut messages = vec![ChatMessage::plain(
            "system",
            request.state.system_instruction(),
        )];
        for turn in request.state.turns() {
            push_turn(&mut messages, turn);
        }

        let tools: Vec<FunctionTool<'a>> = request.tools.iter().map(to_function_tool).collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");

        ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice,
            max_tokens: self.max_tokens,
        }
    }
}

fn to_function_tool(declaration: &ToolDeclaration) -> FunctionTool<'_> {
    FunctionTool {
        kind: "function",
        function: FunctionDefinition {
            name: &declaration.name,
            description: &declaration.description,
            parameters: &declaration.input_schema,
        },
    }
}

/// A turn can expand to several chat messages: each tool result is its own
/// `tool` message.
fn push_turn(messages: &mut Vec<ChatMessage>, turn: &Turn) {
    match turn.role {
        Role::Agent => {
            let text = turn.text();
            let tool_calls: Vec<WireToolCall> = turn
                .tool_requests()
                .map(|req| WireToolCall {
                    id: req.id.clone(),
                    kind: function_type(),
                    function: WireFunction {
                        name: req.tool_name.clone(),
                        arguments: req.arguments.to_string(),
                    },
                })
                .collect();
            messages.push(ChatMessage {
                role: "assistant",
                content: (!text.is_empty() || tool_calls.is_empty()).then_some(text),
                tool_calls,
                tool_call_id: None,
            });
        }
        Role::Human => {
            for segment in &turn.segments {
                match segment {
                    Segment::Text { text } => messages.push(ChatMessage::plain("user", text.clone())),
                    Segment::ToolResult(res) => messages.push(ChatMessage {
                        role: "tool",
                        content: Some(res.content.clone()),
                        tool_calls: Vec::new(),
                        tool_call_id: Some(res.request_id.clone()),
                    }),
                    Segment::ToolRequest(_) => {}
                }
            }
        }
    }
}

fn to_reply(response: ChatResponse) -> Result<ProviderReply> {
    let mut reply = ProviderReply::default();
    for choice in response.choices {
        for call in choice.message.tool_calls.unwrap_or_default() {
            let arguments = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    ParleyError::provider(format!(
                        "Malformed arguments for tool call '{}': {}",
                        call.function.name, e
                    ))
                })?
            };
            reply
                .tool_requests
                .push(ToolInvocationRequest::new(call.id, call.function.name, arguments));
        }
        if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
            reply.text_segments.push(content);
        }
    }
    Ok(reply)
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderReply> {
        let body = self.build_request(&request);
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.credentials.api_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, &self.base_url, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ParleyError::provider(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| transport_error(e, &self.base_url, self.timeout_secs))?;

        let parsed: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ParleyError::provider(format!("Failed to parse response: {}", e)))?;

        to_reply(parsed)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
