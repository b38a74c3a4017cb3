//! Shared types used across Parley modules
//!
//! Turns, segments, tool declarations and execution reports.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of the conversation a turn belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Human => write!(f, "human"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// A tool call made by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Provider-assigned id, echoed back in the matching result
    pub id: String,
    /// Name of the tool to invoke
    pub tool_name: String,
    /// JSON arguments for the tool
    pub arguments: Value,
}

impl ToolInvocationRequest {
    /// Create a new tool request
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Get a string argument by key
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Output of a tool call, keyed by the request it answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub request_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolInvocationResult {
    pub fn success(request_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(request_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Atomic unit of content inside a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    ToolRequest(ToolInvocationRequest),
    ToolResult(ToolInvocationResult),
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// One role-attributed entry in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub segments: Vec<Segment>,
}

impl Turn {
    /// A human turn holding a single line of text
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            segments: vec![Segment::text(text)],
        }
    }

    /// An agent turn built from a provider reply, text first
    pub fn agent(text_segments: &[String], tool_requests: &[ToolInvocationRequest]) -> Self {
        let segments = text_segments
            .iter()
            .map(|t| Segment::text(t.clone()))
            .chain(tool_requests.iter().cloned().map(Segment::ToolRequest))
            .collect();
        Self {
            role: Role::Agent,
            segments,
        }
    }

    /// A turn synthesized from tool results. It sits on the human side of
    /// the exchange even though no human typed it.
    pub fn tool_results(results: Vec<ToolInvocationResult>) -> Self {
        Self {
            role: Role::Human,
            segments: results.into_iter().map(Segment::ToolResult).collect(),
        }
    }

    /// Tool requests carried by this turn, in order
    pub fn tool_requests(&self) -> impl Iterator<Item = &ToolInvocationRequest> {
        self.segments.iter().filter_map(|s| match s {
            Segment::ToolRequest(r) => Some(r),
            _ => None,
        })
    }

    /// Tool results carried by this turn, in order
    pub fn tool_results_iter(&self) -> impl Iterator<Item = &ToolInvocationResult> {
        self.segments.iter().filter_map(|s| match s {
            Segment::ToolResult(r) => Some(r),
            _ => None,
        })
    }

    /// Concatenated text segments
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Definition of a tool advertised to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique name the provider uses to call the tool
    pub name: String,
    /// What the tool does, shown to the model
    pub description: String,
    /// JSON Schema for the arguments
    pub input_schema: Value,
}

impl ToolDeclaration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Names listed under the schema's `required` key
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Why a tool run did not produce a normal exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The deadline passed and the process was killed
    Timeout,
    /// The backend could not be started
    SpawnError(String),
    /// The provider's arguments did not fit the tool's schema
    InvalidArguments(String),
}

/// Normalized outcome of running a command-style tool
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionReport {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
    pub failure: Option<FailureKind>,
    /// Timeout that was in force, used when rendering a timeout
    pub timeout: Duration,
}

impl ExecutionReport {
    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            failure: Some(FailureKind::SpawnError(message.into())),
            ..Default::default()
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self {
            failure: Some(FailureKind::InvalidArguments(message.into())),
            ..Default::default()
        }
    }

    /// True when the command ran to completion with exit status 0
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.exit_status == Some(0)
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.failure, Some(FailureKind::Timeout))
    }

    /// Render the report as the text the provider sees
    pub fn render(&self) -> String {
        match &self.failure {
            Some(FailureKind::SpawnError(msg)) | Some(FailureKind::InvalidArguments(msg)) => {
                format!("Error executing command: {}", msg)
            }
            Some(FailureKind::Timeout) => format!(
                "STDOUT:\n{}\nSTDERR:\n{}\nTIMED OUT after {}",
                self.stdout,
                self.stderr,
                format_timeout(self.timeout)
            ),
            None => {
                let code = self
                    .exit_status
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none (terminated by signal)".to_string());
                format!(
                    "STDOUT:\n{}\nSTDERR:\n{}\nEXIT CODE: {}",
                    self.stdout, self.stderr, code
                )
            }
        }
    }

    /// Fold the report into a result segment for `request_id`
    pub fn into_result(self, request_id: &str) -> ToolInvocationResult {
        let content = self.render();
        if self.succeeded() {
            ToolInvocationResult::success(request_id, content)
        } else {
            ToolInvocationResult::error(request_id, content)
        }
    }
}

/// Whole seconds as `10s`, anything finer as `300ms`
fn format_timeout(timeout: Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}
