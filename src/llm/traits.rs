//! Provider trait for abstracting different model backends
//!
//! Enables swapping between Anthropic, OpenAI-compatible and scripted providers.

use async_trait::async_trait;

use crate::agent::ConversationState;
use crate::core::{Result, ToolDeclaration, ToolInvocationRequest};

/// Reply from a provider: commentary and/or tool calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderReply {
    /// Text blocks, in the order the model produced them
    pub text_segments: Vec<String>,
    /// Tool calls, in the order the model produced them
    pub tool_requests: Vec<ToolInvocationRequest>,
}

impl ProviderReply {
    /// A plain text reply
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_segments: vec![text.into()],
            tool_requests: Vec::new(),
        }
    }

    /// A reply carrying only tool calls
    pub fn tools(tool_requests: Vec<ToolInvocationRequest>) -> Self {
        Self {
            text_segments: Vec::new(),
            tool_requests,
        }
    }

    /// Add commentary to the reply
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_segments.push(text.into());
        self
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }
}

/// Request-scoped hint asking the transport to reuse the processed prefix.
/// It only decorates the outgoing payload; the conversation is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheHint {
    #[default]
    None,
    /// Mark the most recent turn as the end of the cacheable prefix
    LastTurn,
}

/// Everything a provider needs for one call
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub state: &'a ConversationState,
    pub tools: &'a [ToolDeclaration],
    pub cache_hint: CacheHint,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(state: &'a ConversationState, tools: &'a [ToolDeclaration]) -> Self {
        Self {
            state,
            tools,
            cache_hint: CacheHint::None,
        }
    }

    pub fn with_cache_hint(mut self, cache_hint: CacheHint) -> Self {
        self.cache_hint = cache_hint;
        self
    }
}

/// Trait for model providers
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Produce the next agent reply for the conversation.
    /// Any failure is fatal for the conversation and is not retried.
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderReply>;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Model identifier used for requests
    fn model(&self) -> &str;
}
