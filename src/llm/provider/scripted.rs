//! Scripted provider for tests and offline runs
//!
//! Replays queued replies in order and records what it was asked, so a test
//! can check the exact conversation each call saw.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::{ParleyError, Result, Turn};
use crate::llm::traits::{CacheHint, CompletionRequest, ProviderClient, ProviderReply};

/// One queued step
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(ProviderReply),
    Fail(String),
}

/// Snapshot of a single `complete` call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_instruction: String,
    pub turns: Vec<Turn>,
    pub tool_names: Vec<String>,
    pub cache_hint: CacheHint,
}

#[derive(Debug, Default)]
struct Inner {
    steps: VecDeque<ScriptStep>,
    calls: Vec<RecordedCall>,
}

/// Provider that answers from a script
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    inner: Mutex<Inner>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that replays `replies` in order
    pub fn with_replies(replies: impl IntoIterator<Item = ProviderReply>) -> Self {
        let provider = Self::new();
        for reply in replies {
            provider.push_reply(reply);
        }
        provider
    }

    pub fn push_reply(&self, reply: ProviderReply) {
        self.lock().steps.push_back(ScriptStep::Reply(reply));
    }

    /// Queue a provider failure
    pub fn push_failure(&self, message: impl Into<String>) {
        self.lock().steps.push_back(ScriptStep::Fail(message.into()));
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Steps not yet consumed
    pub fn remaining(&self) -> usize {
        self.lock().steps.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the script from the others
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<ProviderReply> {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall {
            system_instruction: request.state.system_instruction().to_string(),
            turns: request.state.turns().to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            cache_hint: request.cache_hint,
        });

        match inner.steps.pop_front() {
            Some(ScriptStep::Reply(reply)) => Ok(reply),
            Some(ScriptStep::Fail(message)) => Err(ParleyError::provider(message)),
            None => Err(ParleyError::provider("script exhausted")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ConversationState;

    #[tokio::test]
    async fn test_replays_in_order_then_runs_dry() {
        let provider = ScriptedProvider::with_replies([ProviderReply::text("one")]);
        provider.push_failure("boom");
        let state = ConversationState::new("sys");

        let reply = provider.complete(CompletionRequest::new(&state, &[])).await.unwrap();
        assert_eq!(reply, ProviderReply::text("one"));

        let err = provider.complete(CompletionRequest::new(&state, &[])).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        let err = provider.complete(CompletionRequest::new(&state, &[])).await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));

        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.calls()[0].system_instruction, "sys");
    }
}
