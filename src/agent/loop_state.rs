//! Agent loop state management
//!
//! The turn-taking state machine. Transitions out of `AwaitingProvider`
//! depend only on the reply, so they are a pure function.

use crate::core::ToolInvocationRequest;
use crate::llm::ProviderReply;

/// Where the conversation loop is
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Waiting for the human to type something
    AwaitingHuman,
    /// A provider call is due
    AwaitingProvider,
    /// Pending tool requests, executed in order
    ToolPhase(Vec<ToolInvocationRequest>),
    Terminated,
}

impl LoopState {
    /// State after the provider replied
    pub fn next_state(reply: &ProviderReply) -> Self {
        if reply.has_tool_requests() {
            Self::ToolPhase(reply.tool_requests.clone())
        } else {
            Self::AwaitingHuman
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Counts consecutive tool rounds since the human last spoke
#[derive(Debug, Clone)]
pub struct RoundCounter {
    round: usize,
    max_rounds: usize,
}

impl RoundCounter {
    pub fn new(max_rounds: usize) -> Self {
        Self {
            round: 0,
            max_rounds,
        }
    }

    /// Start another tool round. Returns false once the limit is exceeded.
    pub fn advance(&mut self) -> bool {
        self.round += 1;
        self.round <= self.max_rounds
    }

    pub fn reset(&mut self) {
        self.round = 0;
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }
}
