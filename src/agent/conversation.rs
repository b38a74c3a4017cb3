//! Conversation history
//!
//! Append-only: turns are never edited or dropped once committed. Only the
//! orchestrator can append; everyone else gets a shared borrow.

use serde::Serialize;

use crate::core::{Role, Turn};

/// The system instruction plus every committed turn
#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    system_instruction: String,
    turns: Vec<Turn>,
}

impl ConversationState {
    /// Create an empty conversation
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            turns: Vec::new(),
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Text of the most recent turn a human actually typed
    pub fn last_human_text(&self) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Human && t.tool_results_iter().next().is_none())
            .map(Turn::text)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub(crate) fn append(&mut self, turn: Turn) {
        debug_assert!(
            self.turns.last().map_or(true, |last| last.role != turn.role),
            "turn roles must alternate"
        );
        self.turns.push(turn);
    }

    /// Check the history's structural invariants: roles alternate starting
    /// with the human, and every tool result answers a request from the
    /// turn right before it.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (i, turn) in self.turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::Human } else { Role::Agent };
            if turn.role != expected {
                return Err(format!("turn {} has role {}, expected {}", i, turn.role, expected));
            }

            for result in turn.tool_results_iter() {
                let matches = i
                    .checked_sub(1)
                    .map(|p| &self.turns[p])
                    .map(|prev| {
                        prev.tool_requests()
                            .filter(|r| r.id == result.request_id)
                            .count()
                    })
                    .unwrap_or(0);
                if matches != 1 {
                    return Err(format!(
                        "turn {} has a result for '{}' with no matching request before it",
                        i, result.request_id
                    ));
                }
            }
        }
        Ok(())
    }
}
