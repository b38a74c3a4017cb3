//! The human side of the conversation
//!
//! The orchestrator only talks to the person through [`HumanInterface`], so
//! the terminal and test doubles are interchangeable.

use std::io;

use crate::core::{ExecutionReport, ToolInvocationRequest};

/// Source of human input and sink for everything shown to the human
pub trait HumanInterface {
    /// Read one line. `Ok(None)` means end of input.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Show agent commentary, one call per text segment
    fn show_agent_text(&mut self, text: &str);

    /// Announce a tool call before it runs
    fn show_tool_call(&mut self, _request: &ToolInvocationRequest) {}

    /// Show what a tool produced. Only called in debug mode.
    fn show_tool_report(&mut self, _request: &ToolInvocationRequest, _report: &ExecutionReport) {}

    /// Report a fatal error
    fn show_error(&mut self, message: &str);

    /// Ask the human to approve a tool call
    fn confirm(&mut self, request: &ToolInvocationRequest) -> bool;
}

/// What a line of human input means to the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Exit,
    Blank,
    Message(String),
}

impl InputCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            Self::Blank
        } else if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            Self::Exit
        } else {
            Self::Message(trimmed.to_string())
        }
    }
}
