//! Interactive terminal session for Parley
//!
//! Provides the stdin/stdout [`HumanInterface`] and the REPL wrapper around
//! the agent.

use std::io::{self, BufRead, Write};

use crate::agent::{Agent, HumanInterface};
use crate::core::{ExecutionReport, Result, ToolInvocationRequest};

/// Longest argument text echoed when announcing a tool call
const ECHO_LIMIT: usize = 200;

/// Terminal-backed human interface
pub struct TerminalInterface<R, W> {
    input: R,
    output: W,
}

impl TerminalInterface<io::StdinLock<'static>, io::Stdout> {
    /// Interface over the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalInterface<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn prompt_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        match self.input.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

/// Short display form of a tool call's command text
fn describe(request: &ToolInvocationRequest) -> String {
    let text = request
        .get_string("command")
        .or_else(|| request.get_string("query"))
        .map(str::to_string)
        .unwrap_or_else(|| request.arguments.to_string());

    match text.char_indices().nth(ECHO_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

impl<R: BufRead, W: Write> HumanInterface for TerminalInterface<R, W> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.prompt_line("You: ")
    }

    fn show_agent_text(&mut self, text: &str) {
        let _ = writeln!(self.output, "Agent: {}", text);
    }

    fn show_tool_call(&mut self, request: &ToolInvocationRequest) {
        let _ = writeln!(
            self.output,
            "Executing {} command: {}",
            request.tool_name,
            describe(request)
        );
    }

    fn show_tool_report(&mut self, request: &ToolInvocationRequest, report: &ExecutionReport) {
        let _ = writeln!(self.output, "{} output:\n{}", request.tool_name, report.render());
    }

    fn show_error(&mut self, message: &str) {
        let _ = writeln!(self.output, "\nAn error occurred: {}", message);
    }

    fn confirm(&mut self, request: &ToolInvocationRequest) -> bool {
        let prompt = format!(
            "Allow {} to run `{}`? [y/N]: ",
            request.tool_name,
            describe(request)
        );
        match self.prompt_line(&prompt) {
            Ok(Some(answer)) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    agent: Agent,
}

impl Repl {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }

    /// Run the REPL on stdin/stdout
    pub async fn run(&mut self) -> Result<()> {
        let mut terminal = TerminalInterface::stdio();
        self.run_with(&mut terminal).await
    }

    /// Run the REPL on any interface
    pub async fn run_with<H: HumanInterface>(&mut self, human: &mut H) -> Result<()> {
        self.print_banner();
        self.agent.run(human).await?;
        println!("\nExiting agent loop. Goodbye!");
        Ok(())
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Print the startup banner
    fn print_banner(&self) {
        println!(
            "\n=== Parley: {} ({}) with tools: {} ===\n",
            self.agent.provider_name(),
            self.agent.model(),
            self.agent.tool_names().join(", ")
        );
        println!("Type 'exit' to end the conversation.\n");
    }
}
