//! Parley - a conversational agent with host-side tools
//!
//! Runs a turn-taking conversation between a person at a terminal and a
//! hosted language model. When the model asks for a tool, Parley runs it
//! locally (a shell command or an SQL query), folds the output back into
//! the conversation, and asks the model again.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Provider abstraction with Anthropic and OpenAI-compatible backends
//! - **Tools**: Tool registry, command executor, and the built-in tools
//! - **Agent**: The turn-taking loop, conversation history, and tool policy
//! - **CLI**: Terminal interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use parley::agent::Agent;
//! use parley::cli::Repl;
//! use parley::llm::create_provider;
//! use parley::tools::ToolRegistry;
//! use parley::Config;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> parley::Result<()> {
//!     let config = Config::load()?;
//!     let provider = create_provider(&config, config.credentials()?)?;
//!     let tools = ToolRegistry::with_builtins(&config.tools)?;
//!
//!     let mut repl = Repl::new(Agent::new(&config, provider, tools));
//!     repl.run().await
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod tools;

// Re-export commonly used items
pub use agent::Agent;
pub use cli::Repl;
pub use core::{Config, ParleyError, Result};
