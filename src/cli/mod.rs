//! CLI module - command-line interface
//!
//! Contains the terminal human interface and the REPL.

pub mod repl;

pub use repl::{Repl, TerminalInterface};
