//! Custom error types for Parley
//!
//! Only tool-level failures are recoverable, and those never show up here:
//! they are folded into the conversation as data. Everything in
//! [`ParleyError`] ends the conversation.

use thiserror::Error;

/// Main error type for Parley operations
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Missing credential or unusable configuration (raised before the loop starts)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider transport, auth or API failure
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider asked for a tool the registry does not know
    #[error("Unknown tool requested by provider: '{0}'")]
    UnknownTool(String),

    /// A tool name was registered twice
    #[error("Tool '{0}' is already registered")]
    DuplicateToolName(String),

    /// Too many provider/tool round trips without hearing from the human
    #[error("Gave up after {0} consecutive tool rounds without a text reply")]
    ToolRoundLimit(usize),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for Parley operations
pub type Result<T> = std::result::Result<T, ParleyError>;

impl ParleyError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    /// Whether this error means the provider and registry disagree,
    /// as opposed to an outage somewhere outside the process.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::UnknownTool(_))
    }
}
