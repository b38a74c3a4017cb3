//! Tools module - host-side tool execution
//!
//! Contains the command executor, the built-in `bash`/`sql` tools, and the
//! tool registry.

pub mod command;
pub mod executor;
pub mod registry;

pub use command::CommandTool;
pub use executor::CommandExecutor;
pub use registry::{ToolBinding, ToolRegistry};
