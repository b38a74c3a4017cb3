//! Agent module - orchestration and conversation management
//!
//! Contains the turn-taking loop, the conversation history it owns, and the
//! seams it talks through (human interface, tool policy).

pub mod conversation;
pub mod interface;
pub mod loop_state;
pub mod orchestrator;
pub mod policy;

pub use conversation::ConversationState;
pub use interface::{HumanInterface, InputCommand};
pub use loop_state::{LoopState, RoundCounter};
pub use orchestrator::Agent;
pub use policy::{AllowAll, IssuingContext, PolicyDecision, RulePolicy, ToolPolicy};
