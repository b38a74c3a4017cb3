//! LLM module - model provider integrations
//!
//! One trait, [`ProviderClient`], with Anthropic and OpenAI-compatible
//! backends plus a scripted one for tests.

pub mod provider;
pub mod traits;

pub use provider::create_provider;
pub use provider::scripted::{RecordedCall, ScriptStep, ScriptedProvider};
pub use traits::{CacheHint, CompletionRequest, ProviderClient, ProviderReply};
