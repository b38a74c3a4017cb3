//! Provider implementations and factory
//!
//! Submodules implement specific backends (Anthropic, OpenAI-compatible, scripted).

pub mod anthropic;
pub mod openai;
pub mod scripted;

use std::sync::Arc;

use crate::core::config::{Config, ProviderKind};
use crate::core::{Credentials, ParleyError, Result};
use crate::llm::traits::ProviderClient;

use self::anthropic::AnthropicClient;
use self::openai::OpenAiClient;

/// Create a provider client based on configuration
pub fn create_provider(
    config: &Config,
    credentials: Credentials,
) -> Result<Arc<dyn ProviderClient>> {
    let provider: Arc<dyn ProviderClient> = match config.provider.kind {
        ProviderKind::Anthropic => {
            Arc::new(AnthropicClient::from_config(&config.provider, credentials)?)
        }
        ProviderKind::OpenAi => Arc::new(OpenAiClient::from_config(&config.provider, credentials)?),
    };
    Ok(provider)
}

/// Map a transport failure to a provider error with a readable cause
pub(crate) fn transport_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> ParleyError {
    if e.is_timeout() {
        ParleyError::provider(format!("request timed out after {}s", timeout_secs))
    } else if e.is_connect() {
        ParleyError::provider(format!("cannot connect to {}", base_url))
    } else {
        ParleyError::provider(e.to_string())
    }
}
