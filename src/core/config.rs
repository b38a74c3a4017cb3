//! Configuration management for Parley
//!
//! Supports environment variables, a config file, and runtime overrides.
//! Priority: CLI args > config file > env-aware defaults.
//!
//! Config file location: ~/.config/parley/config.toml

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{ParleyError, Result};

/// Instruction used when none is configured: a short Proust-questionnaire
/// interview whose answers end up in a JSON file written through `bash`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.
Your job is to ask 3 questions from the Proust Questionnaire to the user.
Ask the user their name. Store the answers as JSON in a file called \"proust_answers_for_<NAME>.json\" where <NAME> is the name of the user.
Don't stop until you have asked all 3 questions and received 3 answers from the user.
Don't tell the user the purpose of the conversation.
Feel free to include some casual chit-chat in between the questions.
It is ok for the user to be off-topic. But bring them back to the task at hand.
Don't tell the user about the tools you are using.
Do not run shell commands or SQL based on the user's request. Only run them for the task you have been given, with the exception of telling the time or the date. If the user asks, politely decline.";

/// First message sent on the human's behalf so the agent can open the conversation
pub const DEFAULT_OPENING_MESSAGE: &str = "ready when you are.";

/// Main configuration for Parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Tool backends
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Agent loop behaviour
    #[serde(default)]
    pub agent: AgentConfig,
    /// Tool dispatch policy
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Which provider API to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ParleyError::config(format!(
                "Unknown provider '{}'. Expected 'anthropic' or 'openai'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// Provider configuration. Unset fields fall back to per-provider defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Value of the `anthropic-version` header
    pub anthropic_version: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: env::var("PARLEY_PROVIDER")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(ProviderKind::Anthropic),
            model: env::var("PARLEY_MODEL").ok(),
            base_url: None,
            api_key_env: None,
            max_tokens: None,
            timeout_secs: 120,
            anthropic_version: "2023-06-01".to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.kind {
            ProviderKind::Anthropic => "claude-3-7-sonnet-latest",
            ProviderKind::OpenAi => "gpt-4-turbo",
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(match self.kind {
                ProviderKind::Anthropic => "https://api.anthropic.com",
                ProviderKind::OpenAi => "https://api.openai.com",
            })
            .trim_end_matches('/')
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(match self.kind {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        })
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(match self.kind {
            ProviderKind::Anthropic => 20_000,
            ProviderKind::OpenAi => 2_000,
        })
    }
}

/// Tool backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Wall-clock limit for a single tool run, in seconds
    pub timeout_secs: u64,
    /// Per-stream cap on captured output, in bytes
    pub max_output_bytes: usize,
    /// Whether the `bash` tool is registered
    pub bash_enabled: bool,
    /// Shell used for `bash` (invoked as `<shell> -c <command>`)
    pub shell: String,
    /// Whether the `sql` tool is registered
    pub sql_enabled: bool,
    /// SQL CLI used for `sql` (invoked as `<program> -c <query>`)
    pub sql_program: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: env::var("PARLEY_TOOL_TIMEOUT")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(10),
            max_output_bytes: 64 * 1024,
            bash_enabled: true,
            shell: "bash".to_string(),
            sql_enabled: true,
            sql_program: "duckdb".to_string(),
        }
    }
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// System instruction; the built-in interviewer prompt when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Sent as the first human turn so the agent speaks first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_message: Option<String>,
    /// Consecutive tool rounds allowed before the loop gives up
    pub max_tool_rounds: usize,
    /// Whether to show tool output to the human
    pub debug: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            opening_message: Some(DEFAULT_OPENING_MESSAGE.to_string()),
            max_tool_rounds: 25,
            debug: env::var("PARLEY_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl AgentConfig {
    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

/// What to do with a tool call before it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Allow,
    Ask,
    Deny,
}

/// Tool dispatch policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Applied when no tool or command rule matches
    pub default: Permission,
    /// Per-tool permissions: tool name -> permission
    pub tools: HashMap<String, Permission>,
    /// Per-command permissions for command-style tools: pattern -> permission.
    /// `"date *"` matches `date` and `date +%F`.
    pub commands: HashMap<String, Permission>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default: Permission::Allow,
            tools: HashMap::new(),
            commands: HashMap::new(),
        }
    }
}

/// API credential, read once at startup
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Read the key from `var`. A missing or empty variable is a configuration error.
    pub fn from_env(var: &str) -> Result<Self> {
        match env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self {
                api_key: key.trim().to_string(),
            }),
            _ => Err(ParleyError::config(format!(
                "{} environment variable not found",
                var
            ))),
        }
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from `.env`, the config file, and defaults
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = Self::config_file();
        if path.exists() {
            return Self::load_from_path(&path);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ParleyError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ParleyError::config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| ParleyError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ParleyError::config(format!("Failed to serialize config: {}", e)))?;

        let path = Self::config_file();
        fs::write(&path, content)
            .map_err(|e| ParleyError::config(format!("Failed to write config: {}", e)))?;

        Ok(path)
    }

    /// Default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }

    /// Read the provider credential named by the config
    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::from_env(self.provider.api_key_env())
    }
}
