//! Tool dispatch policy
//!
//! Checked once per tool request, after the tool name resolves and before
//! anything runs. A denial is not an error: the request gets an error result
//! the model can read and react to.

use crate::core::config::PolicyConfig;
use crate::core::{Permission, ToolInvocationRequest};

/// What the conversation looked like when the request was issued
#[derive(Debug, Clone, Default)]
pub struct IssuingContext {
    /// Most recent line the human typed (or the opening message)
    pub last_human_text: Option<String>,
    /// 1-based count of tool rounds since the human last spoke
    pub round: usize,
}

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    /// Defer to the human for this one call
    Ask,
    Deny(String),
}

/// Decides whether a tool request may run
pub trait ToolPolicy: Send + Sync {
    fn validate(&self, request: &ToolInvocationRequest, context: &IssuingContext)
        -> PolicyDecision;
}

/// Lets everything through
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl ToolPolicy for AllowAll {
    fn validate(&self, _: &ToolInvocationRequest, _: &IssuingContext) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

/// Arguments that carry the command text of command-style tools
const COMMAND_ARGUMENTS: &[&str] = &["command", "query"];

/// Rule-based policy: command patterns first, then per-tool rules, then the default
#[derive(Debug, Clone, Default)]
pub struct RulePolicy {
    config: PolicyConfig,
}

impl RulePolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn permission_for(&self, request: &ToolInvocationRequest) -> Permission {
        let command = COMMAND_ARGUMENTS
            .iter()
            .find_map(|key| request.get_string(key));

        if let Some(command) = command {
            match self.match_command(command) {
                Some(Permission::Deny) => return Permission::Deny,
                // A prefix rule only vouches for a single plain command
                Some(perm) if !has_shell_control(command) => return perm,
                _ => {}
            }
        }

        self.config
            .tools
            .get(&request.tool_name)
            .copied()
            .unwrap_or(self.config.default)
    }

    /// The longest matching pattern wins so overlapping rules stay deterministic.
    fn match_command(&self, command: &str) -> Option<Permission> {
        let command = command.trim();
        self.config
            .commands
            .iter()
            .filter(|(pattern, _)| wildcard_match(pattern, command))
            .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .map(|(_, perm)| *perm)
    }
}

/// Text that could chain, substitute or redirect past the matched prefix
const SHELL_CONTROL: &[&str] = &[";", "&", "|", "`", "$(", ">", "<", "\n", "\r"];

fn has_shell_control(command: &str) -> bool {
    SHELL_CONTROL.iter().any(|token| command.contains(token))
}

/// `"git *"` matches `git` and `git status`; anything else must match exactly.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    match pattern.strip_suffix(" *") {
        Some(prefix) => {
            text == prefix
                || text
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with(char::is_whitespace))
        }
        None => pattern == text,
    }
}

impl ToolPolicy for RulePolicy {
    fn validate(&self, request: &ToolInvocationRequest, _: &IssuingContext) -> PolicyDecision {
        match self.permission_for(request) {
            Permission::Allow => PolicyDecision::Allow,
            Permission::Ask => PolicyDecision::Ask,
            Permission::Deny => PolicyDecision::Deny(format!(
                "'{}' is not permitted by the tool policy",
                request.tool_name
            )),
        }
    }
}
