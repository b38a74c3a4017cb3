//! Agent orchestrator
//!
//! Owns the conversation and drives the turn-taking loop: read the human,
//! ask the provider, run any tools it asked for, and go back to the provider
//! until it answers in plain text.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::agent::conversation::ConversationState;
use crate::agent::interface::{HumanInterface, InputCommand};
use crate::agent::loop_state::{LoopState, RoundCounter};
use crate::agent::policy::{IssuingContext, PolicyDecision, RulePolicy, ToolPolicy};
use crate::core::{
    Config, ParleyError, Result, ToolDeclaration, ToolInvocationRequest, ToolInvocationResult,
    Turn,
};
use crate::llm::{CacheHint, CompletionRequest, ProviderClient};
use crate::tools::ToolRegistry;

/// Main agent that coordinates the provider, tools and the human
pub struct Agent {
    provider: Arc<dyn ProviderClient>,
    tools: ToolRegistry,
    /// Declarations sent with every request, in registration order
    declarations: Vec<ToolDeclaration>,
    policy: Box<dyn ToolPolicy>,
    conversation: ConversationState,
    state: LoopState,
    rounds: RoundCounter,
    tool_timeout: Duration,
    /// Consumed by the first `AwaitingHuman`
    opening_message: Option<String>,
    debug: bool,
}

impl Agent {
    /// Create an agent. The policy comes from `config.policy`.
    pub fn new(config: &Config, provider: Arc<dyn ProviderClient>, tools: ToolRegistry) -> Self {
        let declarations = tools.declarations();
        let opening_message = config
            .agent
            .opening_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        Self {
            provider,
            tools,
            declarations,
            policy: Box::new(RulePolicy::from_config(&config.policy)),
            conversation: ConversationState::new(config.agent.system_prompt()),
            state: LoopState::AwaitingHuman,
            rounds: RoundCounter::new(config.agent.max_tool_rounds),
            tool_timeout: Duration::from_secs(config.tools.timeout_secs),
            opening_message,
            debug: config.agent.debug,
        }
    }

    /// Replace the dispatch policy
    pub fn with_policy(mut self, policy: impl ToolPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Override the per-call tool timeout
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Run until the human leaves or a fatal error occurs.
    /// Fatal errors are shown to the human before they are returned.
    pub async fn run(&mut self, human: &mut dyn HumanInterface) -> Result<()> {
        info!(
            provider = self.provider.name(),
            model = self.provider.model(),
            tools = self.declarations.len(),
            "conversation started"
        );

        while !self.state.is_terminated() {
            if let Err(e) = self.step(human).await {
                if let ParleyError::UnknownTool(name) = &e {
                    error!(tool = %name, "provider requested an unregistered tool");
                } else {
                    error!(error = %e, "conversation ended with an error");
                }
                human.show_error(&e.to_string());
                return Err(e);
            }
        }

        info!(turns = self.conversation.len(), "conversation finished");
        Ok(())
    }

    /// Perform one state transition. Any error leaves the loop terminated.
    pub async fn step(&mut self, human: &mut dyn HumanInterface) -> Result<()> {
        let current = std::mem::replace(&mut self.state, LoopState::Terminated);
        self.state = match current {
            LoopState::AwaitingHuman => self.await_human(human)?,
            LoopState::AwaitingProvider => self.call_provider(human).await?,
            LoopState::ToolPhase(requests) => self.run_tools(&requests, human).await?,
            LoopState::Terminated => LoopState::Terminated,
        };
        Ok(())
    }

    fn await_human(&mut self, human: &mut dyn HumanInterface) -> Result<LoopState> {
        if let Some(opening) = self.opening_message.take() {
            debug!("sending opening message");
            self.conversation.append(Turn::human(opening));
            return Ok(LoopState::AwaitingProvider);
        }

        loop {
            let Some(line) = human.read_line()? else {
                debug!("end of input");
                return Ok(LoopState::Terminated);
            };

            match InputCommand::parse(&line) {
                InputCommand::Exit => return Ok(LoopState::Terminated),
                InputCommand::Blank => continue,
                InputCommand::Message(text) => {
                    self.conversation.append(Turn::human(text));
                    self.rounds.reset();
                    return Ok(LoopState::AwaitingProvider);
                }
            }
        }
    }

    async fn call_provider(&mut self, human: &mut dyn HumanInterface) -> Result<LoopState> {
        let request = CompletionRequest::new(&self.conversation, &self.declarations)
            .with_cache_hint(CacheHint::LastTurn);
        let reply = self.provider.complete(request).await?;

        debug!(
            text_segments = reply.text_segments.len(),
            tool_requests = reply.tool_requests.len(),
            "provider replied"
        );

        // Commentary goes out before any tool runs
        for text in reply.text_segments.iter().filter(|t| !t.trim().is_empty()) {
            human.show_agent_text(text);
        }

        self.conversation
            .append(Turn::agent(&reply.text_segments, &reply.tool_requests));
        Ok(LoopState::next_state(&reply))
    }

    async fn run_tools(
        &mut self,
        requests: &[ToolInvocationRequest],
        human: &mut dyn HumanInterface,
    ) -> Result<LoopState> {
        if !self.rounds.advance() {
            return Err(ParleyError::ToolRoundLimit(self.rounds.max_rounds()));
        }

        let context = IssuingContext {
            last_human_text: self.conversation.last_human_text(),
            round: self.rounds.round(),
        };

        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let binding = match self.tools.resolve(&request.tool_name) {
                Ok(binding) => binding,
                Err(e) => {
                    // Keep what already ran, then stop
                    if !results.is_empty() {
                        self.conversation.append(Turn::tool_results(results));
                    }
                    return Err(e);
                }
            };

            let result = match self.authorize(request, &context, human) {
                Err(reason) => {
                    warn!(tool = %request.tool_name, id = %request.id, %reason, "tool call denied");
                    ToolInvocationResult::error(
                        request.id.as_str(),
                        format!("Tool call denied: {}", reason),
                    )
                }
                Ok(()) => {
                    info!(tool = %request.tool_name, id = %request.id, "dispatching tool call");
                    human.show_tool_call(request);

                    let report = binding.invoke(&request.arguments, self.tool_timeout).await;
                    if report.timed_out() {
                        warn!(tool = %request.tool_name, timeout = ?self.tool_timeout, "tool call timed out");
                    }
                    if self.debug {
                        human.show_tool_report(request, &report);
                    }
                    report.into_result(&request.id)
                }
            };
            results.push(result);
        }

        self.conversation.append(Turn::tool_results(results));
        Ok(LoopState::AwaitingProvider)
    }

    fn authorize(
        &self,
        request: &ToolInvocationRequest,
        context: &IssuingContext,
        human: &mut dyn HumanInterface,
    ) -> std::result::Result<(), String> {
        match self.policy.validate(request, context) {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => Err(reason),
            PolicyDecision::Ask if human.confirm(request) => Ok(()),
            PolicyDecision::Ask => Err("declined by the user".to_string()),
        }
    }

    /// The conversation so far
    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Names of the registered tools
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }
}
