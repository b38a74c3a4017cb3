//! Conversation loop integration tests
//!
//! Drives the agent with a scripted provider and a scripted human.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use parley::agent::{Agent, HumanInterface, IssuingContext, PolicyDecision, ToolPolicy};
use parley::core::config::ToolsConfig;
use parley::core::{
    Config, ExecutionReport, ParleyError, Permission, Role, ToolDeclaration, ToolInvocationRequest,
};
use parley::llm::{CacheHint, ProviderReply, ScriptedProvider};
use parley::tools::{ToolBinding, ToolRegistry};

/// Human that types from a script and remembers everything shown
#[derive(Default)]
struct ScriptedHuman {
    lines: VecDeque<String>,
    agent_text: Vec<String>,
    tool_calls: Vec<String>,
    errors: Vec<String>,
}

impl ScriptedHuman {
    fn typing(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl HumanInterface for ScriptedHuman {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn show_agent_text(&mut self, text: &str) {
        self.agent_text.push(text.to_string());
    }

    fn show_tool_call(&mut self, request: &ToolInvocationRequest) {
        self.tool_calls.push(request.tool_name.clone());
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn confirm(&mut self, _: &ToolInvocationRequest) -> bool {
        true
    }
}

/// Tool that records its arguments and answers with a fixed report
struct RecordingTool {
    seen: Arc<Mutex<Vec<Value>>>,
    stdout: &'static str,
}

#[async_trait]
impl ToolBinding for RecordingTool {
    async fn invoke(&self, arguments: &Value, _timeout: Duration) -> ExecutionReport {
        self.seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(arguments.clone());
        ExecutionReport {
            stdout: self.stdout.to_string(),
            exit_status: Some(0),
            ..Default::default()
        }
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.agent.opening_message = None;
    config.agent.debug = false;
    config.tools = ToolsConfig {
        timeout_secs: 10,
        shell: "sh".to_string(),
        sql_enabled: false,
        ..ToolsConfig::default()
    };
    config
}

fn echo_registry() -> (ToolRegistry, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolDeclaration::new("echo", "Echo", json!({"type": "object"})),
            Arc::new(RecordingTool {
                seen: seen.clone(),
                stdout: "echoed",
            }),
        )
        .unwrap();
    (registry, seen)
}

fn request(id: &str, tool: &str, arguments: Value) -> ToolInvocationRequest {
    ToolInvocationRequest::new(id, tool, arguments)
}

#[tokio::test]
async fn test_text_reply_returns_to_human() {
    let provider = Arc::new(ScriptedProvider::with_replies([ProviderReply::text("Hi!")]));
    let mut agent = Agent::new(&config(), provider.clone(), ToolRegistry::new());
    let mut human = ScriptedHuman::typing(&["hello", "exit"]);

    agent.run(&mut human).await.unwrap();

    assert_eq!(human.agent_text, vec!["Hi!"]);
    assert_eq!(provider.call_count(), 1);
    let turns = agent.conversation().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].text(), "hello");
    assert_eq!(turns[1].role, Role::Agent);
}

#[tokio::test]
async fn test_bash_date_round_trip() {
    let config = config();
    let provider = Arc::new(ScriptedProvider::with_replies([
        ProviderReply::tools(vec![request("toolu_1", "bash", json!({"command": "date"}))])
            .with_text("Let me check."),
        ProviderReply::text("It is today."),
    ]));
    let tools = ToolRegistry::with_builtins(&config.tools).unwrap();
    let mut agent = Agent::new(&config, provider.clone(), tools);
    let mut human = ScriptedHuman::typing(&["what day is it?"]);

    agent.run(&mut human).await.unwrap();

    // Commentary first, then the tool, then the final answer
    assert_eq!(human.agent_text, vec!["Let me check.", "It is today."]);
    assert_eq!(human.tool_calls, vec!["bash"]);
    assert_eq!(provider.call_count(), 2);

    let calls = provider.calls();
    assert_eq!(calls[0].tool_names, vec!["bash"]);
    let results: Vec<_> = calls[1].turns[2].tool_results_iter().collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].request_id, "toolu_1");
    assert!(!results[0].is_error);
    assert!(results[0].content.starts_with("STDOUT:\n"));
    assert!(results[0].content.ends_with("EXIT CODE: 0"));
    assert!(agent.conversation().validate().is_ok());
}

#[tokio::test]
async fn test_exit_makes_no_provider_calls() {
    let provider = Arc::new(ScriptedProvider::new());
    let mut agent = Agent::new(&config(), provider.clone(), ToolRegistry::new());
    let mut human = ScriptedHuman::typing(&["  Exit  "]);

    assert_ok!(agent.run(&mut human).await);

    assert_eq!(provider.call_count(), 0);
    assert!(agent.conversation().is_empty());
    assert!(agent.state().is_terminated());
}

#[tokio::test]
async fn test_unknown_tool_is_fatal_without_a_report() {
    let (registry, seen) = echo_registry();
    let provider = Arc::new(ScriptedProvider::with_replies([ProviderReply::tools(vec![
        request("t1", "python", json!({"code": "1+1"})),
    ])]));
    let mut agent = Agent::new(&config(), provider.clone(), registry);
    let mut human = ScriptedHuman::typing(&["run it", "never read"]);

    let err = agent.run(&mut human).await.unwrap_err();

    assert!(matches!(err, ParleyError::UnknownTool(ref name) if name == "python"));
    assert_eq!(human.errors.len(), 1);
    assert!(seen.lock().unwrap().is_empty());
    // Nothing was fabricated for the unknown call
    let last = agent.conversation().last_turn().unwrap();
    assert_eq!(last.role, Role::Agent);
    assert_eq!(human.lines.len(), 1);
}

#[tokio::test]
async fn test_mixed_batch_folds_completed_results_then_stops() {
    let (registry, seen) = echo_registry();
    let provider = Arc::new(ScriptedProvider::with_replies([ProviderReply::tools(vec![
        request("t1", "echo", json!({"text": "a"})),
        request("t2", "nope", json!({})),
        request("t3", "echo", json!({"text": "b"})),
    ])]));
    let mut agent = Agent::new(&config(), provider.clone(), registry);
    let mut human = ScriptedHuman::typing(&["go"]);

    let err = agent.run(&mut human).await.unwrap_err();
    assert!(err.is_protocol_violation());

    // Only the call before the unknown one ran
    assert_eq!(seen.lock().unwrap().as_slice(), &[json!({"text": "a"})]);

    let last = agent.conversation().last_turn().unwrap();
    let ids: Vec<_> = last.tool_results_iter().map(|r| r.request_id.as_str()).collect();
    assert_eq!(ids, vec!["t1"]);
    assert!(agent.conversation().validate().is_ok());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_batch_results_keep_request_order() {
    let (registry, _) = echo_registry();
    let provider = Arc::new(ScriptedProvider::with_replies([
        ProviderReply::tools(vec![
            request("a", "echo", json!({})),
            request("b", "echo", json!({})),
            request("c", "echo", json!({})),
        ]),
        ProviderReply::text("done"),
    ]));
    let mut agent = Agent::new(&config(), provider.clone(), registry);
    let mut human = ScriptedHuman::typing(&["three please"]);

    agent.run(&mut human).await.unwrap();

    let turns = agent.conversation().turns();
    assert_eq!(turns.len(), 4);
    let ids: Vec<_> = turns[2].tool_results_iter().map(|r| r.request_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(turns[2].role, Role::Human);
    assert!(agent.conversation().validate().is_ok());
}

struct DenyEverything;

impl ToolPolicy for DenyEverything {
    fn validate(&self, request: &ToolInvocationRequest, ctx: &IssuingContext) -> PolicyDecision {
        assert_eq!(ctx.last_human_text.as_deref(), Some("delete it"));
        assert_eq!(ctx.round, 1);
        PolicyDecision::Deny(format!("{} is off today", request.tool_name))
    }
}

#[tokio::test]
async fn test_policy_denial_is_visible_to_the_provider() {
    let (registry, seen) = echo_registry();
    let provider = Arc::new(ScriptedProvider::with_replies([
        ProviderReply::tools(vec![request("t1", "echo", json!({}))]),
        ProviderReply::text("Understood."),
    ]));
    let mut agent =
        Agent::new(&config(), provider.clone(), registry).with_policy(DenyEverything);
    let mut human = ScriptedHuman::typing(&["delete it"]);

    agent.run(&mut human).await.unwrap();

    assert!(seen.lock().unwrap().is_empty());
    let calls = provider.calls();
    let result = calls[1].turns[2].tool_results_iter().next().unwrap().clone();
    assert!(result.is_error);
    assert_eq!(result.content, "Tool call denied: echo is off today");
    assert_eq!(human.agent_text, vec!["Understood."]);
}

#[tokio::test]
async fn test_configured_deny_rule() {
    let mut config = config();
    config.policy.commands.insert("rm *".into(), Permission::Deny);

    let provider = Arc::new(ScriptedProvider::with_replies([
        ProviderReply::tools(vec![request("t1", "bash", json!({"command": "rm -rf /tmp/x"}))]),
        ProviderReply::text("ok"),
    ]));
    let tools = ToolRegistry::with_builtins(&config.tools).unwrap();
    let mut agent = Agent::new(&config, provider.clone(), tools);
    let mut human = ScriptedHuman::typing(&["clean up"]);

    agent.run(&mut human).await.unwrap();

    assert!(human.tool_calls.is_empty());
    let last_results = &agent.conversation().turns()[2];
    let result = last_results.tool_results_iter().next().unwrap();
    assert!(result.content.starts_with("Tool call denied:"));
}

#[tokio::test]
async fn test_provider_failure_is_fatal_and_shown() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_failure("Anthropic API error (401 Unauthorized): bad key");
    let mut agent = Agent::new(&config(), provider.clone(), ToolRegistry::new());
    let mut human = ScriptedHuman::typing(&["hello", "still there?"]);

    let err = assert_err!(agent.run(&mut human).await);

    assert!(matches!(err, ParleyError::ProviderUnavailable(_)));
    assert!(human.errors[0].contains("401 Unauthorized"));
    assert_eq!(human.lines.len(), 1);
}

#[tokio::test]
async fn test_round_limit_stops_a_looping_model() {
    let mut config = config();
    config.agent.max_tool_rounds = 2;
    let (registry, seen) = echo_registry();

    let looping = || ProviderReply::tools(vec![request("t", "echo", json!({}))]);
    let provider = Arc::new(ScriptedProvider::with_replies([looping(), looping(), looping()]));
    let mut agent = Agent::new(&config, provider.clone(), registry);
    let mut human = ScriptedHuman::typing(&["loop"]);

    let err = agent.run(&mut human).await.unwrap_err();

    assert!(matches!(err, ParleyError::ToolRoundLimit(2)));
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_round_counter_resets_when_human_speaks() {
    let mut config = config();
    config.agent.max_tool_rounds = 1;
    let (registry, _) = echo_registry();

    let provider = Arc::new(ScriptedProvider::with_replies([
        ProviderReply::tools(vec![request("t1", "echo", json!({}))]),
        ProviderReply::text("one"),
        ProviderReply::tools(vec![request("t2", "echo", json!({}))]),
        ProviderReply::text("two"),
    ]));
    let mut agent = Agent::new(&config, provider.clone(), registry);
    let mut human = ScriptedHuman::typing(&["first", "second"]);

    agent.run(&mut human).await.unwrap();
    assert_eq!(human.agent_text, vec!["one", "two"]);
}

#[tokio::test]
async fn test_same_script_same_history() {
    async fn run_once() -> Vec<parley::core::Turn> {
        let (registry, _) = echo_registry();
        let provider = Arc::new(ScriptedProvider::with_replies([
            ProviderReply::tools(vec![request("t1", "echo", json!({"x": 1}))]).with_text("hm"),
            ProviderReply::text("done"),
        ]));
        let mut agent = Agent::new(&config(), provider, registry);
        let mut human = ScriptedHuman::typing(&["go", "quit"]);
        agent.run(&mut human).await.unwrap();
        agent.conversation().turns().to_vec()
    }

    assert_eq!(run_once().await, run_once().await);
}

#[tokio::test]
async fn test_every_call_carries_cache_hint_and_alternating_roles() {
    let (registry, _) = echo_registry();
    let provider = Arc::new(ScriptedProvider::with_replies([
        ProviderReply::tools(vec![request("t1", "echo", json!({}))]),
        ProviderReply::text("a"),
        ProviderReply::text("b"),
    ]));
    let mut agent = Agent::new(&config(), provider.clone(), registry);
    let mut human = ScriptedHuman::typing(&["one", "", "two"]);

    agent.run(&mut human).await.unwrap();

    for call in provider.calls() {
        assert_eq!(call.cache_hint, CacheHint::LastTurn);
        for (i, turn) in call.turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::Human } else { Role::Agent };
            assert_eq!(turn.role, expected);
        }
    }
    // The blank line never reached the provider
    assert_eq!(agent.conversation().len(), 6);
}

#[tokio::test]
async fn test_slow_tool_times_out_and_conversation_continues() {
    let config = config();
    let provider = Arc::new(ScriptedProvider::with_replies([
        ProviderReply::tools(vec![request("t1", "bash", json!({"command": "echo start; sleep 5"}))]),
        ProviderReply::text("That took too long."),
    ]));
    let tools = ToolRegistry::with_builtins(&config.tools).unwrap();
    let mut agent = Agent::new(&config, provider.clone(), tools)
        .with_tool_timeout(Duration::from_millis(300));
    let mut human = ScriptedHuman::typing(&["wait"]);

    let started = Instant::now();
    agent.run(&mut human).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));

    let result = agent.conversation().turns()[2]
        .tool_results_iter()
        .next()
        .unwrap()
        .clone();
    assert!(result.is_error);
    assert!(result.content.contains("start"));
    assert!(result.content.ends_with("TIMED OUT after 300ms"));
    assert_eq!(human.agent_text, vec!["That took too long."]);
}
