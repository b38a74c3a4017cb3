//! Parley - conversational agent with host-side tools
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley::agent::Agent;
use parley::cli::{Repl, TerminalInterface};
use parley::core::ProviderKind;
use parley::llm::create_provider;
use parley::tools::ToolRegistry;
use parley::{Config, ParleyError};

/// Parley - talk to a hosted model that can run shell and SQL tools
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider backend (anthropic, openai)
    #[arg(long, short = 'p')]
    provider: Option<ProviderKind>,

    /// Model identifier
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Read the system instruction from a file
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,

    /// Wait for the human instead of sending the opening message
    #[arg(long)]
    no_opening: bool,

    /// Per-call tool timeout in seconds
    #[arg(long)]
    tool_timeout: Option<u64>,

    /// Do not register the sql tool
    #[arg(long)]
    no_sql: bool,

    /// Enable debug output (tool reports and debug logs)
    #[arg(long, short = 'd')]
    debug: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn apply_overrides(config: &mut Config, args: &Args) -> anyhow::Result<()> {
    if let Some(kind) = args.provider {
        config.provider.kind = kind;
    }

    if let Some(ref model) = args.model {
        config.provider.model = Some(model.clone());
    }

    if let Some(ref path) = args.system_prompt_file {
        let prompt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        config.agent.system_prompt = Some(prompt);
    }

    if args.no_opening {
        config.agent.opening_message = None;
    }

    if let Some(secs) = args.tool_timeout {
        config.tools.timeout_secs = secs;
    }

    if args.no_sql {
        config.tools.sql_enabled = false;
    }

    if args.debug {
        config.agent.debug = true;
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load()?;
    apply_overrides(&mut config, &args)?;
    init_tracing(config.agent.debug);

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    // Credentials are read once, before the loop starts
    let credentials = match config.credentials() {
        Ok(credentials) => credentials,
        Err(e @ ParleyError::Config(_)) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    let provider = create_provider(&config, credentials)?;
    let tools = ToolRegistry::with_builtins(&config.tools)?;
    let agent = Agent::new(&config, provider, tools);

    let mut repl = Repl::new(agent);
    let mut terminal = TerminalInterface::stdio();
    match repl.run_with(&mut terminal).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        // Already shown to the human by the agent loop
        Err(_) => Ok(ExitCode::FAILURE),
    }
}
