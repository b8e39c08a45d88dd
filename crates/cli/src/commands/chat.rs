//! `evaloop chat`: single-message or interactive mode.

use clap::Args;
use evaloop_agent::{Orchestrator, ProviderOracle};
use evaloop_config::{AppConfig, CriticMode, OrchestratorConfig};
use evaloop_core::capability::CapabilityRegistry;
use evaloop_core::message::Conversation;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Per-run overrides of the `[orchestrator]` config section.
#[derive(Args, Debug, Default, Clone)]
pub struct ChatArgs {
    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    pub message: Option<String>,

    /// Critic mode: off, plans or all
    #[arg(long)]
    pub critic: Option<CriticMode>,

    /// Ask after each action whether another one is needed
    #[arg(long)]
    pub re_evaluate: bool,

    /// Upper bound on re-evaluation rounds
    #[arg(long)]
    pub max_rounds: Option<usize>,

    /// Summarize digests and subtask instructions before use
    #[arg(long)]
    pub postprocess: bool,

    /// Show earlier subtask results to later subtasks
    #[arg(long)]
    pub subtask_context: bool,

    /// Only ever choose this action
    #[arg(long)]
    pub force_action: Option<String>,

    /// Replace the planner instruction
    #[arg(long)]
    pub plan_message: Option<String>,
}

impl ChatArgs {
    fn apply(&self, config: &mut OrchestratorConfig) {
        if let Some(critic) = self.critic {
            config.critic = critic;
        }
        if let Some(max_rounds) = self.max_rounds {
            config.max_rounds = max_rounds;
        }
        if let Some(action) = &self.force_action {
            config.force_action = action.clone();
        }
        if let Some(message) = &self.plan_message {
            config.plan_message = message.clone();
        }
        config.re_evaluate |= self.re_evaluate;
        config.postprocess |= self.postprocess;
        config.subtask_context |= self.subtask_context;
    }
}

/// Wire config → provider → oracle → memory → capabilities → orchestrator.
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let router = evaloop_providers::build_from_config(config);
    let provider = router.default().ok_or("No default provider configured")?;
    let oracle = Arc::new(ProviderOracle::from_config(provider, config));

    let memory = evaloop_capabilities::memory_from_config(config)?;
    let registry = CapabilityRegistry::builder()
        .register_all(evaloop_capabilities::default_capabilities(config, memory))
        .build()?;

    Ok(Orchestrator::new(oracle, Arc::new(registry)).with_config(config.orchestrator.clone()))
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    args.apply(&mut config.orchestrator);
    config.validate()?;

    let orchestrator = build_orchestrator(&config)?;
    let mut events = orchestrator.event_bus().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(?event, "Domain event");
        }
    });

    let mut history = Conversation::new();

    if let Some(message) = args.message {
        eprint!("  Thinking...");
        let outcome = orchestrator.evaluate(&message, &mut history).await;
        eprint!("\r              \r");
        println!("{}", outcome.reply);
        return Ok(());
    }

    println!();
    println!("  Evaloop: interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Models:    {} (functions), {} (text)", config.functions_model, config.llm_model);
    println!("  Critic:    {:?}", config.orchestrator.critic);
    println!(
        "  Re-eval:   {}",
        if config.orchestrator.re_evaluate {
            format!("on, up to {} rounds", config.orchestrator.max_rounds)
        } else {
            "off".to_string()
        }
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        eprint!("  ...");
        let outcome = orchestrator.evaluate(line, &mut history).await;
        eprint!("\r     \r");
        println!();
        for reply_line in outcome.reply.lines() {
            println!("  Assistant > {reply_line}");
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
