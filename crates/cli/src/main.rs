//! Evaloop CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Create the config file and directories
//! - `chat`   : Interactive chat or single-message mode
//! - `memory` : Inspect the memory store
//! - `doctor` : Diagnose configuration and connectivity

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "evaloop",
    about = "Evaloop: an agent that classifies, plans, acts and re-evaluates",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Onboard,

    /// Talk to the agent
    Chat(commands::chat::ChatArgs),

    /// Inspect stored memories
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum MemoryCommands {
    /// Show the backend and entry count
    Stats,

    /// Search memories by keyword
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat(args) => commands::chat::run(args).await?,
        Commands::Memory { command } => match command {
            MemoryCommands::Stats => commands::memory::stats().await?,
            MemoryCommands::Search { query, limit } => commands::memory::search(&query, limit).await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
