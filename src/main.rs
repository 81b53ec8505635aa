#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use lurewire::approval::ApprovalQueue;
use lurewire::engage::{EngagementManager, TurnOutcome};
use lurewire::generate::{CompatibleGenerator, TimeoutGenerator};
use lurewire::signals::{LexicalDetector, PatternExtractor};
use lurewire::store::SqliteStateStore;
use lurewire::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lurewire", version, about = "Scam-baiting conversation engine")]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the human-review gateway.
    Serve,
    /// Process one counterparty message and print the decision.
    Turn {
        /// Existing conversation id; a new conversation opens when omitted.
        #[arg(long)]
        conversation: Option<Uuid>,
        /// Counterparty identity for a new conversation.
        #[arg(long, default_value = "unknown")]
        counterpart: String,
        /// The incoming message text.
        message: String,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => {
            let queue = Arc::new(ApprovalQueue::new());
            lurewire::gateway::serve(queue, &config.gateway.bind).await
        }
        Command::Turn {
            conversation,
            counterpart,
            message,
        } => run_turn(&config, conversation, &counterpart, &message).await,
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_turn(
    config: &Config,
    conversation: Option<Uuid>,
    counterpart: &str,
    message: &str,
) -> Result<()> {
    let generator = Arc::new(TimeoutGenerator::new(
        Arc::new(CompatibleGenerator::new(
            "compatible",
            &config.generator.endpoint,
            config.generator.api_key.as_deref(),
        )),
        Duration::from_secs(config.generator.timeout_secs),
    ));
    let store = Arc::new(SqliteStateStore::open(&config.store.database_path).await?);
    let queue = Arc::new(ApprovalQueue::new());

    let manager = EngagementManager::new(
        config,
        generator,
        Arc::new(LexicalDetector::new()),
        Arc::new(PatternExtractor::new()),
        store,
        Arc::clone(&queue),
    )?;

    let id = match conversation {
        Some(id) => id,
        None => manager.open_conversation(counterpart, None).await?,
    };

    let result = manager.process_message(id, message).await?;

    println!("conversation: {id}");
    println!("turn:         {}", result.turn);
    println!("stage:        {} ({:.2})", result.stage.stage, result.stage.confidence);
    println!("strategy:     {}", result.strategy);
    println!("status:       {}", result.status);
    println!("artifacts:    {} new", result.new_artifacts);
    for warning in &result.warnings {
        println!("warning:      {warning:?}");
    }
    match result.outcome {
        TurnOutcome::Reply(reply) => println!("reply:        {reply}"),
        TurnOutcome::PendingApproval(request) => {
            println!("parked for review: request {}", request.id);
        }
    }
    Ok(())
}
