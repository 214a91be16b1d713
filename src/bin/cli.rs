//! CodeFlow CLI
//!
//! Runs the reference security and quality agents over one file through
//! the coordinator and prints the merged result.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use codeflow_agents::agents::{QualityAnalyzer, SecurityAnalyzer};
use codeflow_agents::channels::format_report;
use codeflow_agents::config;
use codeflow_agents::{AgentCoordinator, ChangeType, TriggerEvent, TriggerOutcome};

#[derive(Parser)]
#[command(name = "codeflow-agents")]
#[command(about = "Autonomous code-analysis agents")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one file with the reference agents
    Analyze {
        /// File to analyze
        file: PathBuf,

        /// Repository identifier reported with the change
        #[arg(short, long, default_value = "local", env = "CODEFLOW_REPOSITORY")]
        repository: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the configuration file location
    ConfigPath,
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file found or error loading: {}", e);
    }

    let cli = Cli::parse();
    if cli.verbose && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "codeflow_agents=debug");
    }
    codeflow_agents::init_tracing();

    match run_command(cli).await {
        Ok(_) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::ConfigPath => {
            println!("{}", config::get_config_path().display());
            Ok(())
        }
        Commands::Analyze {
            file,
            repository,
            format,
        } => {
            let outcome = analyze(&file, &repository).await?;
            print_outcome(&outcome, format)
        }
    }
}

async fn analyze(file: &Path, repository: &str) -> anyhow::Result<TriggerOutcome> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let settings = config::load_config();
    let mut coordinator = AgentCoordinator::from_config(&settings)?;
    coordinator
        .spawn_agent("security", repository, Arc::new(SecurityAnalyzer::new()?), None)
        .await?;
    coordinator
        .spawn_agent("quality", repository, Arc::new(QualityAnalyzer::new()?), None)
        .await?;

    let event = TriggerEvent::new(file.to_string_lossy(), repository, ChangeType::Modify)
        .with_content(content);

    let outcome = coordinator.handle_trigger(event).await;
    coordinator.shutdown().await;
    Ok(outcome?)
}

fn print_outcome(outcome: &TriggerOutcome, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        }
        OutputFormat::Text => {
            let suggestions: Vec<_> = outcome
                .results
                .iter()
                .flat_map(|r| r.suggestions.iter().cloned())
                .collect();
            println!("{}", format_report(&suggestions));
            for resolution in &outcome.resolutions {
                println!(
                    "resolved {} conflict via {}: {}",
                    resolution.conflict_type.as_str(),
                    resolution.resolution_strategy,
                    resolution.justification
                );
            }
            for failure in &outcome.failures {
                eprintln!("agent {} failed: {}", failure.agent_id, failure.error);
            }
        }
    }
    Ok(())
}
