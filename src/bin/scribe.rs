//! Scribe CLI Binary
//!
//! Command-line interface for submitting, inspecting and cancelling
//! generation jobs against a local job store.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use scribe::client::{GenerationClient, JobProcessor, TemplatePromptBuilder};
use scribe::config::ScribeConfig;
use scribe::dispatch::Dispatcher;
use scribe::job::{JobId, JobKind};
use scribe::logging::init_logging;
use scribe::provider::HttpProvider;
use scribe::store::SledJobStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "scribe", about = "Resilient generation job pipeline", version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a job and run it to completion
    Submit {
        /// Job kind: generate, synthesize, analyze or improve
        kind: JobKind,

        /// Input payload as a JSON document
        #[arg(long)]
        input: String,

        /// Caller identity for credential lookup
        #[arg(long)]
        caller: Option<String>,
    },

    /// Show the current state of a job
    Status { id: JobId },

    /// Request cancellation of a job
    Cancel { id: JobId },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ScribeConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .validated()
        .map_err(|e| anyhow!("{}", e))?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging(Some(&config.logging)).map_err(|e| anyhow!("{}", e))?;
    info!("scribe starting");

    let store = Arc::new(
        SledJobStore::open(&config.storage.store_path)
            .with_context(|| format!("failed to open job store at {:?}", config.storage.store_path))?,
    );

    let provider = Arc::new(HttpProvider::new(config.provider.clone()).map_err(|e| anyhow!("{}", e))?);
    let client = GenerationClient::new(
        provider,
        Arc::new(config.credentials.build_pool()),
        Arc::new(TemplatePromptBuilder),
        config.retry.to_policy(),
    );
    let processor = Arc::new(JobProcessor::new(store.clone(), client));
    // One-shot invocations execute inline; the broker path is for long-lived
    // deployments embedding the library.
    let dispatcher = Dispatcher::new(store, processor, None);

    let view = match cli.command {
        Command::Submit {
            kind,
            input,
            caller,
        } => {
            let input: serde_json::Value =
                serde_json::from_str(&input).context("input is not valid JSON")?;
            dispatcher
                .submit(kind, input, caller)
                .await
                .map_err(|e| anyhow!("{}", e))?
        }
        Command::Status { id } => dispatcher
            .status(id)
            .map_err(|e| anyhow!("{}", e))?
            .ok_or_else(|| anyhow!("job {} not found", id))?,
        Command::Cancel { id } => dispatcher.cancel(id).map_err(|e| anyhow!("{}", e))?,
    };

    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
