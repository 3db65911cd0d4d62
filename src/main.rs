use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use weft_core::config::EngineConfig;
use weft_core::event::EventBus;
use weft_core::types::{Automation, AutomationStatus, OutputMap};
use weft_engine::{ConditionSet, ConditionStore, GraphScheduler, MemoryConditionStore};
use weft_provider::{register_provider_tools, ProcessToolHost, ProviderSource};
use weft_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "weft", version, about = "Workflow automation engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "weft.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute an automation file and stream node events
    Run {
        /// Path to an automation JSON file
        file: PathBuf,

        /// Initial trigger input as a JSON object
        #[arg(long, default_value = "{}")]
        input: String,

        /// Load a tool provider before running (package name or command)
        #[arg(long)]
        provider: Option<String>,
    },
    /// List registered tools, optionally after loading a provider
    Tools {
        /// Load a tool provider first (package name or command)
        #[arg(long)]
        provider: Option<String>,
    },
    /// Show the effective configuration
    Config,
}

/// On-disk automation document: the graph plus the condition sets its
/// condition nodes reference.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunFile {
    automation: Automation,
    #[serde(default)]
    condition_sets: Vec<ConditionSet>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run {
            file,
            input,
            provider,
        } => run_automation(config, &file, &input, provider.as_deref()).await,
        Commands::Tools { provider } => list_tools(config, provider.as_deref()).await,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn build_registry(
    config: &EngineConfig,
    provider: Option<&str>,
) -> anyhow::Result<(ToolRegistry, Option<Arc<ProcessToolHost>>)> {
    let mut registry = ToolRegistry::with_builtins();

    let host = match provider {
        Some(spec) => {
            let host = Arc::new(ProcessToolHost::new(config.provider.clone()));
            let source = ProviderSource::parse(spec);
            host.load_provider(&source)
                .await
                .with_context(|| format!("failed to load provider '{}'", spec))?;
            let definitions = host
                .list_capabilities()
                .await
                .context("failed to list provider capabilities")?;
            register_provider_tools(&mut registry, &host, &source.label(), &definitions);
            info!(provider = %source.label(), tools = definitions.len(), "Provider loaded");
            Some(host)
        }
        None => None,
    };

    Ok((registry, host))
}

async fn run_automation(
    config: EngineConfig,
    file: &PathBuf,
    input: &str,
    provider: Option<&str>,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let run_file: RunFile = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    let initial: OutputMap = serde_json::from_str(input).context("--input must be a JSON object")?;

    let (registry, host) = build_registry(&config, provider).await?;

    let store = Arc::new(MemoryConditionStore::new());
    for set in run_file.condition_sets {
        store.insert(set);
    }

    let events = Arc::new(EventBus::new(config.event_capacity));
    let mut receiver = events.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            print!("{}", event.to_sse_frame());
        }
    });

    let scheduler = GraphScheduler::new(Arc::new(registry), store, events.clone())
        .with_working_dir(&config.sandbox.working_dir);

    let mut automation = run_file.automation;
    let ctx = scheduler.execute(&mut automation, initial).await?;

    drop(events);
    drop(scheduler);
    let _ = printer.await;

    if let Some(host) = host {
        host.terminate().await;
    }

    for (node_id, error) in ctx.errors() {
        eprintln!("node {} failed: {}", node_id, error);
    }

    if automation.status == AutomationStatus::Error {
        bail!("automation '{}' finished with errors", automation.id);
    }
    info!(automation = %automation.id, "Completed");
    Ok(())
}

async fn list_tools(config: EngineConfig, provider: Option<&str>) -> anyhow::Result<()> {
    let (registry, host) = build_registry(&config, provider).await?;

    let mut definitions = registry.definitions();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    for def in definitions {
        println!("{:<32} {}", def.name, def.description);
    }

    if let Some(host) = host {
        host.terminate().await;
    }
    Ok(())
}
