//! # Watchtower — web page watchers
//!
//! Usage:
//!   watchtower run                        # Start the scheduler until Ctrl-C
//!   watchtower tick                       # Run one scheduling pass and exit
//!   watchtower add --file watcher.toml    # Register a watcher
//!   watchtower list                       # Show watchers
//!   watchtower runs <id> --limit 20       # Show recent runs
//!   watchtower pause|resume|delete <id>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use watchtower_core::config::WatchtowerConfig;
use watchtower_core::types::{ChannelDescriptor, Watcher, WatcherConfig};
use watchtower_core::{Clock, RecordStore, SystemClock};
use watchtower_extract::Fetcher;
use watchtower_scheduler::{
    ChannelDispatcher, ExecutionEngine, HandlerRegistry, HistoryRecorder, Scheduler, SqliteStore,
};

#[derive(Parser)]
#[command(name = "watchtower", version, about = "🔭 Watchtower — web page change watchers")]
struct Cli {
    /// Config file (default: ~/.watchtower/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Run a single scheduling pass and wait for it.
    ///
    /// Runs are only serialized within one process: do not use this while
    /// `watchtower run` is active on the same database.
    Tick,
    /// List watchers
    List,
    /// Show the most recent runs of a watcher
    Runs {
        id: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Register a watcher from a TOML definition
    Add {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Stop scheduling a watcher
    Pause { id: String },
    /// Resume a paused watcher
    Resume { id: String },
    /// Delete a watcher and its run history
    Delete { id: String },
}

/// On-disk watcher definition accepted by `watchtower add`.
#[derive(Debug, Deserialize)]
struct WatcherDefinition {
    name: String,
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
    #[serde(default)]
    owner: Option<String>,
    config: WatcherConfig,
    #[serde(default)]
    channels: Vec<ChannelDescriptor>,
}

fn default_interval_secs() -> u64 { 3600 }

impl WatcherDefinition {
    fn into_watcher(self) -> watchtower_core::Result<Watcher> {
        let mut watcher = Watcher::new(&self.name, self.config, self.interval_secs);
        if let Some(owner) = self.owner {
            watcher.owner = owner;
        }
        watcher.channels = self.channels;
        watcher.validate()?;
        Ok(watcher)
    }
}

fn parse_definition(content: &str) -> Result<Watcher> {
    let definition: WatcherDefinition =
        toml::from_str(content).context("invalid watcher definition")?;
    Ok(definition.into_watcher()?)
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(path: Option<&Path>) -> Result<WatchtowerConfig> {
    let config = match path {
        Some(path) => WatchtowerConfig::load_from(path)?,
        None => WatchtowerConfig::load()?,
    };
    Ok(config)
}

fn build_scheduler(config: &WatchtowerConfig, store: Arc<dyn RecordStore>) -> Result<Scheduler> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = Fetcher::new(&config.fetch)?;
    let dispatcher = ChannelDispatcher::from_config(&config.notify)?;
    let engine = ExecutionEngine::new(
        HandlerRegistry::with_defaults(fetcher),
        HistoryRecorder::new(store.clone(), config.history.result_max_chars),
        Arc::new(dispatcher),
        clock.clone(),
    )
    .with_fetch_deadline(config.fetch.deadline())
    .with_preview_chars(config.notify.preview_chars);
    Ok(Scheduler::new(store, clock, engine, &config.scheduler))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "watchtower=debug,watchtower_scheduler=debug,watchtower_extract=debug,watchtower_channels=debug"
    } else {
        "watchtower=info,watchtower_scheduler=info,watchtower_extract=info,watchtower_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let db_path = expand_path(&config.database.path);
    let store: Arc<dyn RecordStore> = Arc::new(
        SqliteStore::open(Path::new(&db_path))
            .with_context(|| format!("failed to open database {db_path}"))?,
    );

    match cli.command {
        Command::Run => {
            let scheduler = Arc::new(build_scheduler(&config, store)?);
            let handle = scheduler.spawn();
            tokio::signal::ctrl_c().await?;
            tracing::info!("🛑 Interrupt received, shutting down");
            handle.shutdown().await;
        }
        Command::Tick => {
            let scheduler = build_scheduler(&config, store)?;
            let report = scheduler.tick().await?;
            println!(
                "⏰ {} due, {} run, {} skipped (still running), {} skipped (no longer due)",
                report.due, report.started, report.skipped_in_flight, report.skipped_not_due
            );
        }
        Command::List => {
            let watchers = store.list_watchers().await?;
            if watchers.is_empty() {
                println!("No watchers yet. Add one with `watchtower add --file <watcher.toml>`.");
            }
            for w in watchers {
                let state = if w.is_active { "▶️" } else { "⏸️" };
                let last_run = w
                    .last_run
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "{state} {} {} [{}] every {}s → {} (last run: {last_run})",
                    w.id,
                    w.name,
                    w.kind(),
                    w.interval_secs,
                    w.config.url()
                );
            }
        }
        Command::Runs { id, limit } => {
            for run in store.list_runs(&id, limit).await? {
                let notified = if run.notified { " 📤" } else { "" };
                println!(
                    "{} {:<9} {}{notified}",
                    run.executed_at.to_rfc3339(),
                    run.status,
                    run.result
                );
            }
        }
        Command::Add { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let watcher = parse_definition(&content)?;
            store.insert_watcher(&watcher).await?;
            println!("✅ Added watcher '{}' ({})", watcher.name, watcher.id);
        }
        Command::Pause { id } => set_active(store.as_ref(), &id, false).await?,
        Command::Resume { id } => set_active(store.as_ref(), &id, true).await?,
        Command::Delete { id } => {
            if store.delete_watcher(&id).await? {
                println!("🗑️ Deleted watcher {id}");
            } else {
                anyhow::bail!("watcher {id} not found");
            }
        }
    }

    Ok(())
}

async fn set_active(store: &dyn RecordStore, id: &str, active: bool) -> Result<()> {
    if !store.set_active(id, active).await? {
        anyhow::bail!("watcher {id} not found");
    }
    let verb = if active { "Resumed" } else { "Paused" };
    println!("✅ {verb} watcher {id}");
    Ok(())
}
