//! # ReelPilot — scheduled content-generation orchestrator
//!
//! Once per minute the dispatcher decides which publishing accounts fire
//! today; a single worker serializes the expensive pipeline subprocess; a
//! daily spend ledger gates costly runs; a recency-aware selector keeps
//! media assets from repeating.
//!
//! Usage:
//!   reelpilot serve                  # gateway + minute dispatcher
//!   reelpilot tick                   # one dispatcher evaluation (cron mode)
//!   reelpilot pick --account sanya --category hook --dir assets/sanya/hook

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reelpilot_assets::{AssetSelector, UsageHistory, list_handles};
use reelpilot_core::{OrchestratorConfig, RunRequest};
use reelpilot_gateway::AppState;
use reelpilot_ledger::SpendLedger;
use reelpilot_runner::{RunLog, RunRegistry, RunService};
use reelpilot_scheduler::{
    DispatchHistory, Dispatcher, FireDecision, LockStore, ScheduleStore, spawn_dispatcher,
};

#[derive(Parser)]
#[command(
    name = "reelpilot",
    version,
    about = "Scheduled content-generation orchestrator for multi-account publishing"
)]
struct Cli {
    /// Path to config.toml (default: ~/.reelpilot/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway and the minute dispatcher (default)
    Serve {
        /// Gateway port override
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Evaluate the schedule once, run any due accounts, then exit
    Tick,
    /// Pick an asset handle for an account, avoiding recent repeats
    Pick {
        #[arg(long)]
        account: String,
        #[arg(long)]
        category: String,
        /// Pool directory to list handles from
        #[arg(long)]
        dir: String,
        /// Second pool for matched-pair selection (shared session keys)
        #[arg(long)]
        pair_dir: Option<String>,
        /// Do not record the pick in the usage history
        #[arg(long)]
        no_record: bool,
    },
}

/// Everything the orchestrator owns, wired from one config.
struct Orchestrator {
    config: OrchestratorConfig,
    schedule: Arc<ScheduleStore>,
    history: Arc<DispatchHistory>,
    ledger: Arc<SpendLedger>,
    run_log: Arc<RunLog>,
    runs: Arc<RunService>,
    dispatcher: Arc<Dispatcher>,
}

impl Orchestrator {
    fn build(config: OrchestratorConfig) -> Self {
        let schedule = Arc::new(ScheduleStore::new(config.schedule_path()));
        let history = Arc::new(DispatchHistory::new(config.dispatch_history_path()));
        let ledger = Arc::new(SpendLedger::new(config.ledger_path(), config.daily_cap));
        let run_log = Arc::new(RunLog::new(config.run_log_path()));
        let runs = Arc::new(RunService::new(
            config.pipeline_bin.clone(),
            config.run_cost_estimate,
            Arc::new(RunRegistry::new()),
            ledger.clone(),
            run_log.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            schedule.clone(),
            LockStore::new(config.locks_dir()),
            history.clone(),
            config.lock_retention_days,
        ));
        Self {
            config,
            schedule,
            history,
            ledger,
            run_log,
            runs,
            dispatcher,
        }
    }

    fn app_state(&self) -> AppState {
        AppState {
            schedule: self.schedule.clone(),
            history: self.history.clone(),
            runs: self.runs.clone(),
            run_log: self.run_log.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug,hyper=info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            let path = shellexpand::tilde(path).to_string();
            OrchestratorConfig::load_from(Path::new(&path))?
        }
        None => OrchestratorConfig::load()?,
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = PathBuf::from(shellexpand::tilde(data_dir).to_string());
    }
    std::fs::create_dir_all(&config.data_dir)?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, port).await,
        Command::Tick => tick_once(config).await,
        Command::Pick {
            account,
            category,
            dir,
            pair_dir,
            no_record,
        } => pick_asset(&config, &account, &category, &dir, pair_dir.as_deref(), no_record),
    }
}

async fn serve(config: OrchestratorConfig, port: Option<u16>) -> Result<()> {
    let orchestrator = Orchestrator::build(config);
    orchestrator.runs.start();

    let queue = orchestrator.runs.clone();
    let on_fire = move |decision: FireDecision| {
        let queue = queue.clone();
        async move {
            match queue.submit(&RunRequest::for_account(&decision.account)) {
                Ok(record) => {
                    tracing::info!("Dispatched {} as run {}", decision.account, record.id);
                }
                Err(e) => tracing::warn!("Failed to queue {}: {e}", decision.account),
            }
        }
    };
    tokio::spawn(spawn_dispatcher(
        orchestrator.dispatcher.clone(),
        orchestrator.config.tick_secs,
        on_fire,
    ));

    let host = orchestrator.config.gateway.host.clone();
    let port = port.unwrap_or(orchestrator.config.gateway.port);
    reelpilot_gateway::serve(orchestrator.app_state(), &host, port).await?;
    Ok(())
}

/// Cron mode: one evaluation, queue whatever is due, drain, exit.
async fn tick_once(config: OrchestratorConfig) -> Result<()> {
    let orchestrator = Orchestrator::build(config);
    orchestrator.runs.start();

    let decisions = orchestrator.dispatcher.tick(chrono::Utc::now());
    if decisions.is_empty() {
        tracing::info!("Nothing due this minute");
    }
    for decision in &decisions {
        orchestrator
            .runs
            .submit(&RunRequest::for_account(&decision.account))?;
    }
    orchestrator.runs.shutdown().await;
    tracing::info!("Tick complete: {} run(s)", decisions.len());
    Ok(())
}

fn pick_asset(
    config: &OrchestratorConfig,
    account: &str,
    category: &str,
    dir: &str,
    pair_dir: Option<&str>,
    no_record: bool,
) -> Result<()> {
    let selector = AssetSelector::new(UsageHistory::new(config.usage_path()));
    let pool = list_handles(Path::new(dir));
    let handle = match pair_dir {
        Some(pair_dir) => {
            let pool_b = list_handles(Path::new(pair_dir));
            selector.pick_pair(category, account, &pool, &pool_b)?
        }
        None => selector.pick(category, account, &pool)?,
    };
    if !no_record {
        selector.record_use(account, category, &handle)?;
    }
    println!("{handle}");
    Ok(())
}
