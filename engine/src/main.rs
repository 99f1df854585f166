use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use scout_observability::{
    canonical_logs_dir_from_root, emit_event, init_process_logging, ObservabilityEvent,
    ProcessKind, DEFAULT_RETENTION_DAYS,
};
use scout_orchestrator::{
    load_config, MergeEngine, ProcessRuntime, ProgressSink, ScoutConfig, SessionOutcome,
    StateStore, StatusReport, Supervisor, WorkerOutcome,
};
use scout_types::{SessionStatus, WorkerConfig};
use tracing::info;

const EXIT_INTERRUPTED: u8 = 130;
const MAX_AGENTS: u32 = 4;

#[derive(Parser, Debug)]
#[command(name = "scout", version)]
#[command(about = "Supervised job-search agents with a command-safety gate")]
struct Cli {
    /// Configuration file, relative to the working directory.
    #[arg(long, global = true, env = "SCOUT_CONFIG")]
    config: Option<PathBuf>,
    /// Output directory holding per-agent state and merged results.
    #[arg(long, global = true)]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Launch agents and supervise them until they finish.
    Start {
        #[arg(long, default_value_t = MAX_AGENTS, value_parser = clap::value_parser!(u32).range(1..=MAX_AGENTS as i64))]
        agents: u32,
        /// Iterations per agent in this run. Unlimited when omitted.
        #[arg(long)]
        iterations: Option<u64>,
    },
    /// Print the state of the last session.
    Status,
    /// Merge agent outputs into the merged directory.
    Merge,
    /// Ask running agents to stop after their current iteration.
    Stop {
        #[arg(long)]
        agent: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    };

    match run(command, cli.config, cli.output).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Command,
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let project_root = std::env::current_dir().context("cannot resolve working directory")?;
    let config = load_config(
        &project_root,
        config_path.as_deref(),
        build_cli_overrides(output.as_deref()),
    )?;

    let process = match command {
        Command::Start { .. } => ProcessKind::Supervisor,
        _ => ProcessKind::Cli,
    };
    let logs_dir = canonical_logs_dir_from_root(&config.output_dir);
    let (_log_guard, log_info) =
        init_process_logging(process, &logs_dir, DEFAULT_RETENTION_DAYS)?;
    emit_event(
        tracing::Level::INFO,
        process,
        ObservabilityEvent {
            status: Some("ok"),
            detail: Some("jsonl logging initialized"),
            ..ObservabilityEvent::new("logging.initialized", "engine.main")
        },
    );
    info!("logging initialized: {:?}", log_info);

    match command {
        Command::Start { agents, iterations } => {
            run_start(config, &project_root, agents, iterations).await
        }
        Command::Status => {
            print_status(&config);
            Ok(ExitCode::SUCCESS)
        }
        Command::Merge => run_merge(&config),
        Command::Stop { agent } => run_stop(&config, agent),
    }
}

/// Only `--output` is settable from the command line; everything else comes
/// from the config file and environment.
fn build_cli_overrides(output: Option<&Path>) -> serde_json::Value {
    match output {
        Some(dir) => serde_json::json!({ "output_dir": dir.display().to_string() }),
        None => serde_json::Value::Null,
    }
}

struct StdoutProgress;

impl ProgressSink for StdoutProgress {
    fn report(&self, report: &StatusReport) {
        println!("{}", report.render_progress());
    }
}

enum StartEnd {
    Finished(SessionOutcome),
    Aborted,
}

async fn run_start(
    config: ScoutConfig,
    project_root: &Path,
    agents: u32,
    iterations: Option<u64>,
) -> anyhow::Result<ExitCode> {
    let runtime = Arc::new(ProcessRuntime::from_config(&config.runtime));
    let supervisor =
        Supervisor::new(config.clone(), project_root, runtime).with_progress(Arc::new(StdoutProgress));

    println!(
        "Starting {} agent(s), session {}",
        supervisor.roster(agents as usize).len(),
        supervisor.session_id().await
    );
    println!("Output directory: {}", config.output_dir.display());

    let mut session = Box::pin(supervisor.run_session(agents as usize, iterations));
    let mut interrupted = false;
    let end = loop {
        tokio::select! {
            outcome = &mut session => break StartEnd::Finished(outcome?),
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for interrupt")?;
                if interrupted {
                    tracing::warn!("second interrupt, aborting without waiting for agents");
                    break StartEnd::Aborted;
                }
                interrupted = true;
                println!("\nInterrupt received, stopping agents after their current iteration...");
                supervisor.stop_all().await?;
            }
        }
    };

    let code = match &end {
        StartEnd::Finished(outcome) => {
            for (worker_id, result) in &outcome.workers {
                if let WorkerOutcome::Failed(message) = result {
                    eprintln!("agent-{worker_id} failed: {message}");
                }
            }
            if let Some(merge) = &outcome.merge {
                println!(
                    "Merged {} jobs into {}",
                    merge.jobs,
                    merge.merged_path.display()
                );
            }
            match (interrupted, outcome.session.status) {
                (true, _) => ExitCode::from(EXIT_INTERRUPTED),
                (false, SessionStatus::Errored) => ExitCode::FAILURE,
                (false, _) => ExitCode::SUCCESS,
            }
        }
        StartEnd::Aborted => ExitCode::from(EXIT_INTERRUPTED),
    };
    // Drop the in-flight session before reading state so aborted workers
    // release their agent processes.
    drop(session);

    print_status(&config);
    Ok(code)
}

fn session_roster(config: &ScoutConfig, store: &StateStore) -> Vec<WorkerConfig> {
    let count = store
        .read_session_state()
        .map(|s| s.worker_count as usize)
        .unwrap_or(config.agents.len());
    config.agents.iter().take(count).cloned().collect()
}

fn print_status(config: &ScoutConfig) {
    let store = StateStore::new(&config.output_dir);
    let merger = MergeEngine::new(store.paths().clone(), config.merge.ui_copy_path.clone());
    let report =
        StatusReport::collect(&store, &session_roster(config, &store)).with_merge_stats(merger.stats());
    println!("{}", report.render_summary(Utc::now()));
}

fn run_merge(config: &ScoutConfig) -> anyhow::Result<ExitCode> {
    let store = StateStore::new(&config.output_dir);
    let merger = MergeEngine::new(store.paths().clone(), config.merge.ui_copy_path.clone());
    let report = merger.merge_discovered()?;
    println!(
        "Merged {} jobs and {} companies into {}",
        report.jobs,
        report.companies,
        report.merged_path.display()
    );
    if let Some(copy) = &report.ui_copy_path {
        println!("UI copy: {}", copy.display());
    }

    if let Some(mut session) = store.read_session_state() {
        let ids = store.paths().discover_worker_ids();
        session.total_result_count = store.total_results(&ids);
        session.last_merge_at = Some(Utc::now());
        store.write_session_state(&mut session)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn run_stop(config: &ScoutConfig, agent: Option<u32>) -> anyhow::Result<ExitCode> {
    let store = StateStore::new(&config.output_dir);
    match agent {
        Some(worker_id) => {
            let worker = config
                .worker(worker_id)
                .with_context(|| format!("unknown agent id {worker_id}"))?;
            store.set_worker_stop_signal(worker_id)?;
            println!("Stop signal sent to agent-{} ({})", worker_id, worker.name);
        }
        None => {
            store.set_stop_signal()?;
            if let Some(mut session) = store.read_session_state() {
                if session.status == SessionStatus::Running
                    && session.transition(SessionStatus::Stopped)
                {
                    store.write_session_state(&mut session)?;
                }
            }
            println!("Stop signal sent to all agents");
        }
    }
    Ok(ExitCode::SUCCESS)
}
