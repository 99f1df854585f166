use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use scout_gate::CommandGate;
use scout_observability::{emit_event, ObservabilityEvent, ProcessKind};
use scout_types::{SessionState, SessionStatus, WorkerConfig, WorkerState};

use crate::config::ScoutConfig;
use crate::error::{OrchestratorError, Result};
use crate::merge::{MergeEngine, MergeReport};
use crate::prompts::PromptLoader;
use crate::runtime::AgentRuntime;
use crate::status::{ProgressSink, StatusReport, TracingProgress};
use crate::store::StateStore;
use crate::worker::{WorkerOptions, WorkerRunner};

#[derive(Debug, Clone, Serialize)]
pub enum WorkerOutcome {
    Finished(WorkerState),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session: SessionState,
    pub workers: Vec<(u32, WorkerOutcome)>,
    pub merge: Option<MergeReport>,
}

/// Owns a roster and runs one supervised session over it.
pub struct Supervisor {
    config: ScoutConfig,
    store: StateStore,
    runtime: Arc<dyn AgentRuntime>,
    gate: Arc<CommandGate>,
    prompts: PromptLoader,
    merger: MergeEngine,
    progress: Arc<dyn ProgressSink>,
    session: Arc<Mutex<SessionState>>,
}

impl Supervisor {
    pub fn new(config: ScoutConfig, project_root: &Path, runtime: Arc<dyn AgentRuntime>) -> Self {
        let store = StateStore::new(&config.output_dir);
        let merger = MergeEngine::new(store.paths().clone(), config.merge.ui_copy_path.clone());
        let gate = Arc::new(CommandGate::new(config.gate_policy()));
        let session = SessionState::new(config.agents.len() as u32);
        Self {
            store,
            runtime,
            gate,
            prompts: PromptLoader::new(project_root),
            merger,
            progress: Arc::new(TracingProgress),
            session: Arc::new(Mutex::new(session)),
            config,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub async fn session_id(&self) -> String {
        self.session.lock().await.session_id.clone()
    }

    /// First `worker_count` roster entries, capped at the roster size.
    pub fn roster(&self, worker_count: usize) -> Vec<WorkerConfig> {
        self.config.agents.iter().take(worker_count).cloned().collect()
    }

    /// Launches the workers, monitors them until all have finished, then
    /// merges their results once.
    pub async fn run_session(
        &self,
        worker_count: usize,
        max_iterations: Option<u64>,
    ) -> Result<SessionOutcome> {
        let roster = self.roster(worker_count);
        if roster.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "at least one worker is required".to_string(),
            ));
        }
        let ids: Vec<u32> = roster.iter().map(|w| w.id).collect();

        self.prepare_directories(&ids);
        self.clear_stop_signals(&ids);

        let session_id = {
            let mut session = self.session.lock().await;
            session.worker_count = ids.len() as u32;
            session.started_at = Some(Utc::now());
            session.transition(SessionStatus::Running);
            self.write_session(&mut session);
            session.session_id.clone()
        };
        tracing::info!(
            session_id = %session_id,
            workers = ids.len(),
            "Job search orchestration - session {} starting {} agents",
            session_id,
            ids.len()
        );
        emit_event(
            Level::INFO,
            ProcessKind::Supervisor,
            ObservabilityEvent {
                session_id: Some(session_id.as_str()),
                status: Some(SessionStatus::Running.as_str()),
                ..ObservabilityEvent::new("session.started", "supervisor")
            },
        );

        let mut workers = JoinSet::new();
        for worker in &roster {
            let runner = WorkerRunner::new(
                worker.clone(),
                self.store.clone(),
                self.runtime.clone(),
                self.gate.clone(),
                self.prompts.clone(),
                WorkerOptions {
                    session_id: session_id.clone(),
                    max_iterations,
                    iteration_pause: self.config.timing.iteration_pause(),
                    allowed_tools: self.config.runtime.allowed_tools.clone(),
                    scoring: self.config.scoring.clone(),
                },
            );
            let worker_id = runner.worker_id();
            workers.spawn(async move { (worker_id, runner.run().await) });
        }

        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(monitor_loop(
            self.store.clone(),
            roster.clone(),
            self.session.clone(),
            self.progress.clone(),
            self.config.timing.monitor_interval(),
            cancel.clone(),
        ));

        let mut outcomes = Vec::with_capacity(ids.len());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((worker_id, Ok(state))) => {
                    tracing::info!(worker_id, status = state.status.as_str(), "worker finished");
                    outcomes.push((worker_id, WorkerOutcome::Finished(state)));
                }
                Ok((worker_id, Err(err))) => {
                    tracing::error!(worker_id, error = %err, "worker failed");
                    outcomes.push((worker_id, WorkerOutcome::Failed(err.to_string())));
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "worker task aborted");
                }
            }
        }
        outcomes.sort_by_key(|(id, _)| *id);

        cancel.cancel();
        if let Err(err) = monitor.await {
            tracing::warn!(error = %err, "monitor task ended abnormally");
        }

        tracing::info!("All agents complete - merging outputs");
        let merge = match self.merger.merge_workers(&ids) {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!(error = %err, "final merge failed");
                None
            }
        };

        let session = {
            let mut session = self.session.lock().await;
            session.total_result_count = self.store.total_results(&ids);
            if merge.is_some() {
                session.last_merge_at = Some(Utc::now());
                session.transition(SessionStatus::Completed);
            } else {
                session.transition(SessionStatus::Errored);
            }
            self.write_session(&mut session);
            session.clone()
        };
        emit_event(
            Level::INFO,
            ProcessKind::Supervisor,
            ObservabilityEvent {
                session_id: Some(session.session_id.as_str()),
                status: Some(session.status.as_str()),
                ..ObservabilityEvent::new("session.finished", "supervisor")
            },
        );

        Ok(SessionOutcome {
            session,
            workers: outcomes,
            merge,
        })
    }

    /// Raises the session-wide stop signal and marks the session stopped.
    /// Running workers notice at their next loop check.
    pub async fn stop_all(&self) -> Result<()> {
        self.store.set_stop_signal()?;
        let mut session = self.session.lock().await;
        session.transition(SessionStatus::Stopped);
        self.write_session(&mut session);
        tracing::info!(session_id = %session.session_id, "stop signal sent to all agents");
        Ok(())
    }

    fn prepare_directories(&self, ids: &[u32]) {
        let paths = self.store.paths();
        let dirs = std::iter::once(paths.root().to_path_buf())
            .chain(ids.iter().map(|id| paths.worker_dir(*id)))
            .chain(std::iter::once(paths.merged_dir()));
        for dir in dirs {
            if let Err(err) = fs::create_dir_all(&dir) {
                tracing::warn!(path = %dir.display(), error = %err, "could not create directory");
            }
        }
    }

    fn clear_stop_signals(&self, ids: &[u32]) {
        if let Err(err) = self.store.clear_stop_signal() {
            tracing::warn!(error = %err, "could not clear stop signal");
        }
        for id in ids {
            if let Err(err) = self.store.clear_worker_stop_signal(*id) {
                tracing::warn!(worker_id = *id, error = %err, "could not clear worker stop signal");
            }
        }
    }

    fn write_session(&self, session: &mut SessionState) {
        if let Err(err) = self.store.write_session_state(session) {
            tracing::warn!(error = %err, "could not write session state");
        }
    }
}

/// A `scout stop` from another process raises the stop signal and marks the
/// session file stopped. Fold that in so the next write does not undo it.
fn adopt_external_stop(store: &StateStore, session: &mut SessionState) {
    if session.status != SessionStatus::Running {
        return;
    }
    let stopped_on_disk = store
        .read_session_state()
        .is_some_and(|on_disk| {
            on_disk.session_id == session.session_id && on_disk.status == SessionStatus::Stopped
        });
    if stopped_on_disk || store.is_stop_signal_set() {
        tracing::info!(session_id = %session.session_id, "session stopped externally");
        session.transition(SessionStatus::Stopped);
    }
}

async fn monitor_loop(
    store: StateStore,
    roster: Vec<WorkerConfig>,
    session: Arc<Mutex<SessionState>>,
    progress: Arc<dyn ProgressSink>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let ids: Vec<u32> = roster.iter().map(|w| w.id).collect();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let report = StatusReport::collect(&store, &roster);
                progress.report(&report);
                let mut session = session.lock().await;
                adopt_external_stop(&store, &mut session);
                session.total_result_count = store.total_results(&ids);
                if let Err(err) = store.write_session_state(&mut session) {
                    tracing::warn!(error = %err, "could not write session state");
                }
            }
        }
    }
}
