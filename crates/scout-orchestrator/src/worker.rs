use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

use scout_gate::{CommandGate, Decision};
use scout_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use scout_types::{ScoringConfig, WorkerConfig, WorkerState, WorkerStatus};

use crate::error::{OrchestratorError, Result};
use crate::prompts::{system_prompt, PromptLoader, CONTINUE_PROMPT};
use crate::runtime::{AgentRuntime, ToolVerdict, TurnHandler, TurnRequest};
use crate::store::StateStore;

const TEXT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub session_id: String,
    /// Turns allowed in this run. `None` runs until stopped or complete.
    pub max_iterations: Option<u64>,
    pub iteration_pause: Duration,
    pub allowed_tools: Vec<String>,
    pub scoring: ScoringConfig,
}

/// One worker's iterate-until-stop loop.
pub struct WorkerRunner {
    config: WorkerConfig,
    store: StateStore,
    runtime: Arc<dyn AgentRuntime>,
    gate: Arc<CommandGate>,
    prompts: PromptLoader,
    options: WorkerOptions,
    state: WorkerState,
}

impl WorkerRunner {
    pub fn new(
        config: WorkerConfig,
        store: StateStore,
        runtime: Arc<dyn AgentRuntime>,
        gate: Arc<CommandGate>,
        prompts: PromptLoader,
        options: WorkerOptions,
    ) -> Self {
        let mut state = WorkerState::new(config.id, config.platform.clone());
        // Iteration carries over from an earlier run of the same worker.
        if let Some(previous) = store.read_worker_state(config.id) {
            state.iteration = previous.iteration;
        }
        Self {
            config,
            store,
            runtime,
            gate,
            prompts,
            options,
            state,
        }
    }

    pub fn worker_id(&self) -> u32 {
        self.config.id
    }

    /// Runs until the worker stops, completes, exhausts its turns or hits a
    /// fatal fault. A fatal fault is recorded as `Errored` before it is
    /// returned.
    pub async fn run(mut self) -> Result<WorkerState> {
        tracing::info!(worker_id = self.config.id, "starting {} worker", self.config.name);
        match self.run_inner().await {
            Ok(()) => Ok(self.state),
            Err(err) => {
                let message = err.to_string();
                self.record_fatal(&message);
                Err(OrchestratorError::Worker {
                    worker_id: self.config.id,
                    message,
                })
            }
        }
    }

    async fn run_inner(&mut self) -> Result<()> {
        self.state.started_at = Some(Utc::now());
        self.set_status(WorkerStatus::Running)?;
        self.log(&format!("Starting {} job search", self.config.name));

        let working_dir = self.store.paths().worker_dir(self.config.id);
        fs::create_dir_all(&working_dir).map_err(|e| {
            OrchestratorError::Storage(format!(
                "cannot create working directory {}: {}",
                working_dir.display(),
                e
            ))
        })?;
        let prompt = self.prompts.load(&self.config)?;
        let system_prompt = system_prompt(&self.config, &self.options.scoring);

        let mut turns: u64 = 0;
        loop {
            if self.turns_exhausted(turns) {
                break;
            }
            if self.store.should_stop(self.config.id) {
                tracing::info!(worker_id = self.config.id, "stop signal received");
                self.set_status(WorkerStatus::Stopped)?;
                self.log("Stopped by orchestrator");
                return Ok(());
            }

            turns += 1;
            let iteration = self.state.advance_iteration();
            self.state.last_activity = format!("Iteration {}", iteration);
            self.persist()?;
            self.log(&format!("Starting iteration {}", iteration));
            tracing::info!(worker_id = self.config.id, iteration, "iteration started");

            let request = TurnRequest {
                worker_id: self.config.id,
                prompt: if turns == 1 {
                    prompt.clone()
                } else {
                    CONTINUE_PROMPT.to_string()
                },
                system_prompt: system_prompt.clone(),
                allowed_tools: self.options.allowed_tools.clone(),
                working_dir: working_dir.clone(),
            };
            let handler = GatedTurnHandler {
                worker_id: self.config.id,
                session_id: &self.options.session_id,
                gate: self.gate.as_ref(),
            };
            if let Err(err) = self.runtime.run_turn(request, &handler).await {
                tracing::warn!(worker_id = self.config.id, iteration, error = %err, "agent turn failed");
                let detail = err.to_string();
                emit_event(
                    Level::WARN,
                    ProcessKind::Supervisor,
                    ObservabilityEvent {
                        session_id: Some(self.options.session_id.as_str()),
                        worker_id: Some(self.config.id),
                        iteration: Some(iteration),
                        error_code: Some("turn_failed"),
                        detail: Some(detail.as_str()),
                        ..ObservabilityEvent::new("worker.turn_failed", "worker")
                    },
                );
                self.log(&format!("Error in iteration {}: {}", iteration, err));
            }

            if self.store.is_complete(self.config.id) {
                self.set_status(WorkerStatus::Completed)?;
                self.log(&format!("Completed after {} iterations", turns));
                return Ok(());
            }
            if self.turns_exhausted(turns) {
                break;
            }
            tokio::time::sleep(self.options.iteration_pause).await;
        }

        if self.state.status == WorkerStatus::Running {
            self.set_status(WorkerStatus::Completed)?;
            self.log(&format!("Finished after {} iterations", turns));
        }
        Ok(())
    }

    fn turns_exhausted(&self, turns: u64) -> bool {
        self.options.max_iterations.is_some_and(|max| turns >= max)
    }

    /// Recomputes the result count from disk and writes the record.
    fn persist(&mut self) -> Result<()> {
        self.state.result_count = self.store.count_results(self.config.id);
        self.store.write_worker_state(&mut self.state)
    }

    fn set_status(&mut self, status: WorkerStatus) -> Result<()> {
        if !self.state.transition(status) {
            tracing::warn!(
                worker_id = self.config.id,
                from = self.state.status.as_str(),
                to = status.as_str(),
                "ignoring invalid worker transition"
            );
            return Ok(());
        }
        emit_event(
            Level::INFO,
            ProcessKind::Supervisor,
            ObservabilityEvent {
                session_id: Some(self.options.session_id.as_str()),
                worker_id: Some(self.config.id),
                iteration: Some(self.state.iteration),
                status: Some(status.as_str()),
                ..ObservabilityEvent::new("worker.status", "worker")
            },
        );
        self.persist()
    }

    fn record_fatal(&mut self, message: &str) {
        tracing::error!(worker_id = self.config.id, error = %message, "worker failed");
        emit_event(
            Level::ERROR,
            ProcessKind::Supervisor,
            ObservabilityEvent {
                session_id: Some(self.options.session_id.as_str()),
                worker_id: Some(self.config.id),
                iteration: Some(self.state.iteration),
                status: Some(WorkerStatus::Errored.as_str()),
                error_code: Some("worker_fatal"),
                detail: Some(message),
                ..ObservabilityEvent::new("worker.fatal", "worker")
            },
        );
        if self.state.fail(message) {
            if let Err(err) = self.persist() {
                tracing::warn!(worker_id = self.config.id, error = %err, "could not record worker failure");
            }
        }
        self.log(&format!("Fatal error: {}", message));
    }

    fn log(&self, message: &str) {
        if let Err(err) = self.store.append_worker_log(self.config.id, message) {
            tracing::debug!(worker_id = self.config.id, error = %err, "session.log append failed");
        }
    }
}

/// Logs agent output and routes every tool request through the gate.
struct GatedTurnHandler<'a> {
    worker_id: u32,
    session_id: &'a str,
    gate: &'a CommandGate,
}

impl TurnHandler for GatedTurnHandler<'_> {
    fn on_text(&self, text: &str) {
        tracing::info!(worker_id = self.worker_id, "{}", preview(text));
    }

    fn on_tool_use(&self, name: &str, input: &Value) -> ToolVerdict {
        tracing::info!(worker_id = self.worker_id, tool = name, "tool requested");
        match self.gate.check_tool_call(name, input) {
            Decision::Allow => ToolVerdict::Allow,
            Decision::Block { kind, reason } => {
                let command = scout_gate::shell_command(input).unwrap_or_default();
                let detail = redact_text(command);
                emit_event(
                    Level::WARN,
                    ProcessKind::Supervisor,
                    ObservabilityEvent {
                        session_id: Some(self.session_id),
                        worker_id: Some(self.worker_id),
                        error_code: Some(kind.as_str()),
                        detail: Some(detail.as_str()),
                        ..ObservabilityEvent::new("gate.block", "gate")
                    },
                );
                ToolVerdict::Block(reason)
            }
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(TEXT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
