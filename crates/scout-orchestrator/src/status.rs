use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

use scout_types::{SessionState, WorkerConfig, WorkerState, WorkerStatus};

use crate::merge::MergeStats;
use crate::store::StateStore;

#[derive(Debug, Clone, Serialize)]
pub struct WorkerRow {
    pub worker_id: u32,
    pub name: String,
    pub state: Option<WorkerState>,
    pub blocked: bool,
}

/// Point-in-time view of a session assembled from the state files.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub session: Option<SessionState>,
    pub workers: Vec<WorkerRow>,
    pub total_results: usize,
    pub running: usize,
    pub merge_stats: Option<MergeStats>,
}

impl StatusReport {
    pub fn collect(store: &StateStore, roster: &[WorkerConfig]) -> Self {
        let workers: Vec<WorkerRow> = roster
            .iter()
            .map(|worker| WorkerRow {
                worker_id: worker.id,
                name: worker.name.clone(),
                state: store.read_worker_state(worker.id),
                blocked: store.is_blocked(worker.id),
            })
            .collect();
        let ids: Vec<u32> = roster.iter().map(|w| w.id).collect();
        let running = workers
            .iter()
            .filter(|row| matches!(&row.state, Some(s) if s.status == WorkerStatus::Running))
            .count();
        Self {
            session: store.read_session_state(),
            workers,
            total_results: store.total_results(&ids),
            running,
            merge_stats: None,
        }
    }

    pub fn with_merge_stats(mut self, stats: MergeStats) -> Self {
        self.merge_stats = Some(stats);
        self
    }

    /// Compact table printed on each monitor tick.
    pub fn render_progress(&self) -> String {
        let rule = "-".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "  Agent Status Update");
        let _ = writeln!(out, "{}", rule);
        for row in &self.workers {
            match &row.state {
                Some(state) => {
                    let _ = writeln!(
                        out,
                        "  Agent {} ({}): {} | Iter {} | {} jobs{}",
                        row.worker_id,
                        row.name,
                        state.status.as_str().to_uppercase(),
                        state.iteration,
                        state.result_count,
                        if row.blocked { " | BLOCKED" } else { "" }
                    );
                }
                None => {
                    let _ = writeln!(out, "  Agent {}: NOT STARTED", row.worker_id);
                }
            }
        }
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "  Total: {} jobs | {}/{} running",
            self.total_results,
            self.running,
            self.workers.len()
        );
        let _ = writeln!(out, "{}", rule);
        out
    }

    /// Boxed summary for the `status` command.
    pub fn render_summary(&self, now: DateTime<Utc>) -> String {
        let mut out = String::new();
        let border = format!("+{}+", "=".repeat(62));
        let _ = writeln!(out, "{}", border);
        let _ = writeln!(out, "|{:^62}|", "Job Search Orchestration");
        let _ = writeln!(out, "{}", border);
        for row in &self.workers {
            let label = format!("Agent {} ({:10})", row.worker_id, row.name);
            match &row.state {
                Some(state) => {
                    let status: String = state.status.as_str().to_uppercase().chars().take(8).collect();
                    let _ = writeln!(
                        out,
                        "| {} | {:8} | {:8} | {:8} | {:>6} |",
                        label,
                        status,
                        format!("Iter {}", state.iteration),
                        format!("{} jobs", state.result_count),
                        time_ago(state.updated_at, now)
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "| {} | {:8} | {:8} | {:8} | {:>6} |",
                        label, "NONE", "---", "---", "---"
                    );
                }
            }
        }
        let _ = writeln!(out, "+{}+", "-".repeat(62));
        let last_merge = match self.session.as_ref().and_then(|s| s.last_merge_at) {
            Some(at) => time_ago(Some(at), now),
            None => "never".to_string(),
        };
        let _ = writeln!(
            out,
            "| Total: {} jobs found | {}/{} running | Last merge: {:>8} |",
            self.total_results,
            self.running,
            self.workers.len(),
            last_merge
        );
        let _ = writeln!(out, "{}", border);
        let blocked: Vec<String> = self
            .workers
            .iter()
            .filter(|row| row.blocked)
            .map(|row| format!("agent-{}", row.worker_id))
            .collect();
        if !blocked.is_empty() {
            let _ = writeln!(out, "Blocked: {} (see blocked.md)", blocked.join(", "));
        }
        if let Some(stats) = &self.merge_stats {
            if stats.merged_jobs > 0 {
                let _ = writeln!(out, "Merged output: {} jobs", stats.merged_jobs);
            }
        }
        out
    }
}

/// `"<n>m ago"` under an hour, `"<n>h ago"` beyond, `"?"` when unknown.
pub fn time_ago(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "?".to_string();
    };
    let mins = (now - at).num_minutes().max(0);
    if mins < 60 {
        format!("{}m ago", mins)
    } else {
        format!("{}h ago", mins / 60)
    }
}

/// Receives a fresh report on every monitor tick.
pub trait ProgressSink: Send + Sync {
    fn report(&self, report: &StatusReport);
}

/// Default sink: writes the progress table through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, report: &StatusReport) {
        tracing::info!("\n{}", report.render_progress());
    }
}
