//! File-backed persistence for worker and session records.
//!
//! Nothing here locks. Writers replace whole files through a rename, so a
//! concurrent reader sees either the previous version or the new one. Any
//! file that fails to parse reads as absent.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use scout_types::{SessionState, WorkerState};

use crate::error::{OrchestratorError, Result};
use crate::paths::SessionPaths;

#[derive(Debug, Clone)]
pub struct StateStore {
    paths: SessionPaths,
}

impl StateStore {
    pub fn new(output_root: impl AsRef<Path>) -> Self {
        Self {
            paths: SessionPaths::new(output_root),
        }
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn read_worker_state(&self, worker_id: u32) -> Option<WorkerState> {
        read_json(&self.paths.worker_state_file(worker_id))
    }

    /// Stamps `updated_at` and persists. `result_count` is taken as given.
    pub fn write_worker_state(&self, state: &mut WorkerState) -> Result<()> {
        state.updated_at = Some(Utc::now());
        write_json(&self.paths.worker_state_file(state.worker_id), state)
    }

    pub fn read_all_worker_states(&self, worker_ids: &[u32]) -> Vec<(u32, Option<WorkerState>)> {
        worker_ids
            .iter()
            .map(|id| (*id, self.read_worker_state(*id)))
            .collect()
    }

    pub fn read_session_state(&self) -> Option<SessionState> {
        read_json(&self.paths.session_state_file())
    }

    pub fn write_session_state(&self, state: &mut SessionState) -> Result<()> {
        state.updated_at = Some(Utc::now());
        write_json(&self.paths.session_state_file(), state)
    }

    pub fn set_stop_signal(&self) -> Result<()> {
        write_stop_marker(&self.paths.stop_signal_file())
    }

    /// Only called before a session launches its workers.
    pub fn clear_stop_signal(&self) -> Result<()> {
        remove_if_present(&self.paths.stop_signal_file())
    }

    pub fn is_stop_signal_set(&self) -> bool {
        self.paths.stop_signal_file().exists()
    }

    pub fn set_worker_stop_signal(&self, worker_id: u32) -> Result<()> {
        write_stop_marker(&self.paths.worker_stop_signal_file(worker_id))
    }

    pub fn clear_worker_stop_signal(&self, worker_id: u32) -> Result<()> {
        remove_if_present(&self.paths.worker_stop_signal_file(worker_id))
    }

    pub fn is_worker_stop_signal_set(&self, worker_id: u32) -> bool {
        self.paths.worker_stop_signal_file(worker_id).exists()
    }

    /// True when either the session-wide or the worker's own signal is set.
    pub fn should_stop(&self, worker_id: u32) -> bool {
        self.is_stop_signal_set() || self.is_worker_stop_signal_set(worker_id)
    }

    pub fn is_complete(&self, worker_id: u32) -> bool {
        self.paths.complete_flag(worker_id).exists()
    }

    /// The agent leaves `blocked.md` behind when it gets stuck.
    pub fn is_blocked(&self, worker_id: u32) -> bool {
        self.paths.blocked_file(worker_id).is_file()
    }

    /// Number of JSON objects in the worker's result array. Absent or
    /// malformed files count as zero.
    pub fn count_results(&self, worker_id: u32) -> usize {
        count_objects(&self.paths.jobs_file(worker_id))
    }

    pub fn total_results(&self, worker_ids: &[u32]) -> usize {
        worker_ids.iter().map(|id| self.count_results(*id)).sum()
    }

    /// Appends one timestamped line to the worker's `session.log`.
    pub fn append_worker_log(&self, worker_id: u32, message: &str) -> Result<()> {
        let path = self.paths.session_log(worker_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{}] {}", timestamp, message)?;
        Ok(())
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "ignoring unreadable record");
            None
        }
    }
}

pub(crate) fn count_objects(path: &Path) -> usize {
    match read_json::<Value>(path) {
        Some(Value::Array(items)) => items.iter().filter(|item| item.is_object()).count(),
        _ => 0,
    }
}

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    atomic_write(path, &content)
}

/// Atomic write through a uniquely named temp file in the target directory,
/// so concurrent writers of the same path never share a temp file.
pub(crate) fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| {
        OrchestratorError::Storage(format!(
            "Failed to create directory {}: {}",
            parent.display(),
            e
        ))
    })?;

    let prefix = format!(
        ".{}.",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("record")
    );
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| {
            OrchestratorError::Storage(format!(
                "Failed to create temp file in {}: {}",
                parent.display(),
                e
            ))
        })?;
    temp.write_all(content.as_bytes()).map_err(|e| {
        OrchestratorError::Storage(format!(
            "Failed to write temp file {}: {}",
            temp.path().display(),
            e
        ))
    })?;
    temp.persist(path).map_err(|e| {
        OrchestratorError::Storage(format!(
            "Failed to rename temp file onto {}: {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

fn write_stop_marker(path: &Path) -> Result<()> {
    let marker = json!({ "signal": "stop", "timestamp": Utc::now().to_rfc3339() });
    write_json(path, &marker)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
