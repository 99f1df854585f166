use std::fs;
use std::path::{Path, PathBuf};

use scout_types::{parse_worker_dir_name, worker_dir_name};

pub const SESSION_STATE_FILE: &str = "orchestration-state.json";
pub const STOP_SIGNAL_FILE: &str = ".stop-signal";
pub const WORKER_STATE_FILE: &str = "state.json";
pub const JOBS_FILE: &str = "jobs.json";
pub const COMPANIES_FILE: &str = "companies.json";
pub const COMPLETE_FLAG_FILE: &str = "complete.flag";
pub const SESSION_LOG_FILE: &str = "session.log";
pub const BLOCKED_FILE: &str = "blocked.md";
pub const MERGED_DIR: &str = "merged";

/// Layout of a session's output root.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(output_root: impl AsRef<Path>) -> Self {
        Self {
            root: output_root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_state_file(&self) -> PathBuf {
        self.root.join(SESSION_STATE_FILE)
    }

    pub fn stop_signal_file(&self) -> PathBuf {
        self.root.join(STOP_SIGNAL_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        scout_observability::canonical_logs_dir_from_root(&self.root)
    }

    pub fn worker_dir(&self, worker_id: u32) -> PathBuf {
        self.root.join(worker_dir_name(worker_id))
    }

    pub fn worker_state_file(&self, worker_id: u32) -> PathBuf {
        self.worker_dir(worker_id).join(WORKER_STATE_FILE)
    }

    pub fn worker_stop_signal_file(&self, worker_id: u32) -> PathBuf {
        self.worker_dir(worker_id).join(STOP_SIGNAL_FILE)
    }

    pub fn jobs_file(&self, worker_id: u32) -> PathBuf {
        self.worker_dir(worker_id).join(JOBS_FILE)
    }

    pub fn companies_file(&self, worker_id: u32) -> PathBuf {
        self.worker_dir(worker_id).join(COMPANIES_FILE)
    }

    pub fn complete_flag(&self, worker_id: u32) -> PathBuf {
        self.worker_dir(worker_id).join(COMPLETE_FLAG_FILE)
    }

    pub fn session_log(&self, worker_id: u32) -> PathBuf {
        self.worker_dir(worker_id).join(SESSION_LOG_FILE)
    }

    pub fn blocked_file(&self, worker_id: u32) -> PathBuf {
        self.worker_dir(worker_id).join(BLOCKED_FILE)
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.root.join(MERGED_DIR)
    }

    pub fn merged_jobs_file(&self) -> PathBuf {
        self.merged_dir().join(JOBS_FILE)
    }

    pub fn merged_companies_file(&self) -> PathBuf {
        self.merged_dir().join(COMPANIES_FILE)
    }

    /// Ids of every `agent-<n>` directory under the root, ascending by
    /// number. A missing root yields an empty list.
    pub fn discover_worker_ids(&self) -> Vec<u32> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut ids: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().and_then(parse_worker_dir_name))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
