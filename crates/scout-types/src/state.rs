use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    #[serde(rename = "error", alias = "errored")]
    Errored,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Pending => "pending",
            WorkerStatus::Running => "running",
            WorkerStatus::Completed => "completed",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Errored => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerStatus::Completed | WorkerStatus::Stopped | WorkerStatus::Errored
        )
    }

    pub fn can_transition(self, to: WorkerStatus) -> bool {
        if self == to {
            return true;
        }
        match self {
            WorkerStatus::Pending => matches!(
                to,
                WorkerStatus::Running | WorkerStatus::Stopped | WorkerStatus::Errored
            ),
            WorkerStatus::Running => to.is_terminal(),
            WorkerStatus::Completed | WorkerStatus::Stopped | WorkerStatus::Errored => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    #[serde(rename = "error", alias = "errored")]
    Errored,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Errored => "error",
        }
    }

    /// A stopped session still runs its final merge, which moves it to
    /// `Completed`.
    pub fn can_transition(self, to: SessionStatus) -> bool {
        if self == to {
            return true;
        }
        match self {
            SessionStatus::Pending => matches!(
                to,
                SessionStatus::Running | SessionStatus::Stopped | SessionStatus::Errored
            ),
            SessionStatus::Running => matches!(
                to,
                SessionStatus::Completed | SessionStatus::Stopped | SessionStatus::Errored
            ),
            SessionStatus::Stopped => matches!(to, SessionStatus::Completed),
            SessionStatus::Completed | SessionStatus::Errored => false,
        }
    }
}

/// Progress record owned by a single worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    #[serde(alias = "agent_id")]
    pub worker_id: u32,
    #[serde(default)]
    pub platform: String,
    pub status: WorkerStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub iteration: u64,
    #[serde(default, alias = "jobs_found")]
    pub result_count: usize,
    #[serde(default, alias = "last_search")]
    pub last_activity: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl WorkerState {
    pub fn new(worker_id: u32, platform: impl Into<String>) -> Self {
        Self {
            worker_id,
            platform: platform.into(),
            status: WorkerStatus::Pending,
            started_at: None,
            updated_at: None,
            iteration: 0,
            result_count: 0,
            last_activity: String::new(),
            error: None,
        }
    }

    /// Applies `to` if the transition table allows it. Returns whether the
    /// status changed or already matched.
    pub fn transition(&mut self, to: WorkerStatus) -> bool {
        if !self.status.can_transition(to) {
            return false;
        }
        self.status = to;
        if to != WorkerStatus::Errored {
            self.error = None;
        }
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(WorkerStatus::Errored) {
            return false;
        }
        self.error = Some(message.into());
        true
    }

    /// Iteration never moves backwards.
    pub fn advance_iteration(&mut self) -> u64 {
        self.iteration = self.iteration.saturating_add(1);
        self.iteration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(alias = "agent_count")]
    pub worker_count: u32,
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "total_jobs_found")]
    pub total_result_count: usize,
    #[serde(default)]
    pub last_merge_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(worker_count: u32) -> Self {
        Self {
            session_id: new_session_id(),
            worker_count,
            status: SessionStatus::Pending,
            started_at: None,
            updated_at: None,
            total_result_count: 0,
            last_merge_at: None,
        }
    }

    pub fn transition(&mut self, to: SessionStatus) -> bool {
        if !self.status.can_transition(to) {
            return false;
        }
        self.status = to;
        true
    }
}

/// Short opaque token, unique per supervision run.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
