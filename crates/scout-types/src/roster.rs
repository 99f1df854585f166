use serde::{Deserialize, Serialize};

/// One worker in a session roster. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub platform: String,
    pub domain: String,
    /// Opaque handle resolved by the prompt loader, usually a path relative
    /// to the project root.
    #[serde(rename = "prompt_file", alias = "prompt_source")]
    pub prompt_source: String,
}

impl WorkerConfig {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        platform: impl Into<String>,
        domain: impl Into<String>,
        prompt_source: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            platform: platform.into(),
            domain: domain.into(),
            prompt_source: prompt_source.into(),
        }
    }

    pub fn dir_name(&self) -> String {
        worker_dir_name(self.id)
    }
}

pub fn worker_dir_name(worker_id: u32) -> String {
    format!("agent-{}", worker_id)
}

/// Parses `agent-<n>` back into a worker id.
pub fn parse_worker_dir_name(name: &str) -> Option<u32> {
    name.strip_prefix("agent-")?.parse::<u32>().ok().filter(|id| *id > 0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_min_score")]
    pub min_score: u32,
    #[serde(default = "default_max_jobs_per_agent")]
    pub max_jobs_per_agent: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_jobs_per_agent: default_max_jobs_per_agent(),
        }
    }
}

fn default_min_score() -> u32 {
    70
}

fn default_max_jobs_per_agent() -> u32 {
    75
}

pub fn default_roster() -> Vec<WorkerConfig> {
    [
        (1, "GREENHOUSE", "greenhouse", "boards.greenhouse.io"),
        (2, "LEVER", "lever", "jobs.lever.co"),
        (3, "ASHBY", "ashby", "jobs.ashbyhq.com"),
        (4, "WORKABLE", "workable", "apply.workable.com"),
    ]
    .into_iter()
    .map(|(id, name, platform, domain)| {
        WorkerConfig::new(
            id,
            name,
            platform,
            domain,
            format!("prompts/agents/{}-agent.md", platform),
        )
    })
    .collect()
}
