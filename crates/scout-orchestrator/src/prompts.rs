use std::fs;
use std::path::{Path, PathBuf};

use scout_types::{ScoringConfig, WorkerConfig};

use crate::error::{OrchestratorError, Result};

pub const CONTINUE_PROMPT: &str = "Continue your job search.

Check your progress:
1. Read jobs.json to see what you've found so far
2. Look at session.log for your previous searches
3. Try new search queries you haven't done yet
4. Add any new jobs you find to jobs.json

If you've thoroughly searched the platform, create complete.flag with a summary.
If you encounter issues, write to blocked.md and try a different approach.
";

/// Resolves a worker's `prompt_source` against the project root.
#[derive(Debug, Clone)]
pub struct PromptLoader {
    project_root: PathBuf,
}

impl PromptLoader {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    pub fn prompt_path(&self, worker: &WorkerConfig) -> PathBuf {
        let source = Path::new(&worker.prompt_source);
        if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.project_root.join(source)
        }
    }

    pub fn load(&self, worker: &WorkerConfig) -> Result<String> {
        let path = self.prompt_path(worker);
        if !path.is_file() {
            return Err(OrchestratorError::Prompt(format!(
                "Agent prompt not found: {}",
                path.display()
            )));
        }
        fs::read_to_string(&path).map_err(|e| {
            OrchestratorError::Prompt(format!("Failed to read {}: {}", path.display(), e))
        })
    }
}

pub fn system_prompt(worker: &WorkerConfig, scoring: &ScoringConfig) -> String {
    format!(
        "You are an autonomous job search agent for the {name} platform.

Your mission is to search {domain} for job opportunities matching the candidate profile.

Your capabilities:
- Read, write, and edit files
- Execute bash commands
- Search the web for job listings
- Fetch and analyze job postings
- Track your progress

Guidelines:
1. Focus exclusively on {domain}
2. Write all outputs to the current directory
3. Update jobs.json with each new job found
4. Log progress to session.log
5. Create complete.flag when done
6. If stuck, write to blocked.md and continue
7. Only record jobs with a match_score of at least {min_score}
8. Stop once jobs.json holds {max_jobs} jobs
",
        name = worker.name,
        domain = worker.domain,
        min_score = scoring.min_score,
        max_jobs = scoring.max_jobs_per_agent,
    )
}
