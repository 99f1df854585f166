//! Combines per-worker result files into one ranked, deduplicated list.
//!
//! Jobs: workers are read in ascending id order and the first record seen
//! for a `job_url` wins. The combined list is then stably sorted by
//! `match_score`, highest first.
//!
//! Companies: keyed by name, and a later worker's record replaces an
//! earlier one while keeping the original position.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use scout_types::{company_name, job_url, match_score, worker_dir_name};

use crate::error::Result;
use crate::paths::SessionPaths;
use crate::store::{atomic_write, count_objects};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub jobs: usize,
    pub companies: usize,
    pub merged_path: PathBuf,
    pub ui_copy_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerMergeStats {
    pub jobs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub merged_jobs: usize,
    pub merged_companies: usize,
    /// Keyed by worker directory name.
    pub agents: BTreeMap<String, WorkerMergeStats>,
}

#[derive(Debug, Clone)]
pub struct MergeEngine {
    paths: SessionPaths,
    ui_copy_path: Option<PathBuf>,
}

impl MergeEngine {
    pub fn new(paths: SessionPaths, ui_copy_path: Option<PathBuf>) -> Self {
        Self {
            paths,
            ui_copy_path,
        }
    }

    /// Merges workers `1..=worker_count`.
    pub fn merge(&self, worker_count: u32) -> Result<MergeReport> {
        let ids: Vec<u32> = (1..=worker_count).collect();
        self.merge_workers(&ids)
    }

    /// Merges every `agent-<n>` directory found under the output root.
    pub fn merge_discovered(&self) -> Result<MergeReport> {
        let ids = self.paths.discover_worker_ids();
        self.merge_workers(&ids)
    }

    pub fn merge_workers(&self, worker_ids: &[u32]) -> Result<MergeReport> {
        let mut ids = worker_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let jobs = self.collect_jobs(&ids);
        let content = serde_json::to_string_pretty(&jobs)?;
        let merged_path = self.paths.merged_jobs_file();
        atomic_write(&merged_path, &content)?;
        tracing::info!(jobs = jobs.len(), path = %merged_path.display(), "merged worker results");

        if let Some(ui_path) = &self.ui_copy_path {
            atomic_write(ui_path, &content)?;
            tracing::info!(path = %ui_path.display(), "copied merged results for the UI");
        }

        let companies = self.merge_companies(&ids)?;

        Ok(MergeReport {
            jobs: jobs.len(),
            companies,
            merged_path,
            ui_copy_path: self.ui_copy_path.clone(),
        })
    }

    fn collect_jobs(&self, ids: &[u32]) -> Vec<Value> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut jobs = Vec::new();
        for id in ids {
            let Some(items) = read_array(&self.paths.jobs_file(*id)) else {
                continue;
            };
            for item in items {
                let Some(url) = job_url(&item) else {
                    continue;
                };
                if seen.insert(url.to_string()) {
                    jobs.push(item);
                }
            }
        }
        jobs.sort_by(|a, b| match_score(b).total_cmp(&match_score(a)));
        jobs
    }

    /// Writes `merged/companies.json` when at least one company was found.
    /// Returns the number of distinct companies.
    fn merge_companies(&self, ids: &[u32]) -> Result<usize> {
        let mut companies = Map::new();
        for id in ids {
            let path = self.paths.companies_file(*id);
            match read_value(&path) {
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Some(name) = company_name(&item).map(str::to_string) {
                            companies.insert(name, item);
                        }
                    }
                }
                Some(Value::Object(map)) => {
                    for (name, data) in map {
                        companies.insert(name, data);
                    }
                }
                Some(_) => {
                    tracing::warn!(path = %path.display(), "companies file is neither a list nor a map");
                }
                None => {}
            }
        }

        if companies.is_empty() {
            return Ok(0);
        }

        let count = companies.len();
        let merged: Vec<Value> = companies.into_iter().map(|(_, data)| data).collect();
        let path = self.paths.merged_companies_file();
        atomic_write(&path, &serde_json::to_string_pretty(&merged)?)?;
        tracing::info!(companies = count, path = %path.display(), "merged companies");
        Ok(count)
    }

    /// Counts already-merged output plus each discovered worker's results.
    pub fn stats(&self) -> MergeStats {
        let agents = self
            .paths
            .discover_worker_ids()
            .into_iter()
            .map(|id| {
                let jobs = count_objects(&self.paths.jobs_file(id));
                (worker_dir_name(id), WorkerMergeStats { jobs })
            })
            .collect();
        MergeStats {
            merged_jobs: count_objects(&self.paths.merged_jobs_file()),
            merged_companies: count_objects(&self.paths.merged_companies_file()),
            agents,
        }
    }
}

/// Reads and parses `path`. Absent files are silent; unreadable or invalid
/// ones are logged and skipped.
fn read_value(path: &Path) -> Option<Value> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not read worker file");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not parse worker file");
            None
        }
    }
}

fn read_array(path: &Path) -> Option<Vec<Value>> {
    match read_value(path)? {
        Value::Array(items) => Some(items),
        _ => {
            tracing::warn!(path = %path.display(), "result file is not a list");
            None
        }
    }
}
