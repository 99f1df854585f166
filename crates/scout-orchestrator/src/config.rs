use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scout_gate::GatePolicy;
use scout_types::{default_roster, ScoringConfig, WorkerConfig};

use crate::error::{OrchestratorError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/agents.json";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_UI_COPY_PATH: &str = "ui/public/data/jobs.json";
pub const DEFAULT_AGENT_PROGRAM: &str = "claude-agent-bridge";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub program: String,
    pub args: Vec<String>,
    pub turn_timeout_secs: Option<u64>,
    pub allowed_tools: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_AGENT_PROGRAM.to_string(),
            args: Vec::new(),
            turn_timeout_secs: None,
            allowed_tools: [
                "Read", "Write", "Edit", "Glob", "Grep", "Bash", "WebSearch", "WebFetch",
                "TodoWrite",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl RuntimeConfig {
    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub iteration_pause_ms: u64,
    pub monitor_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            iteration_pause_ms: 3_000,
            monitor_interval_ms: 30_000,
        }
    }
}

impl TimingConfig {
    pub fn iteration_pause(&self) -> Duration {
        Duration::from_millis(self.iteration_pause_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Second copy of the merged results for the UI. An empty path disables it.
    pub ui_copy_path: Option<PathBuf>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ui_copy_path: Some(PathBuf::from(DEFAULT_UI_COPY_PATH)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub output_dir: PathBuf,
    pub agents: Vec<WorkerConfig>,
    pub scoring: ScoringConfig,
    pub runtime: RuntimeConfig,
    pub timing: TimingConfig,
    pub merge: MergeConfig,
    pub gate: Option<GatePolicy>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            agents: default_roster(),
            scoring: ScoringConfig::default(),
            runtime: RuntimeConfig::default(),
            timing: TimingConfig::default(),
            merge: MergeConfig::default(),
            gate: None,
        }
    }
}

impl ScoutConfig {
    pub fn gate_policy(&self) -> GatePolicy {
        self.gate.clone().unwrap_or_default()
    }

    pub fn worker(&self, worker_id: u32) -> Option<&WorkerConfig> {
        self.agents.iter().find(|w| w.id == worker_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "roster must contain at least one worker".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for worker in &self.agents {
            if worker.id == 0 {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "worker '{}' has id 0; ids must be positive",
                    worker.name
                )));
            }
            if !seen.insert(worker.id) {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "duplicate worker id {}",
                    worker.id
                )));
            }
        }
        if self.timing.monitor_interval_ms == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "timing.monitor_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Anchors relative output and UI paths at `project_root`.
    fn resolve_paths(&mut self, project_root: &Path) {
        if self.output_dir.is_relative() {
            self.output_dir = project_root.join(&self.output_dir);
        }
        self.merge.ui_copy_path = self
            .merge
            .ui_copy_path
            .take()
            .filter(|path| !path.as_os_str().is_empty())
            .map(|path| {
                if path.is_relative() {
                    project_root.join(path)
                } else {
                    path
                }
            });
    }
}

/// Builds the effective configuration: defaults, then the project file,
/// then `SCOUT_*` environment variables, then `cli_overrides`.
pub fn load_config(
    project_root: &Path,
    config_path: Option<&Path>,
    cli_overrides: Value,
) -> Result<ScoutConfig> {
    load_config_with_env(project_root, config_path, cli_overrides, |key| {
        std::env::var(key).ok()
    })
}

pub fn load_config_with_env<F>(
    project_root: &Path,
    config_path: Option<&Path>,
    cli_overrides: Value,
    env: F,
) -> Result<ScoutConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut merged = serde_json::to_value(ScoutConfig::default())?;

    let project = match config_path {
        Some(path) => {
            let path = if path.is_relative() {
                project_root.join(path)
            } else {
                path.to_path_buf()
            };
            if !path.exists() {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            read_config_file(&path)?
        }
        None => {
            let path = project_root.join(DEFAULT_CONFIG_PATH);
            if path.exists() {
                read_config_file(&path)?
            } else {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Value::Null
            }
        }
    };

    deep_merge(&mut merged, &project);
    deep_merge(&mut merged, &env_layer(env));
    deep_merge(&mut merged, &cli_overrides);

    let mut config: ScoutConfig = serde_json::from_value(merged)
        .map_err(|e| OrchestratorError::InvalidConfig(format!("config does not match schema: {}", e)))?;
    config.validate()?;
    config.resolve_paths(project_root);
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str::<Value>(&raw).map_err(|e| {
        OrchestratorError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
    })
}

fn env_layer<F>(env: F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    let mut root = json!({});
    let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = non_empty("SCOUT_OUTPUT_DIR") {
        deep_merge(&mut root, &json!({ "output_dir": dir }));
    }
    if let Some(program) = non_empty("SCOUT_AGENT_PROGRAM") {
        deep_merge(&mut root, &json!({ "runtime": { "program": program } }));
    }
    if let Some(secs) = non_empty("SCOUT_TURN_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok()) {
        deep_merge(&mut root, &json!({ "runtime": { "turn_timeout_secs": secs } }));
    }
    if let Some(ms) = non_empty("SCOUT_MONITOR_INTERVAL_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
        deep_merge(&mut root, &json!({ "timing": { "monitor_interval_ms": ms } }));
    }
    root
}

/// Recursive object merge. Null overlay values are ignored; arrays and
/// scalars replace the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_config_file() {
        let dir = tempdir().expect("tempdir");
        let config = load_config_with_env(dir.path(), None, json!({}), no_env).expect("config");
        assert_eq!(config.agents.len(), 4);
        assert_eq!(config.scoring.min_score, 70);
        assert_eq!(config.output_dir, dir.path().join("output"));
        assert_eq!(
            config.merge.ui_copy_path,
            Some(dir.path().join("ui/public/data/jobs.json"))
        );
        assert_eq!(config.timing.iteration_pause_ms, 3_000);
        assert_eq!(config.gate_policy(), GatePolicy::default());
    }

    #[test]
    fn layers_apply_in_order() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("config")).expect("mkdir");
        fs::write(
            dir.path().join("config/agents.json"),
            r#"{
                "agents": [{"id": 7, "name": "SOLO", "platform": "solo",
                            "domain": "jobs.example.com", "prompt_file": "p/solo.md"}],
                "scoring": {"min_score": 80},
                "timing": {"iteration_pause_ms": 10},
                "runtime": {"program": "from-file"}
            }"#,
        )
        .expect("write");

        let env = |key: &str| match key {
            "SCOUT_AGENT_PROGRAM" => Some("from-env".to_string()),
            "SCOUT_MONITOR_INTERVAL_MS" => Some("250".to_string()),
            _ => None,
        };
        let config = load_config_with_env(
            dir.path(),
            None,
            json!({ "output_dir": "/var/scout", "timing": { "iteration_pause_ms": null } }),
            env,
        )
        .expect("config");

        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].id, 7);
        assert_eq!(config.scoring.min_score, 80);
        assert_eq!(config.scoring.max_jobs_per_agent, 75);
        assert_eq!(config.runtime.program, "from-env");
        assert_eq!(config.timing.monitor_interval_ms, 250);
        assert_eq!(config.timing.iteration_pause_ms, 10);
        assert_eq!(config.output_dir, PathBuf::from("/var/scout"));
    }

    #[test]
    fn rejects_duplicate_or_zero_ids() {
        let mut config = ScoutConfig::default();
        config.agents[1].id = 1;
        assert!(matches!(
            config.validate(),
            Err(OrchestratorError::InvalidConfig(_))
        ));

        let mut config = ScoutConfig::default();
        config.agents[0].id = 0;
        assert!(config.validate().is_err());

        let mut config = ScoutConfig::default();
        config.agents.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let err = load_config_with_env(
            dir.path(),
            Some(Path::new("missing.json")),
            json!({}),
            no_env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn empty_ui_copy_path_disables_copy() {
        let dir = tempdir().expect("tempdir");
        let config = load_config_with_env(
            dir.path(),
            None,
            json!({ "merge": { "ui_copy_path": "" } }),
            no_env,
        )
        .expect("config");
        assert_eq!(config.merge.ui_copy_path, None);
    }

    #[test]
    fn gate_section_replaces_policy() {
        let dir = tempdir().expect("tempdir");
        let config = load_config_with_env(
            dir.path(),
            None,
            json!({ "gate": { "allowed_programs": ["ls"] } }),
            no_env,
        )
        .expect("config");
        let policy = config.gate_policy();
        assert_eq!(policy.allowed_programs.len(), 1);
        assert!(policy.allowed_programs.contains("ls"));
    }

    #[test]
    fn deep_merge_ignores_nulls_and_replaces_arrays() {
        let mut base = json!({ "a": { "b": 1, "c": [1, 2] }, "d": 1 });
        deep_merge(&mut base, &json!({ "a": { "c": [3], "e": null }, "d": null }));
        assert_eq!(base, json!({ "a": { "b": 1, "c": [3] }, "d": 1 }));
    }
}
