use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::extract::{extract_programs, Extraction};
use crate::validators::{format_set, ArgumentValidator};

const DEFAULT_ALLOWED_PROGRAMS: &[&str] = &[
    "ls", "cat", "grep", "git", "python", "pip", "curl", "jq", "echo", "mkdir", "touch", "cp",
    "mv", "head", "tail", "wc", "sort", "uniq", "date", "pwd", "rm", "chmod", "pkill",
];

const DEFAULT_PKILL_TARGETS: &[&str] = &["node", "npm", "npx", "python", "uvicorn", "gunicorn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Unparseable,
    NotAllowed,
    ArgumentRejected,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Unparseable => "unparseable",
            BlockKind::NotAllowed => "not_allowed",
            BlockKind::ArgumentRejected => "argument_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block { kind: BlockKind, reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Block { reason, .. } => Some(reason),
        }
    }

    fn block(kind: BlockKind, reason: impl Into<String>) -> Self {
        Decision::Block {
            kind,
            reason: reason.into(),
        }
    }
}

/// Static tables the gate consults. Built once and handed to
/// [`CommandGate::new`]; tests swap in narrower policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    #[serde(default = "default_allowed_programs")]
    pub allowed_programs: BTreeSet<String>,
    #[serde(default = "default_validators")]
    pub validators: BTreeMap<String, ArgumentValidator>,
    #[serde(default = "default_pkill_targets")]
    pub pkill_targets: BTreeSet<String>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            allowed_programs: default_allowed_programs(),
            validators: default_validators(),
            pkill_targets: default_pkill_targets(),
        }
    }
}

impl GatePolicy {
    pub fn with_allowed<I, S>(programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_programs: programs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

fn default_allowed_programs() -> BTreeSet<String> {
    DEFAULT_ALLOWED_PROGRAMS.iter().map(|s| s.to_string()).collect()
}

fn default_validators() -> BTreeMap<String, ArgumentValidator> {
    [
        ArgumentValidator::Pkill,
        ArgumentValidator::Chmod,
        ArgumentValidator::Rm,
    ]
    .into_iter()
    .map(|v| (v.program().to_string(), v))
    .collect()
}

fn default_pkill_targets() -> BTreeSet<String> {
    DEFAULT_PKILL_TARGETS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Default)]
pub struct CommandGate {
    policy: GatePolicy,
}

impl CommandGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Programs are checked in order of appearance; the first failure wins.
    /// Only the empty string is allowed without extracting a program.
    pub fn evaluate(&self, command: &str) -> Decision {
        if command.is_empty() {
            return Decision::Allow;
        }

        let programs = match extract_programs(command) {
            Extraction::Programs(list) if !list.is_empty() => list,
            _ => {
                tracing::debug!(target: "scout.gate", "command could not be parsed");
                return Decision::block(
                    BlockKind::Unparseable,
                    format!("Could not parse command: {}", command),
                );
            }
        };

        for program in &programs {
            if !self.policy.allowed_programs.contains(program) {
                tracing::debug!(target: "scout.gate", program = %program, "program not allowed");
                return Decision::block(
                    BlockKind::NotAllowed,
                    format!(
                        "Command '{}' not in allowed list: {}",
                        program,
                        format_set(&self.policy.allowed_programs)
                    ),
                );
            }
            if let Some(validator) = self.policy.validators.get(program) {
                if let Err(reason) = validator.check(command, &self.policy.pkill_targets) {
                    tracing::debug!(target: "scout.gate", program = %program, "arguments rejected");
                    return Decision::block(BlockKind::ArgumentRejected, reason);
                }
            }
        }

        Decision::Allow
    }
}
