use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

static CHMOD_EXEC_MODE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[ugoa]*\+x$").ok());

/// Second-stage check for programs whose argument space is only partly safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentValidator {
    Pkill,
    Chmod,
    Rm,
}

impl ArgumentValidator {
    pub fn program(self) -> &'static str {
        match self {
            ArgumentValidator::Pkill => "pkill",
            ArgumentValidator::Chmod => "chmod",
            ArgumentValidator::Rm => "rm",
        }
    }

    /// Runs against the whole, untokenized command string. `Err` carries the
    /// block reason.
    pub fn check(self, command: &str, pkill_targets: &BTreeSet<String>) -> Result<(), String> {
        let Some(tokens) = shlex::split(command) else {
            return Err(format!("Could not parse {} command", self.program()));
        };
        match self {
            ArgumentValidator::Pkill => check_pkill(&tokens, pkill_targets),
            ArgumentValidator::Chmod => check_chmod(&tokens),
            ArgumentValidator::Rm => check_rm(&tokens),
        }
    }
}

fn check_pkill(tokens: &[String], targets: &BTreeSet<String>) -> Result<(), String> {
    let args: Vec<&str> = tokens
        .iter()
        .skip(1)
        .map(String::as_str)
        .filter(|t| !t.starts_with('-'))
        .collect();
    let Some(last) = args.last() else {
        return Err("pkill requires a process name".to_string());
    };
    // `pkill -f "node server.js"` targets `node`.
    let target = last.split_whitespace().next().unwrap_or_default();
    if targets.contains(target) {
        return Ok(());
    }
    Err(format!("pkill only allowed for: {}", format_set(targets)))
}

fn check_chmod(tokens: &[String]) -> Result<(), String> {
    if tokens.first().map(String::as_str) != Some("chmod") {
        return Err("Not a chmod command".to_string());
    }
    let mut mode: Option<&str> = None;
    for token in &tokens[1..] {
        if token.starts_with('-') {
            return Err("chmod flags not allowed".to_string());
        }
        if mode.is_none() {
            mode = Some(token);
        }
    }
    let Some(mode) = mode else {
        return Err("chmod requires a mode".to_string());
    };
    let matches = CHMOD_EXEC_MODE
        .as_ref()
        .map(|re| re.is_match(mode))
        .unwrap_or(false);
    if !matches {
        return Err(format!("chmod only allowed with +x, got: {}", mode));
    }
    Ok(())
}

fn check_rm(tokens: &[String]) -> Result<(), String> {
    let forbidden = tokens
        .iter()
        .skip(1)
        .any(|t| t.starts_with('-') && (t.contains('r') || t.contains('f')));
    if forbidden {
        return Err("rm -r and rm -f are not allowed".to_string());
    }
    Ok(())
}

pub(crate) fn format_set(items: &BTreeSet<String>) -> String {
    let joined = items.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    format!("{{{}}}", joined)
}
