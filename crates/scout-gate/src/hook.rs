use serde_json::Value;

use crate::policy::{CommandGate, Decision};

/// Tool names that execute arbitrary shell text.
pub fn is_shell_tool(tool_name: &str) -> bool {
    matches!(
        tool_name.to_ascii_lowercase().as_str(),
        "bash" | "shell" | "run_command" | "terminal" | "cmd"
    )
}

pub fn shell_command(args: &Value) -> Option<&str> {
    args.get("command")
        .and_then(|v| v.as_str())
        .or_else(|| args.get("cmd").and_then(|v| v.as_str()))
        .or_else(|| args.get("script").and_then(|v| v.as_str()))
}

impl CommandGate {
    /// Gate hook for agent tool invocations. Only shell tools are evaluated;
    /// every other tool passes through.
    pub fn check_tool_call(&self, tool_name: &str, args: &Value) -> Decision {
        if !is_shell_tool(tool_name) {
            return Decision::Allow;
        }
        match shell_command(args) {
            Some(command) if !command.is_empty() => self.evaluate(command),
            _ => Decision::Allow,
        }
    }
}
