//! Seam between workers and the external agent runtime.

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::config::RuntimeConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRequest {
    pub worker_id: u32,
    pub prompt: String,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolVerdict {
    Allow,
    Block(String),
}

impl ToolVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ToolVerdict::Allow)
    }
}

/// Receives the events of one turn as they stream in.
pub trait TurnHandler: Send + Sync {
    fn on_text(&self, text: &str);

    /// Called before the runtime executes a tool.
    fn on_tool_use(&self, name: &str, input: &Value) -> ToolVerdict;
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runs one agent turn to completion. An `Err` is a transient fault for
    /// the calling worker.
    async fn run_turn(&self, request: TurnRequest, handler: &dyn TurnHandler)
        -> anyhow::Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AgentEvent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    Error {
        message: String,
    },
    Done,
}

/// Drives an agent bridge program over stdio.
///
/// The program is started in the worker's directory and receives one JSON
/// line `{"type":"turn",...}` on stdin. It answers with newline-delimited
/// JSON events on stdout: `text`, `tool_use` (each answered on stdin with a
/// `tool_decision` line), `error` and `done`. Lines that are not JSON are
/// treated as plain text output.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    program: String,
    args: Vec<String>,
    turn_timeout: Option<Duration>,
}

impl ProcessRuntime {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            turn_timeout: None,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
            .with_turn_timeout(config.turn_timeout())
    }

    pub fn with_turn_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.turn_timeout = timeout;
        self
    }

    async fn exchange(&self, request: TurnRequest, handler: &dyn TurnHandler) -> anyhow::Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start agent program `{}`", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("agent stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("agent stdout unavailable"))?;
        if let Some(stderr) = child.stderr.take() {
            let worker_id = request.worker_id;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(worker_id, "agent stderr: {}", line);
                }
            });
        }

        let turn = json!({
            "type": "turn",
            "worker_id": request.worker_id,
            "prompt": request.prompt,
            "system_prompt": request.system_prompt,
            "allowed_tools": request.allowed_tools,
            "working_dir": request.working_dir,
        });
        write_line(&mut stdin, &turn).await?;

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
                handler.on_text(trimmed);
                continue;
            };
            match serde_json::from_value::<AgentEvent>(value) {
                Ok(AgentEvent::Text { text }) => handler.on_text(&text),
                Ok(AgentEvent::ToolUse { id, name, input }) => {
                    let decision = match handler.on_tool_use(&name, &input) {
                        ToolVerdict::Allow => json!({
                            "type": "tool_decision", "id": id, "decision": "allow"
                        }),
                        ToolVerdict::Block(reason) => json!({
                            "type": "tool_decision", "id": id, "decision": "block", "reason": reason
                        }),
                    };
                    write_line(&mut stdin, &decision).await?;
                }
                Ok(AgentEvent::Error { message }) => bail!("agent reported error: {}", message),
                Ok(AgentEvent::Done) => break,
                Err(err) => {
                    tracing::debug!(worker_id = request.worker_id, error = %err, "ignoring unknown agent event");
                }
            }
        }

        drop(stdin);
        let status = child.wait().await.context("failed waiting for agent program")?;
        if !status.success() {
            bail!("agent program exited with {}", status);
        }
        Ok(())
    }
}

async fn write_line<W>(writer: &mut W, value: &Value) -> anyhow::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .context("failed writing to agent stdin")?;
    writer.flush().await.context("failed flushing agent stdin")?;
    Ok(())
}

#[async_trait]
impl AgentRuntime for ProcessRuntime {
    async fn run_turn(
        &self,
        request: TurnRequest,
        handler: &dyn TurnHandler,
    ) -> anyhow::Result<()> {
        match self.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(request, handler))
                .await
                .map_err(|_| anyhow!("agent turn timed out after {:?}", limit))?,
            None => self.exchange(request, handler).await,
        }
    }
}
