use async_trait::async_trait;
use scout_orchestrator::{
    AgentRuntime, MergeConfig, ScoutConfig, StateStore, Supervisor, TimingConfig, ToolVerdict,
    TurnHandler, TurnRequest, WorkerOutcome, CONTINUE_PROMPT,
};
use scout_types::{SessionStatus, WorkerConfig, WorkerStatus};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

type Script = dyn Fn(&TurnRequest, &dyn TurnHandler, usize) -> anyhow::Result<()> + Send + Sync;

/// Stand-in agent runtime: records each turn, waits `delay`, then runs
/// `script` with the worker's 1-based turn number.
struct FakeRuntime {
    delay: Duration,
    calls: Mutex<Vec<(u32, String)>>,
    finished: AtomicUsize,
    script: Box<Script>,
}

impl FakeRuntime {
    fn new<F>(delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(&TurnRequest, &dyn TurnHandler, usize) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Arc::new(Self {
            delay,
            calls: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
            script: Box::new(script),
        })
    }

    fn prompts_for(&self, worker_id: u32) -> Vec<String> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|(id, _)| *id == worker_id)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    fn started(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }
}

#[async_trait]
impl AgentRuntime for FakeRuntime {
    async fn run_turn(
        &self,
        request: TurnRequest,
        handler: &dyn TurnHandler,
    ) -> anyhow::Result<()> {
        let turn = {
            let mut calls = self.calls.lock().expect("lock");
            calls.push((request.worker_id, request.prompt.clone()));
            calls.iter().filter(|(id, _)| *id == request.worker_id).count()
        };
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        (self.script)(&request, handler, turn)
    }
}

fn worker(id: u32, platform: &str) -> WorkerConfig {
    WorkerConfig::new(
        id,
        platform.to_uppercase(),
        platform,
        format!("jobs.{platform}.example"),
        format!("prompts/agents/{platform}-agent.md"),
    )
}

/// Project root with prompt files for every platform in `with_prompts`.
fn project(roster: &[WorkerConfig], with_prompts: &[&str]) -> (TempDir, ScoutConfig) {
    let dir = tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("prompts/agents")).expect("mkdir");
    for platform in with_prompts {
        fs::write(
            dir.path().join(format!("prompts/agents/{platform}-agent.md")),
            format!("Search {platform} thoroughly."),
        )
        .expect("prompt");
    }
    let config = ScoutConfig {
        output_dir: dir.path().join("output"),
        agents: roster.to_vec(),
        timing: TimingConfig {
            iteration_pause_ms: 10,
            monitor_interval_ms: 25,
        },
        merge: MergeConfig {
            ui_copy_path: Some(dir.path().join("ui/public/data/jobs.json")),
        },
        ..ScoutConfig::default()
    };
    (dir, config)
}

fn write_jobs(dir: &Path, jobs: Value) {
    fs::write(dir.join("jobs.json"), jobs.to_string()).expect("jobs");
}

fn output(dir: &TempDir) -> PathBuf {
    dir.path().join("output")
}

#[tokio::test]
async fn fatal_worker_does_not_stop_siblings_and_merge_runs_once() {
    let roster = vec![worker(1, "alpha"), worker(2, "beta"), worker(3, "gamma")];
    let (dir, config) = project(&roster, &["alpha", "gamma"]);

    let runtime = FakeRuntime::new(Duration::from_millis(5), |request, _handler, turn| {
        let jobs = match request.worker_id {
            1 => json!([
                {"job_url": "https://jobs/shared", "match_score": 60, "from": 1},
                {"job_url": "https://jobs/w1", "match_score": 80}
            ]),
            _ => json!([{"job_url": "https://jobs/shared", "match_score": 99, "from": 3}]),
        };
        write_jobs(&request.working_dir, jobs);
        if turn == 2 {
            fs::write(request.working_dir.join("complete.flag"), "done")?;
        }
        Ok(())
    });

    let supervisor = Supervisor::new(config, dir.path(), runtime.clone());
    let outcome = supervisor.run_session(3, None).await.expect("session");

    assert_eq!(outcome.workers.len(), 3);
    match &outcome.workers[0] {
        (1, WorkerOutcome::Finished(state)) => {
            assert_eq!(state.status, WorkerStatus::Completed);
            assert_eq!(state.iteration, 2);
        }
        other => panic!("unexpected outcome for worker 1: {other:?}"),
    }
    assert!(matches!(&outcome.workers[1], (2, WorkerOutcome::Failed(msg)) if msg.contains("Agent prompt not found")));
    assert!(matches!(&outcome.workers[2], (3, WorkerOutcome::Finished(s)) if s.status == WorkerStatus::Completed));

    let store = supervisor.store();
    let failed = store.read_worker_state(2).expect("worker 2 state");
    assert_eq!(failed.status, WorkerStatus::Errored);
    assert!(failed.error.as_deref().unwrap_or_default().contains("Agent prompt not found"));
    let completed = store.read_worker_state(1).expect("worker 1 state");
    assert_eq!(completed.result_count, 2);
    assert!(completed.error.is_none());

    assert_eq!(
        runtime.prompts_for(1),
        vec!["Search alpha thoroughly.".to_string(), CONTINUE_PROMPT.to_string()]
    );
    assert!(runtime.prompts_for(2).is_empty());

    let merge = outcome.merge.expect("merge report");
    assert_eq!(merge.jobs, 2);
    let merged: Value = serde_json::from_str(
        &fs::read_to_string(output(&dir).join("merged/jobs.json")).expect("merged"),
    )
    .expect("json");
    assert_eq!(merged[0]["job_url"], "https://jobs/w1");
    assert_eq!(merged[1]["from"], 1);
    assert!(dir.path().join("ui/public/data/jobs.json").exists());

    let session = store.read_session_state().expect("session");
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.worker_count, 3);
    assert_eq!(session.total_result_count, 3);
    assert!(session.last_merge_at.is_some());
    assert_eq!(outcome.session.session_id.len(), 8);

    let log = fs::read_to_string(output(&dir).join("agent-1/session.log")).expect("log");
    assert!(log.contains("Starting ALPHA job search"));
    assert!(log.contains("Completed after 2 iterations"));
}

#[tokio::test]
async fn stop_signal_lets_in_flight_turns_finish() {
    let roster = vec![worker(1, "alpha"), worker(2, "beta")];
    let (dir, config) = project(&roster, &["alpha", "beta"]);
    let runtime = FakeRuntime::new(Duration::from_millis(100), |_request, _handler, _turn| Ok(()));

    let supervisor = Supervisor::new(config, dir.path(), runtime.clone());
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        supervisor.stop_all().await.expect("stop");
    };
    let (outcome, ()) = tokio::join!(supervisor.run_session(2, None), stopper);
    let outcome = outcome.expect("session");

    for (id, result) in &outcome.workers {
        match result {
            WorkerOutcome::Finished(state) => {
                assert_eq!(state.status, WorkerStatus::Stopped, "worker {id}");
                assert!(state.iteration <= 3, "worker {id} ran {} turns", state.iteration);
            }
            WorkerOutcome::Failed(msg) => panic!("worker {id} failed: {msg}"),
        }
    }
    assert_eq!(runtime.started(), runtime.finished.load(Ordering::SeqCst));
    assert!(supervisor.store().is_stop_signal_set());

    let session = supervisor.store().read_session_state().expect("session");
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.last_merge_at.is_some());
}

#[tokio::test]
async fn stop_from_another_process_survives_monitor_ticks() {
    let roster = vec![worker(1, "alpha")];
    let (dir, config) = project(&roster, &["alpha"]);
    let runtime = FakeRuntime::new(Duration::from_millis(150), |_request, _handler, _turn| Ok(()));
    let supervisor = Supervisor::new(config, dir.path(), runtime);

    let external = async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        // Same steps as `scout stop` run from a second shell.
        let store = StateStore::new(output(&dir));
        store.set_stop_signal().expect("signal");
        let mut session = store.read_session_state().expect("session");
        session.transition(SessionStatus::Stopped);
        store.write_session_state(&mut session).expect("write");

        tokio::time::sleep(Duration::from_millis(80)).await;
        store.read_session_state().expect("session").status
    };
    let (outcome, mid_run) = tokio::join!(supervisor.run_session(1, None), external);

    assert_eq!(mid_run, SessionStatus::Stopped);
    let outcome = outcome.expect("session");
    assert!(matches!(&outcome.workers[0], (1, WorkerOutcome::Finished(s)) if s.status == WorkerStatus::Stopped));
    assert_eq!(outcome.session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn per_worker_stop_leaves_siblings_running() {
    let roster = vec![worker(1, "alpha"), worker(2, "beta")];
    let (dir, config) = project(&roster, &["alpha", "beta"]);
    let runtime = FakeRuntime::new(Duration::from_millis(40), |_request, _handler, _turn| Ok(()));

    let supervisor = Supervisor::new(config, dir.path(), runtime.clone());
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        supervisor.store().set_worker_stop_signal(2).expect("stop worker 2");
    };
    let (outcome, ()) = tokio::join!(supervisor.run_session(2, Some(5)), stopper);
    outcome.expect("session");

    let first = supervisor.store().read_worker_state(1).expect("worker 1");
    let second = supervisor.store().read_worker_state(2).expect("worker 2");
    assert_eq!(first.status, WorkerStatus::Completed);
    assert_eq!(first.iteration, 5);
    assert_eq!(second.status, WorkerStatus::Stopped);
    assert!(second.iteration < 5);
}

#[tokio::test]
async fn turn_failures_are_transient_and_iterations_resume() {
    let roster = vec![worker(1, "alpha")];
    let (dir, config) = project(&roster, &["alpha"]);
    let runtime = FakeRuntime::new(Duration::from_millis(1), |_request, _handler, turn| {
        if turn == 1 {
            anyhow::bail!("runtime hiccup");
        }
        Ok(())
    });

    let supervisor = Supervisor::new(config.clone(), dir.path(), runtime.clone());
    supervisor.run_session(1, Some(2)).await.expect("first run");
    let state = supervisor.store().read_worker_state(1).expect("state");
    assert_eq!(state.status, WorkerStatus::Completed);
    assert_eq!(state.iteration, 2);
    assert_eq!(state.last_activity, "Iteration 2");
    let log = fs::read_to_string(output(&dir).join("agent-1/session.log")).expect("log");
    assert!(log.contains("Error in iteration 1: runtime hiccup"));
    assert!(log.contains("Finished after 2 iterations"));

    let again = Supervisor::new(config, dir.path(), runtime.clone());
    again.run_session(1, Some(2)).await.expect("second run");
    let state = again.store().read_worker_state(1).expect("state");
    assert_eq!(state.iteration, 4);
    assert_eq!(runtime.prompts_for(1)[2], "Search alpha thoroughly.");
}

#[tokio::test]
async fn shell_tool_requests_pass_through_the_gate() {
    let roster = vec![worker(1, "alpha")];
    let (dir, config) = project(&roster, &["alpha"]);
    let verdicts: Arc<Mutex<Vec<ToolVerdict>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = verdicts.clone();
    let runtime = FakeRuntime::new(Duration::from_millis(1), move |_request, handler, _turn| {
        let mut seen = seen.lock().expect("lock");
        seen.push(handler.on_tool_use("Bash", &json!({"command": "sudo rm -rf /"})));
        seen.push(handler.on_tool_use("Bash", &json!({"command": "ls -la && git status"})));
        seen.push(handler.on_tool_use("Write", &json!({"path": "jobs.json"})));
        handler.on_text("found nothing yet");
        Ok(())
    });

    let supervisor = Supervisor::new(config, dir.path(), runtime);
    supervisor.run_session(1, Some(1)).await.expect("session");

    let verdicts = verdicts.lock().expect("lock");
    assert_eq!(verdicts.len(), 3);
    assert!(matches!(&verdicts[0], ToolVerdict::Block(reason) if reason.contains("'sudo'")));
    assert_eq!(verdicts[1], ToolVerdict::Allow);
    assert_eq!(verdicts[2], ToolVerdict::Allow);
}

#[tokio::test]
async fn roster_is_capped_and_empty_request_rejected() {
    let roster = vec![worker(1, "alpha")];
    let (dir, config) = project(&roster, &["alpha"]);
    let runtime = FakeRuntime::new(Duration::from_millis(1), |_request, _handler, _turn| Ok(()));
    let supervisor = Supervisor::new(config, dir.path(), runtime);

    assert_eq!(supervisor.roster(4).len(), 1);
    assert!(supervisor.run_session(0, Some(1)).await.is_err());
    let outcome = supervisor.run_session(4, Some(1)).await.expect("session");
    assert_eq!(outcome.session.worker_count, 1);
}
