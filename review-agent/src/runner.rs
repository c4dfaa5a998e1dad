//! Child-process supervision for the review agent.
//!
//! Invocation shape: `<cmd> run --print-logs [--log-level L] [--model M] <prompt>`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::errors::AgentError;

/// How long reader tasks get to flush buffered lines after a kill.
const READER_FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Everything the runner needs to launch one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent executable name, e.g. "opencode".
    pub command: String,
    /// Value for `--log-level`; empty to omit the flag.
    pub log_level: String,
    /// Value for `--model` (`provider/model`); empty to omit the flag.
    pub model: String,
    /// Working directory for the agent: our own project root, where the
    /// git-review skill lives. The target repo is reached via the prompt.
    pub project_dir: PathBuf,
    /// Directory the agent clones target repositories into. Created
    /// before each run, reused across runs.
    pub workspace_dir: PathBuf,
    /// Wall-clock budget for the whole invocation.
    pub timeout: Duration,
}

/// Outcome of one supervised agent run.
#[derive(Debug)]
pub enum ExecutionResult {
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The process exceeded the wall-clock budget and was killed.
    /// Partial output is never promoted to a result.
    TimedOut,
}

/// Runs the agent once with the given prompt.
///
/// Both output pipes are drained continuously by dedicated tasks; every
/// line is forwarded to the log, tagged by channel, and accumulated for
/// the caller. Draining must run while the child runs — a full pipe
/// buffer would block the agent and the `wait` below would never return.
pub async fn run_review(cfg: &AgentConfig, prompt: &str) -> Result<ExecutionResult, AgentError> {
    tokio::fs::create_dir_all(&cfg.workspace_dir)
        .await
        .map_err(AgentError::Workspace)?;
    info!(workspace = %cfg.workspace_dir.display(), "repo workspace ready");

    let mut cmd = Command::new(&cfg.command);
    cmd.arg("run").arg("--print-logs");
    if !cfg.log_level.is_empty() {
        cmd.args(["--log-level", &cfg.log_level]);
    }
    if !cfg.model.is_empty() {
        cmd.args(["--model", &cfg.model]);
    }
    cmd.arg(prompt)
        .current_dir(&cfg.project_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!(
        command = %cfg.command,
        timeout_secs = cfg.timeout.as_secs(),
        "starting review agent"
    );
    let mut child = cmd.spawn().map_err(AgentError::Spawn)?;
    let stdout = child
        .stdout
        .take()
        .ok_or(AgentError::MissingPipe("stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or(AgentError::MissingPipe("stderr"))?;

    let out_reader = spawn_line_reader(stdout, "out");
    let err_reader = spawn_line_reader(stderr, "err");

    match tokio::time::timeout(cfg.timeout, child.wait()).await {
        Err(_) => {
            warn!(
                timeout_secs = cfg.timeout.as_secs(),
                "review agent timed out, killing"
            );
            // kill() also reaps the child.
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed-out review agent");
            }
            let _ = tokio::time::timeout(READER_FLUSH_GRACE, out_reader).await;
            let _ = tokio::time::timeout(READER_FLUSH_GRACE, err_reader).await;
            Ok(ExecutionResult::TimedOut)
        }
        Ok(status) => {
            let status = status.map_err(AgentError::Wait)?;
            let stdout = join_reader(out_reader).await;
            let stderr = join_reader(err_reader).await;
            let exit_code = status.code().unwrap_or(-1);
            info!(exit_code, stdout_len = stdout.len(), "review agent finished");
            Ok(ExecutionResult::Completed {
                exit_code,
                stdout,
                stderr,
            })
        }
    }
}

/// Drains one pipe line by line until EOF, logging and accumulating.
fn spawn_line_reader<R>(pipe: R, channel: &'static str) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        let mut buf = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            info!(target: "review_agent", channel, "{line}");
            if !buf.is_empty() {
                buf.push('\n');
            }
            buf.push_str(line);
        }
        buf
    })
}

async fn join_reader(handle: JoinHandle<String>) -> String {
    match handle.await {
        Ok(buf) => buf,
        Err(e) => {
            warn!(error = %e, "agent output reader task failed");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Writes an executable shell script standing in for the agent CLI.
    fn fake_agent(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("fake-agent");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn config(dir: &std::path::Path, command: PathBuf, timeout: Duration) -> AgentConfig {
        AgentConfig {
            command: command.to_string_lossy().into_owned(),
            log_level: String::new(),
            model: String::new(),
            project_dir: dir.to_path_buf(),
            workspace_dir: dir.join("repos"),
            timeout,
        }
    }

    #[tokio::test]
    async fn captures_stdout_on_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(
            dir.path(),
            "echo review line one\necho review line two\nexit 0",
        );
        let cfg = config(dir.path(), agent, Duration::from_secs(10));

        let result = run_review(&cfg, "prompt").await.unwrap();
        match result {
            ExecutionResult::Completed {
                exit_code, stdout, ..
            } => {
                assert_eq!(exit_code, 0);
                assert_eq!(stdout, "review line one\nreview line two");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(cfg.workspace_dir.is_dir());
    }

    #[tokio::test]
    async fn captures_stderr_on_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(dir.path(), "echo boom >&2\nexit 3");
        let cfg = config(dir.path(), agent, Duration::from_secs(10));

        let result = run_review(&cfg, "prompt").await.unwrap();
        match result {
            ExecutionResult::Completed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn kills_agent_that_exceeds_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(dir.path(), "echo partial\nsleep 30\necho never");
        let cfg = config(dir.path(), agent, Duration::from_millis(300));

        let start = std::time::Instant::now();
        let result = run_review(&cfg, "prompt").await.unwrap();
        assert!(matches!(result, ExecutionResult::TimedOut));
        // Killed well before the 30s sleep would have finished.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(
            dir.path(),
            dir.path().join("does-not-exist"),
            Duration::from_secs(1),
        );
        let err = run_review(&cfg, "prompt").await.unwrap_err();
        assert!(matches!(err, AgentError::Spawn(_)));
    }

    #[tokio::test]
    async fn prompt_is_passed_as_final_argument() {
        let dir = tempfile::tempdir().unwrap();
        // Echo back the last argument the wrapper received.
        let agent = fake_agent(dir.path(), r#"for a in "$@"; do last="$a"; done; echo "$last""#);
        let cfg = AgentConfig {
            log_level: "WARN".to_string(),
            model: "agione/123".to_string(),
            ..config(dir.path(), agent, Duration::from_secs(10))
        };

        let result = run_review(&cfg, "the prompt text").await.unwrap();
        match result {
            ExecutionResult::Completed { stdout, .. } => {
                assert_eq!(stdout, "the prompt text");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
