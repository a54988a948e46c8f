//! Agent subprocess runner.
//!
//! Spawns the external agent CLI with `kill_on_drop(true)`, streams its
//! stdout/stderr line-wise into capped buffers, forwards each line to an
//! optional chunk callback, and enforces the configured timeout. The
//! buffered stdout is parsed after exit (or after a timeout/stop), so a
//! continuation handle from a partial transcript is still recovered.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use super::stream::{find_artifact_url, parse_transcript};
use super::{ChunkCallback, RunOutcome, RunnerConfig, StreamKind};
use crate::{AppError, Result};

/// Parameters for one agent invocation.
pub struct RunRequest {
    /// Task the run belongs to; used for cancellation lookup.
    pub task_id: String,
    /// Instruction passed to the agent.
    pub prompt: String,
    /// Directory the agent process starts in.
    pub working_dir: PathBuf,
    /// Continuation handle to resume from, if the conversation has one.
    pub continuation: Option<String>,
    /// Receives each output line as it arrives, tagged with its stream.
    pub on_chunk: Option<ChunkCallback>,
}

enum RunEnd {
    Exited(std::process::ExitStatus),
    TimedOut,
    Stopped,
}

/// Runs the external agent as a subprocess, one task at a time per task id.
pub struct AgentRunner {
    config: RunnerConfig,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl AgentRunner {
    /// Create a runner with the given process configuration.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Execute the agent for one task and assemble its outcome.
    ///
    /// The process's stdin is closed at spawn; the agent must never wait
    /// for interactive input. A continuation handle found in the stream is
    /// surfaced even when the run fails, because a failed run may still be
    /// resumable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the process cannot be spawned.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let span = info_span!("agent_run", task_id = %request.task_id);
        let _guard = span.enter();

        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&self.config.base_args);
        if let Some(ref handle) = request.continuation {
            cmd.arg("--resume").arg(handle);
        }
        cmd.arg(&request.prompt)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Process(format!("failed to spawn agent: {err}")))?;

        info!(
            pid = child.id().unwrap_or(0),
            binary = %self.config.binary,
            resuming = request.continuation.is_some(),
            "agent process spawned"
        );

        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            active.insert(request.task_id.clone(), cancel.clone());
        }

        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();

        let end = {
            let streaming = stream_and_wait(
                &mut child,
                &mut stdout_buf,
                &mut stderr_buf,
                self.config.max_output_bytes,
                request.on_chunk.clone(),
            );
            tokio::select! {
                () = cancel.cancelled() => RunEnd::Stopped,
                outcome = tokio::time::timeout(self.config.timeout, streaming) => {
                    match outcome {
                        Ok(Ok(status)) => RunEnd::Exited(status),
                        Ok(Err(err)) => {
                            warn!(%err, "error driving agent process streams");
                            RunEnd::Stopped
                        }
                        Err(_elapsed) => RunEnd::TimedOut,
                    }
                }
            }
        };

        if matches!(end, RunEnd::TimedOut | RunEnd::Stopped) {
            if let Err(err) = child.start_kill() {
                warn!(%err, "failed to kill agent process");
            }
            // Reap the process so it does not linger as a zombie.
            let _ = child.wait().await;
        }

        {
            let mut active = self.active.lock().await;
            active.remove(&request.task_id);
        }

        let parsed = parse_transcript(&stdout_buf);
        let artifact_url = find_artifact_url(&parsed.text);

        let outcome = match end {
            RunEnd::Exited(status) if status.success() => RunOutcome {
                success: true,
                output: parsed.text,
                continuation: parsed.continuation,
                artifact_url,
                error: None,
            },
            RunEnd::Exited(status) => {
                let stderr = stderr_buf.trim();
                let error = if stderr.is_empty() {
                    status.code().map_or_else(
                        || "agent terminated by signal".to_owned(),
                        |code| format!("agent exited with code {code}"),
                    )
                } else {
                    stderr.to_owned()
                };
                RunOutcome {
                    success: false,
                    output: parsed.text,
                    continuation: parsed.continuation,
                    artifact_url,
                    error: Some(error),
                }
            }
            RunEnd::TimedOut => RunOutcome {
                success: false,
                output: parsed.text,
                continuation: parsed.continuation,
                artifact_url,
                error: Some(format!(
                    "agent timed out after {}s",
                    self.config.timeout.as_secs()
                )),
            },
            RunEnd::Stopped => RunOutcome {
                success: false,
                output: parsed.text,
                continuation: parsed.continuation,
                artifact_url,
                error: Some("agent run stopped".to_owned()),
            },
        };

        info!(
            success = outcome.success,
            continuation = outcome.continuation.is_some(),
            output_bytes = outcome.output.len(),
            "agent run finished"
        );

        Ok(outcome)
    }

    /// Cancel the run for a task. Idempotent; returns `false` when nothing
    /// was running for that id.
    pub async fn stop(&self, task_id: &str) -> bool {
        let active = self.active.lock().await;
        match active.get(task_id) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a run is currently active for the task.
    pub async fn is_running(&self, task_id: &str) -> bool {
        self.active.lock().await.contains_key(task_id)
    }
}

/// Append `line` to `buf`, dropping bytes silently once `cap` is reached.
fn append_capped(buf: &mut String, line: &str, cap: usize) {
    let remaining = cap.saturating_sub(buf.len());
    if remaining == 0 {
        return;
    }
    let mut take = remaining.min(line.len());
    // Keep the truncation on a character boundary.
    while take > 0 && !line.is_char_boundary(take) {
        take -= 1;
    }
    buf.push_str(&line[..take]);
    if buf.len() < cap {
        buf.push('\n');
    }
}

/// Read both output streams to EOF, then wait for the exit status.
///
/// Chunks are delivered to `on_chunk` in the order the subprocess produced
/// them within each stream.
async fn stream_and_wait(
    child: &mut Child,
    stdout_buf: &mut String,
    stderr_buf: &mut String,
    max_output_bytes: usize,
    on_chunk: Option<ChunkCallback>,
) -> std::io::Result<std::process::ExitStatus> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let notify = |kind: StreamKind, line: &str| {
        if let Some(ref callback) = on_chunk {
            callback.as_ref()(kind, line);
        }
    };

    if let (Some(stdout), Some(stderr)) = (stdout, stderr) {
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                line = stdout_lines.next_line() => match line? {
                    Some(line) => {
                        notify(StreamKind::Stdout, &line);
                        append_capped(stdout_buf, &line, max_output_bytes);
                    }
                    None => {
                        while let Some(line) = stderr_lines.next_line().await? {
                            notify(StreamKind::Stderr, &line);
                            append_capped(stderr_buf, &line, max_output_bytes);
                        }
                        break;
                    }
                },
                line = stderr_lines.next_line() => match line? {
                    Some(line) => {
                        notify(StreamKind::Stderr, &line);
                        append_capped(stderr_buf, &line, max_output_bytes);
                    }
                    None => {
                        while let Some(line) = stdout_lines.next_line().await? {
                            notify(StreamKind::Stdout, &line);
                            append_capped(stdout_buf, &line, max_output_bytes);
                        }
                        break;
                    }
                },
            }
        }
    }

    child.wait().await
}
