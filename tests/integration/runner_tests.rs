//! Integration tests for the agent subprocess runner, driven by real
//! `sh` processes emitting transcript lines.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_dispatch::agent::{AgentRunner, RunRequest, RunnerConfig, StreamKind};
use agent_dispatch::AppError;

fn runner_for(script: &str, timeout: Duration, max_output_bytes: usize) -> AgentRunner {
    AgentRunner::new(RunnerConfig {
        binary: "sh".into(),
        base_args: vec!["-c".into(), script.into()],
        timeout,
        max_output_bytes,
    })
}

fn request(task_id: &str) -> RunRequest {
    RunRequest {
        task_id: task_id.into(),
        prompt: String::new(),
        working_dir: std::env::temp_dir(),
        continuation: None,
        on_chunk: None,
    }
}

#[tokio::test]
async fn successful_run_parses_stream_records() {
    let script = r#"printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}' '{"type":"result","result":"done","session_id":"S1"}'"#;
    let runner = runner_for(script, Duration::from_secs(5), 64 * 1024);

    let outcome = runner.run(request("t1")).await.expect("run");
    assert!(outcome.success);
    assert_eq!(outcome.output, "hello\ndone");
    assert_eq!(outcome.continuation.as_deref(), Some("S1"));
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn nonzero_exit_surfaces_stderr_as_error() {
    let script = "echo oops >&2; exit 3";
    let runner = runner_for(script, Duration::from_secs(5), 64 * 1024);

    let outcome = runner.run(request("t1")).await.expect("run");
    assert!(!outcome.success);
    assert!(outcome.error.expect("error").contains("oops"));
}

#[tokio::test]
async fn nonzero_exit_without_stderr_reports_code() {
    let runner = runner_for("exit 4", Duration::from_secs(5), 64 * 1024);

    let outcome = runner.run(request("t1")).await.expect("run");
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("agent exited with code 4")
    );
}

#[tokio::test]
async fn timeout_reports_error_and_keeps_partial_output() {
    // The continuation handle is emitted before the process stalls, so a
    // timed-out run still surfaces it.
    let script = r#"printf '%s\n' '{"type":"system","session_id":"S-PARTIAL"}'; sleep 5"#;
    let runner = runner_for(script, Duration::from_millis(300), 64 * 1024);

    let outcome = runner.run(request("t1")).await.expect("run");
    assert!(!outcome.success);
    assert!(outcome.error.expect("error").contains("timed out"));
    assert_eq!(outcome.continuation.as_deref(), Some("S-PARTIAL"));
}

#[tokio::test]
async fn stop_cancels_a_running_task() {
    let runner = Arc::new(runner_for("sleep 5", Duration::from_secs(30), 64 * 1024));

    let running = Arc::clone(&runner);
    let handle = tokio::spawn(async move { running.run(request("t1")).await });

    // Give the process a moment to spawn.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(runner.is_running("t1").await);
    assert!(runner.stop("t1").await);

    let outcome = handle.await.expect("join").expect("run");
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("agent run stopped"));

    // Idempotent once nothing is running.
    assert!(!runner.is_running("t1").await);
    assert!(!runner.stop("t1").await);
}

#[tokio::test]
async fn stop_for_unknown_task_returns_false() {
    let runner = runner_for("true", Duration::from_secs(5), 64 * 1024);
    assert!(!runner.stop("never-ran").await);
    assert!(!runner.is_running("never-ran").await);
}

#[tokio::test]
async fn buffered_output_is_capped_silently() {
    // ~40 KiB of plain text against a 1000-byte cap.
    let script = "i=0; while [ $i -lt 1000 ]; do echo line-$i-padding-padding-padding; i=$((i+1)); done";
    let runner = runner_for(script, Duration::from_secs(10), 1000);

    let outcome = runner.run(request("t1")).await.expect("run");
    assert!(outcome.success);
    assert!(outcome.output.len() <= 1000);
    assert!(outcome.output.starts_with("line-0"));
}

#[tokio::test]
async fn chunks_are_forwarded_in_order_with_stream_tag() {
    let script = "printf '%s\\n' one two three";
    let runner = runner_for(script, Duration::from_secs(5), 64 * 1024);

    let seen: Arc<Mutex<Vec<(StreamKind, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut req = request("t1");
    req.on_chunk = Some(Arc::new(move |kind, line: &str| {
        sink.lock().expect("lock").push((kind, line.to_owned()));
    }));

    let outcome = runner.run(req).await.expect("run");
    assert!(outcome.success);

    let seen = seen.lock().expect("lock");
    let stdout_lines: Vec<&str> = seen
        .iter()
        .filter(|(kind, _)| *kind == StreamKind::Stdout)
        .map(|(_, line)| line.as_str())
        .collect();
    assert_eq!(stdout_lines, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn resume_flag_is_passed_before_the_prompt() {
    // `sh -c <script> arg...` exposes the extra arguments as $0, $1, $2;
    // with a continuation the runner appends `--resume <handle> <prompt>`.
    let script = r#"echo "$0 $1 $2""#;
    let runner = runner_for(script, Duration::from_secs(5), 64 * 1024);

    let mut req = request("t1");
    req.prompt = "carry on".into();
    req.continuation = Some("S-OLD".into());

    let outcome = runner.run(req).await.expect("run");
    assert!(outcome.success);
    assert_eq!(outcome.output, "--resume S-OLD carry on");
}

#[tokio::test]
async fn spawn_failure_is_a_process_error() {
    let runner = AgentRunner::new(RunnerConfig {
        binary: "/nonexistent/agent-binary".into(),
        base_args: Vec::new(),
        timeout: Duration::from_secs(1),
        max_output_bytes: 1024,
    });

    let err = runner.run(request("t1")).await.expect_err("must fail");
    assert!(matches!(err, AppError::Process(_)));
    assert!(!runner.is_running("t1").await);
}
