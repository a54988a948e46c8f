#![forbid(unsafe_code)]

//! `agent-dispatch`: chat- and issue-driven orchestrator binary.
//!
//! Bootstraps configuration, constructs the queue, continuation store,
//! pending-request registries, and agent runner, then starts the Slack
//! integration, the tracker poller, the hook callback server, and the
//! single-flight dispatcher loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_dispatch::agent::{AgentRunner, RunnerConfig};
use agent_dispatch::config::GlobalConfig;
use agent_dispatch::notify::{NoopNotifier, Notifier};
use agent_dispatch::orchestrator::{Dispatcher, DispatcherConfig};
use agent_dispatch::pending::{ApprovalRegistry, QuestionRegistry};
use agent_dispatch::queue::TaskQueue;
use agent_dispatch::session::{spawn_sweep_task, SessionStore};
use agent_dispatch::slack::client::{SlackMessage, SlackService};
use agent_dispatch::slack::notifier::SlackNotifier;
use agent_dispatch::state::AppState;
use agent_dispatch::tracker::poller::PollerConfig;
use agent_dispatch::tracker::{spawn_poller, GitHubClient, TrackerClient};
use agent_dispatch::workspace::{GitWorkspaces, WorkspaceManager};
use agent_dispatch::{http, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-dispatch", about = "Chat- and issue-driven AI agent orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the default workspace root for chat tasks.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-dispatch bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

#[allow(clippy::too_many_lines)] // Startup wiring is inherently sequential.
async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;

    if let Some(ws) = args.workspace {
        let canonical = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
        config.default_workspace_root = canonical;
    }

    config.load_credentials().await?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Construct core components ───────────────────────
    let queue = Arc::new(TaskQueue::new());
    let store = Arc::new(SessionStore::new(Duration::from_secs(
        config.session.max_age_hours * 3600,
    )));
    let approvals = Arc::new(ApprovalRegistry::new());
    let questions = Arc::new(QuestionRegistry::new());
    let runner = Arc::new(AgentRunner::new(RunnerConfig {
        binary: config.agent.binary.clone(),
        base_args: config.agent.args.clone(),
        timeout: Duration::from_secs(config.agent.timeout_seconds),
        max_output_bytes: config.agent.max_output_bytes,
    }));
    let workspaces: Arc<dyn WorkspaceManager> = Arc::new(GitWorkspaces::new(
        config.repos_root.clone(),
        config.workspaces_root.clone(),
    ));
    let tracker_client: Arc<dyn TrackerClient> = Arc::new(GitHubClient::new(
        config.tracker.token.clone(),
        config.tracker.base_branch.clone(),
    ));

    let ct = CancellationToken::new();

    // ── Background sweep of expired continuations ───────
    let sweep_handle = spawn_sweep_task(
        Arc::clone(&store),
        Duration::from_secs(config.session.sweep_interval_seconds),
        ct.clone(),
    );

    // ── Slack service ───────────────────────────────────
    let (slack_service, slack_queue_handle) = if config.slack.enabled() {
        let (service, queue_task) = SlackService::start(&config.slack).map_err(|err| {
            error!(%err, "slack service start failed");
            err
        })?;
        (Some(Arc::new(service)), Some(queue_task))
    } else {
        info!("slack not configured; running without chat integration");
        (None, None)
    };

    let notifier: Arc<dyn Notifier> = match &slack_service {
        Some(service) => Arc::new(SlackNotifier::new(
            Arc::clone(service),
            config.slack.channel_id.clone(),
        )),
        None => Arc::new(NoopNotifier),
    };

    // ── Dispatcher ──────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&store),
        Arc::clone(&runner),
        notifier,
        Arc::clone(&workspaces),
        Arc::clone(&tracker_client),
        DispatcherConfig {
            flush_interval: Duration::from_secs(config.flush_interval_seconds),
            default_workspace: config.default_workspace_root.clone(),
        },
    ));

    // ── Hook auth token ─────────────────────────────────
    let hook_token = uuid::Uuid::new_v4().to_string();
    write_hook_token(&config.hook_token_path, &hook_token)?;

    // ── Shared state for front ends ─────────────────────
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        queue: Arc::clone(&queue),
        store: Arc::clone(&store),
        approvals: Arc::clone(&approvals),
        questions: Arc::clone(&questions),
        slack: slack_service.clone(),
        active_task: dispatcher.active_task(),
        hook_token,
    });

    // ── Front ends and poller ───────────────────────────
    let socket_handle = slack_service
        .as_ref()
        .map(|service| service.spawn_socket_mode(Arc::clone(&state)));

    let (http_handle, _http_addr) =
        http::spawn_server(Arc::clone(&state), config.http_port, ct.clone()).await?;

    let poller_handle = if config.tracker.enabled() {
        Some(spawn_poller(
            Arc::clone(&tracker_client),
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::clone(&workspaces),
            PollerConfig {
                repos: config.tracker.parsed_repos()?,
                label: config.tracker.label.clone(),
                interval: Duration::from_secs(config.tracker.poll_interval_seconds),
            },
            ct.clone(),
        ))
    } else {
        info!("tracker polling disabled (empty repo allow-list)");
        None
    };

    let dispatcher_ct = ct.clone();
    let dispatcher_task = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run(dispatcher_ct).await })
    };

    info!("agent-dispatch ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    graceful_shutdown(&state, &runner).await;

    let _ = tokio::join!(dispatcher_task, sweep_handle, http_handle);
    if let Some(handle) = poller_handle {
        let _ = handle.await;
    }
    if let Some(handle) = socket_handle {
        handle.abort();
    }
    if let Some(handle) = slack_queue_handle {
        handle.abort();
    }
    info!("agent-dispatch shut down");

    Ok(())
}

/// Stop the in-flight agent run and post a shutdown summary.
///
/// State is in-memory only: queued tasks and pending requests are lost on
/// restart, so the summary records what was dropped.
async fn graceful_shutdown(state: &AppState, runner: &AgentRunner) {
    let active = { state.active_task.lock().await.clone() };
    if let Some(active) = active {
        info!(task_id = %active.task_id, "stopping in-flight agent run");
        if !runner.stop(&active.task_id).await {
            info!(task_id = %active.task_id, "no agent process was running");
        }
    }

    let queued = state.queue.pending_count().await;
    let approvals = state.approvals.pending_count().await;
    let questions = state.questions.pending_count().await;

    if let Some(ref slack) = state.slack {
        let channel =
            slack_morphism::prelude::SlackChannelId(state.config.slack.channel_id.clone());
        let msg = SlackMessage::plain(
            channel,
            format!(
                "\u{26a0}\u{fe0f} Server shutting down. {queued} queued task(s), \
                 {approvals} pending approval(s), {questions} pending question(s) dropped."
            ),
        );
        if let Err(err) = slack.enqueue(msg).await {
            error!(%err, "failed to post shutdown notification to slack");
        }
        // Brief sleep to let the queue drain.
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    info!(
        queued,
        approvals, questions, "graceful shutdown complete"
    );
}

/// Write the per-process hook auth token where the hook script reads it.
fn write_hook_token(path: &std::path::Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|err| AppError::Config(format!("cannot create token dir: {err}")))?;
        }
    }
    std::fs::write(path, token)
        .map_err(|err| AppError::Config(format!("cannot write hook token: {err}")))?;
    info!(path = %path.display(), "hook auth token written");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
