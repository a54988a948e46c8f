//! Single-flight task dispatcher.
//!
//! Consumes the task queue one task at a time: resolves the conversation
//! key (following thread links from chat threads to tracker items), looks
//! up the continuation handle, runs the agent with throttled output
//! streaming, persists the new handle, and for tracker tasks publishes the
//! resulting changes as a change request.
//!
//! Nothing may propagate an error past the per-task boundary; every
//! failure becomes a terminal failed task and the loop moves on.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::throttle::OutputThrottle;
use super::{ActiveTask, ActiveTaskHandle};
use crate::agent::{AgentRunner, ChunkCallback, RunRequest, StreamKind};
use crate::models::task::{Task, TaskOrigin, TaskResult};
use crate::notify::{Notifier, ThreadRef};
use crate::queue::TaskQueue;
use crate::session::{ConversationKey, SessionStore};
use crate::tracker::TrackerClient;
use crate::workspace::{Workspace, WorkspaceManager};
use crate::Result;

/// Maximum title length for a generated change request.
const CHANGE_REQUEST_TITLE_LIMIT: usize = 72;

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Minimum time between output flushes to the chat thread.
    pub flush_interval: Duration,
    /// Working directory for chat-originated tasks without a worktree.
    pub default_workspace: PathBuf,
}

/// The single-flight orchestration loop and its collaborators.
pub struct Dispatcher {
    queue: Arc<TaskQueue>,
    store: Arc<SessionStore>,
    runner: Arc<AgentRunner>,
    notifier: Arc<dyn Notifier>,
    workspaces: Arc<dyn WorkspaceManager>,
    tracker: Arc<dyn TrackerClient>,
    config: DispatcherConfig,
    active: ActiveTaskHandle,
}

impl Dispatcher {
    /// Assemble a dispatcher from its explicitly constructed collaborators.
    #[must_use]
    pub fn new(
        queue: Arc<TaskQueue>,
        store: Arc<SessionStore>,
        runner: Arc<AgentRunner>,
        notifier: Arc<dyn Notifier>,
        workspaces: Arc<dyn WorkspaceManager>,
        tracker: Arc<dyn TrackerClient>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            store,
            runner,
            notifier,
            workspaces,
            tracker,
            config,
            active: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Shared handle to the current-task pointer, for request attribution.
    #[must_use]
    pub fn active_task(&self) -> ActiveTaskHandle {
        Arc::clone(&self.active)
    }

    /// Run the consumption loop until the token fires.
    ///
    /// At most one task executes at a time; the loop re-checks the queue
    /// after every terminal notification and otherwise sleeps until the
    /// queue signals an added task.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut added = self.queue.subscribe().await;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.queue.get_next_task().await {
                Some(task) => self.process(task).await,
                None => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        event = added.recv() => {
                            if event.is_none() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        info!("dispatcher loop exited");
    }

    /// Process one task to a terminal status. Never propagates an error.
    async fn process(&self, task: Task) {
        let span = info_span!("process_task", task_id = %task.id);
        async {
            let announce_text = match &task.origin {
                TaskOrigin::Tracker { issue } => {
                    format!("\u{1f680} Started work on {issue}")
                }
                TaskOrigin::Chat { .. } => "\u{1f680} On it\u{2026}".to_owned(),
            };
            let thread = match self.notifier.announce(&task, &announce_text).await {
                Ok(thread) => thread,
                Err(err) => {
                    // Undelivered announcements never block the task.
                    warn!(%err, "failed to announce task");
                    None
                }
            };

            // Tie the announcement thread to the tracker item so replies
            // in that thread continue this task.
            if let (TaskOrigin::Tracker { issue }, Some(thread)) = (&task.origin, &thread) {
                let thread_key = ConversationKey::thread(&thread.channel, &thread.thread_ts);
                self.store.link_thread(&thread_key, issue.clone()).await;
            }

            let result = match self.execute(&task, thread.as_ref()).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(%err, "task failed");
                    TaskResult::failure(err.to_string())
                }
            };

            {
                let mut active = self.active.lock().await;
                *active = None;
            }

            self.queue.complete_task(&task.id, result.clone()).await;
            self.report_outcome(&result, thread.as_ref()).await;

            info!(success = result.success, "task finished");
        }
        .instrument(span)
        .await;
    }

    /// Run the agent for one task and assemble its result.
    async fn execute(&self, task: &Task, thread: Option<&ThreadRef>) -> Result<TaskResult> {
        let (key, workspace) = self.route(task).await?;
        let continuation = self.store.get(&key).await;

        {
            let mut active = self.active.lock().await;
            *active = Some(ActiveTask {
                task_id: task.id.clone(),
                conversation: key.clone(),
                thread: thread.cloned(),
            });
        }

        let prompt = match &workspace {
            Some(workspace) => format!(
                "Work in {} on branch {}.\n\n{}",
                workspace.path.display(),
                workspace.branch,
                task.prompt
            ),
            None => task.prompt.clone(),
        };
        let working_dir = workspace
            .as_ref()
            .map_or_else(|| self.config.default_workspace.clone(), |ws| ws.path.clone());

        let throttle = thread.map(|thread| {
            OutputThrottle::spawn(
                Arc::clone(&self.notifier),
                thread.clone(),
                self.config.flush_interval,
            )
        });
        let on_chunk: Option<ChunkCallback> = throttle.as_ref().map(|throttle| {
            let tx = throttle.sender();
            Arc::new(move |_kind: StreamKind, line: &str| {
                let _ = tx.send(format!("{line}\n"));
            }) as ChunkCallback
        });

        let outcome = self
            .runner
            .run(RunRequest {
                task_id: task.id.clone(),
                prompt,
                working_dir,
                continuation,
                on_chunk,
            })
            .await?;

        if let Some(throttle) = throttle {
            throttle.finish().await;
        }

        // A failed run may still be resumable; keep the handle either way.
        if let Some(ref handle) = outcome.continuation {
            self.store.set(&key, handle.clone()).await;
        }

        let mut artifact_url = outcome.artifact_url.clone();
        if outcome.success {
            if let Some(ref workspace) = workspace {
                if let Some(url) = self.publish_changes(task, workspace).await {
                    artifact_url = Some(url);
                }
            }
        }

        Ok(TaskResult {
            success: outcome.success,
            output: outcome.output,
            artifact_url,
            error: outcome.error,
        })
    }

    /// Resolve the conversation key and worktree for a task.
    ///
    /// Chat tasks in a thread linked to a tracker item borrow that item's
    /// key and worktree instead of getting a fresh chat-origin record.
    async fn route(&self, task: &Task) -> Result<(ConversationKey, Option<Workspace>)> {
        match &task.origin {
            TaskOrigin::Tracker { issue } => {
                let workspace = self.workspaces.acquire(issue).await?;
                Ok((ConversationKey::tracker(issue), Some(workspace)))
            }
            TaskOrigin::Chat {
                channel,
                user,
                thread_ts,
            } => {
                let linked = match thread_ts {
                    Some(ts) => {
                        self.store
                            .resolve_thread(&ConversationKey::thread(channel, ts))
                            .await
                    }
                    None => None,
                };
                match linked {
                    Some(issue) => {
                        let workspace = self.workspaces.acquire(&issue).await?;
                        Ok((ConversationKey::tracker(&issue), Some(workspace)))
                    }
                    None => Ok((ConversationKey::chat(channel, user), None)),
                }
            }
        }
    }

    /// Commit, push, and open a change request for a tracker task's
    /// worktree. Failures here degrade to log lines; the task outcome is
    /// already decided by the agent run.
    async fn publish_changes(&self, task: &Task, workspace: &Workspace) -> Option<String> {
        let issue = &workspace.issue;
        let message = format!("Apply changes for {issue}");
        match self.workspaces.commit_and_push(workspace, &message).await {
            Ok(true) => {}
            Ok(false) => {
                info!(issue = %issue, "no filesystem changes to publish");
                return None;
            }
            Err(err) => {
                warn!(issue = %issue, %err, "failed to commit and push changes");
                return None;
            }
        }

        let title: String = task
            .prompt
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(CHANGE_REQUEST_TITLE_LIMIT)
            .collect();
        let body = format!("Automated change for {issue}.\n\nCloses #{}", issue.number);
        match self
            .tracker
            .open_change_request(issue, &workspace.branch, &title, &body)
            .await
        {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(issue = %issue, %err, "failed to open change request");
                None
            }
        }
    }

    /// Post the terminal status to the task's thread, best effort.
    async fn report_outcome(&self, result: &TaskResult, thread: Option<&ThreadRef>) {
        let Some(thread) = thread else { return };

        let text = if result.success {
            match &result.artifact_url {
                Some(url) => format!("\u{2705} Task complete. \u{1f4ce} {url}"),
                None => "\u{2705} Task complete.".to_owned(),
            }
        } else {
            let error = result.error.as_deref().unwrap_or("unknown error");
            format!("\u{274c} Task failed: {error}")
        };

        if let Err(err) = self.notifier.post(thread, &text).await {
            warn!(%err, "failed to post task outcome");
        }
    }
}
