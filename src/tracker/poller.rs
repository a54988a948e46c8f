//! Tracker polling loop.
//!
//! Periodically lists open labeled issues across the allow-listed
//! repositories and enqueues a task for each issue not yet processed.
//! The poller runs concurrently with the dispatcher and tolerates
//! rediscovering the same item; dedup happens via
//! [`TaskQueue::is_origin_processed`].
//!
//! Issues that disappear from the open set are treated as closed: their
//! thread link is removed and their worktree deleted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::TrackerClient;
use crate::models::task::{IssueRef, TaskOrigin};
use crate::queue::TaskQueue;
use crate::session::SessionStore;
use crate::workspace::WorkspaceManager;

/// Settings for the polling loop.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Allow-listed repositories as `(owner, repo)` pairs.
    pub repos: Vec<(String, String)>,
    /// Label an issue must carry to be picked up.
    pub label: String,
    /// Time between polls.
    pub interval: Duration,
}

/// Spawn the background polling task.
#[must_use]
pub fn spawn_poller(
    client: Arc<dyn TrackerClient>,
    queue: Arc<TaskQueue>,
    store: Arc<SessionStore>,
    workspaces: Arc<dyn WorkspaceManager>,
    config: PollerConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut known_open: HashSet<IssueRef> = HashSet::new();
        let mut interval = tokio::time::interval(config.interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("tracker poller shutting down");
                    break;
                }
                _ = interval.tick() => {}
            }

            poll_once(
                client.as_ref(),
                &queue,
                &store,
                workspaces.as_ref(),
                &config,
                &mut known_open,
            )
            .await;
        }
    })
}

async fn poll_once(
    client: &dyn TrackerClient,
    queue: &TaskQueue,
    store: &SessionStore,
    workspaces: &dyn WorkspaceManager,
    config: &PollerConfig,
    known_open: &mut HashSet<IssueRef>,
) {
    let mut seen_open: HashSet<IssueRef> = HashSet::new();

    for (owner, repo) in &config.repos {
        let issues = match client.list_open_issues(owner, repo, &config.label).await {
            Ok(issues) => issues,
            Err(err) => {
                // Network failures do not stop the poller; carry the repo's
                // known-open issues forward so they are not mistaken for
                // closed ones, and try again next tick.
                warn!(owner, repo, %err, "tracker poll failed");
                seen_open.extend(
                    known_open
                        .iter()
                        .filter(|issue| issue.owner == *owner && issue.repo == *repo)
                        .cloned(),
                );
                continue;
            }
        };

        for summary in issues {
            seen_open.insert(summary.issue.clone());

            if queue.is_origin_processed(&summary.issue).await {
                continue;
            }

            let prompt = if summary.body.trim().is_empty() {
                summary.title.clone()
            } else {
                format!("{}\n\n{}", summary.title, summary.body)
            };
            let task = queue
                .add_task(
                    TaskOrigin::Tracker {
                        issue: summary.issue.clone(),
                    },
                    prompt,
                )
                .await;
            info!(issue = %summary.issue, task_id = %task.id, "tracker issue enqueued");
        }
    }

    // Anything previously open and now gone is treated as closed.
    for issue in known_open.difference(&seen_open) {
        info!(issue = %issue, "tracker issue closed, releasing resources");
        store.unlink_by_issue(issue).await;
        if let Err(err) = workspaces.remove(issue).await {
            warn!(issue = %issue, %err, "failed to remove worktree for closed issue");
        }
    }

    *known_open = seen_open;
}
