//! Shared test helpers: in-memory collaborator doubles and assembly of a
//! dispatcher wired to them, so individual test modules focus on
//! behaviour rather than boilerplate.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use agent_dispatch::agent::{AgentRunner, RunnerConfig};
use agent_dispatch::models::task::{IssueRef, Task, TaskStatus};
use agent_dispatch::notify::{Notifier, ThreadRef};
use agent_dispatch::orchestrator::{Dispatcher, DispatcherConfig};
use agent_dispatch::queue::TaskQueue;
use agent_dispatch::session::SessionStore;
use agent_dispatch::tracker::{IssueSummary, TrackerClient};
use agent_dispatch::workspace::{branch_name, Workspace, WorkspaceManager};
use agent_dispatch::{AppError, Result};

/// Notifier double that records every announcement and post.
pub struct RecordingNotifier {
    /// `announce:<task_id>` and `post:<text>` entries in arrival order.
    pub events: Mutex<Vec<String>>,
    thread: ThreadRef,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            thread: ThreadRef {
                channel: "C_TEST".into(),
                thread_ts: "1000.0001".into(),
            },
        }
    }

    pub async fn posts(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| event.strip_prefix("post:").map(str::to_owned))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn announce(&self, task: &Task, _text: &str) -> Result<Option<ThreadRef>> {
        self.events.lock().await.push(format!("announce:{}", task.id));
        Ok(Some(self.thread.clone()))
    }

    async fn post(&self, _thread: &ThreadRef, text: &str) -> Result<()> {
        self.events.lock().await.push(format!("post:{text}"));
        Ok(())
    }
}

/// Workspace manager double working under a temp directory.
pub struct FakeWorkspaces {
    root: PathBuf,
    /// Issues acquire() was called for, in order.
    pub acquired: Mutex<Vec<IssueRef>>,
    /// Issues remove() was called for, in order.
    pub removed: Mutex<Vec<IssueRef>>,
    /// Value commit_and_push reports (whether changes existed).
    pub push_has_changes: bool,
    /// When set, acquire() fails, simulating a broken clone.
    pub fail_acquire: bool,
}

impl FakeWorkspaces {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            acquired: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            push_has_changes: false,
            fail_acquire: false,
        }
    }
}

#[async_trait]
impl WorkspaceManager for FakeWorkspaces {
    async fn acquire(&self, issue: &IssueRef) -> Result<Workspace> {
        if self.fail_acquire {
            return Err(AppError::Git("no local clone".into()));
        }
        self.acquired.lock().await.push(issue.clone());
        let path = self
            .root
            .join(format!("{}-{}-{}", issue.owner, issue.repo, issue.number));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Workspace {
            issue: issue.clone(),
            branch: branch_name(issue),
            path,
        })
    }

    async fn commit_and_push(&self, _workspace: &Workspace, _message: &str) -> Result<bool> {
        Ok(self.push_has_changes)
    }

    async fn remove(&self, issue: &IssueRef) -> Result<()> {
        self.removed.lock().await.push(issue.clone());
        Ok(())
    }
}

/// Tracker double returning configurable issues and a fixed
/// change-request URL.
pub struct FakeTracker {
    /// Issues currently "open" on the tracker.
    pub issues: Mutex<Vec<IssueSummary>>,
    pub change_request_url: String,
    /// `(issue, branch)` pairs open_change_request was called with.
    pub opened: Mutex<Vec<(IssueRef, String)>>,
    /// When set, list_open_issues fails, simulating a tracker outage.
    pub fail_listing: AtomicBool,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self {
            issues: Mutex::new(Vec::new()),
            change_request_url: "https://github.com/acme/widget/pull/7".into(),
            opened: Mutex::new(Vec::new()),
            fail_listing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TrackerClient for FakeTracker {
    async fn list_open_issues(
        &self,
        owner: &str,
        repo: &str,
        _label: &str,
    ) -> Result<Vec<IssueSummary>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(AppError::Tracker("listing unavailable".into()));
        }
        Ok(self
            .issues
            .lock()
            .await
            .iter()
            .filter(|summary| summary.issue.owner == owner && summary.issue.repo == repo)
            .cloned()
            .collect())
    }

    async fn open_change_request(
        &self,
        issue: &IssueRef,
        branch: &str,
        _title: &str,
        _body: &str,
    ) -> Result<String> {
        self.opened
            .lock()
            .await
            .push((issue.clone(), branch.to_owned()));
        Ok(self.change_request_url.clone())
    }
}

/// Runner that executes `sh -c <script>`.
///
/// The runner appends `[--resume <handle>] <prompt>` after the script, so
/// inside the script they are visible as `$0`, `$1`, `$2`.
pub fn script_runner(script: &str, timeout: Duration) -> Arc<AgentRunner> {
    Arc::new(AgentRunner::new(RunnerConfig {
        binary: "sh".into(),
        base_args: vec!["-c".into(), script.into()],
        timeout,
        max_output_bytes: 64 * 1024,
    }))
}

/// Everything a dispatcher test needs to drive and inspect a run.
pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub queue: Arc<TaskQueue>,
    pub store: Arc<SessionStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub workspaces: Arc<FakeWorkspaces>,
    pub tracker: Arc<FakeTracker>,
    /// Held so the default workspace directory outlives the dispatcher.
    #[allow(dead_code)]
    pub workdir: tempfile::TempDir,
}

/// Assemble a dispatcher around the given runner and doubles.
pub fn build_harness(
    runner: Arc<AgentRunner>,
    workspaces: FakeWorkspaces,
    tracker: FakeTracker,
) -> Harness {
    let workdir = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(TaskQueue::new());
    let store = Arc::new(SessionStore::new(Duration::from_secs(3600)));
    let notifier = Arc::new(RecordingNotifier::new());
    let workspaces = Arc::new(workspaces);
    let tracker = Arc::new(tracker);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&store),
        runner,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::clone(&workspaces) as Arc<dyn WorkspaceManager>,
        Arc::clone(&tracker) as Arc<dyn TrackerClient>,
        DispatcherConfig {
            flush_interval: Duration::from_millis(50),
            default_workspace: workdir.path().to_path_buf(),
        },
    ));

    Harness {
        dispatcher,
        queue,
        store,
        notifier,
        workspaces,
        tracker,
        workdir,
    }
}

/// Poll the queue until the task reaches a terminal status.
pub async fn wait_for_terminal(queue: &TaskQueue, task_id: &str) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(task) = queue.get(task_id).await {
            if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
                return task;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} did not reach a terminal status in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
