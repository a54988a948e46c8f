//! Task model: the unit of work consumed by the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a tracker item: repository plus issue number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub struct IssueRef {
    /// Repository owner (organization or user).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Issue number within the repository.
    pub number: u64,
}

impl IssueRef {
    /// Construct an issue reference.
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }
}

impl std::fmt::Display for IssueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// The triggering source of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskOrigin {
    /// A chat mention addressed to the bot.
    Chat {
        /// Channel the mention was posted in.
        channel: String,
        /// User who mentioned the bot.
        user: String,
        /// Thread timestamp when the mention was a threaded reply.
        thread_ts: Option<String>,
    },
    /// An issue discovered by the tracker poller.
    Tracker {
        /// The issue the task works on.
        issue: IssueRef,
    },
}

impl TaskOrigin {
    /// The tracker issue behind this origin, if any.
    #[must_use]
    pub fn issue(&self) -> Option<&IssueRef> {
        match self {
            Self::Tracker { issue } => Some(issue),
            Self::Chat { .. } => None,
        }
    }
}

/// Lifecycle status for a task. Transitions are monotonic:
/// `Pending` → `Running` → `Completed` | `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Enqueued, not yet dequeued.
    Pending,
    /// Dequeued and executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
}

/// Terminal outcome of a task run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TaskResult {
    /// Whether the agent run succeeded.
    pub success: bool,
    /// Textual output assembled from the agent's stream.
    pub output: String,
    /// URL of an external change request opened for this task.
    pub artifact_url: Option<String>,
    /// Error text when the run failed.
    pub error: Option<String>,
}

impl TaskResult {
    /// A failed result carrying only an error message.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            artifact_url: None,
            error: Some(error.into()),
        }
    }
}

/// A unit of work. Mutated only by the dispatcher after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    /// Unique identifier, generated at creation.
    pub id: String,
    /// Triggering source.
    pub origin: TaskOrigin,
    /// Free-text instruction for the agent.
    pub prompt: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the dispatcher dequeued the task.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal outcome, set exactly once.
    pub result: Option<TaskResult>,
}

impl Task {
    /// Construct a new pending task with a generated identifier.
    #[must_use]
    pub fn new(origin: TaskOrigin, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            origin,
            prompt: prompt.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
        }
    }
}
