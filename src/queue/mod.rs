//! In-memory FIFO task queue with origin dedup and added-event fanout.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::models::task::{IssueRef, Task, TaskOrigin, TaskResult, TaskStatus};

struct QueueInner {
    backlog: VecDeque<String>,
    tasks: HashMap<String, Task>,
    listeners: Vec<mpsc::UnboundedSender<String>>,
}

/// Ordered backlog of tasks plus the full record of every task ever added.
///
/// Terminal tasks are retained so [`is_origin_processed`](Self::is_origin_processed)
/// can dedup tracker polls across the process lifetime.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                backlog: VecDeque::new(),
                tasks: HashMap::new(),
                listeners: Vec::new(),
            }),
        }
    }

    /// Register a listener that receives the id of every task added from
    /// now on.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        inner.listeners.push(tx);
        rx
    }

    /// Construct a pending task, append it to the backlog, and notify
    /// listeners synchronously.
    pub async fn add_task(&self, origin: TaskOrigin, prompt: impl Into<String>) -> Task {
        let task = Task::new(origin, prompt);
        let mut inner = self.inner.lock().await;
        inner.backlog.push_back(task.id.clone());
        inner.tasks.insert(task.id.clone(), task.clone());
        let id = task.id.clone();
        inner.listeners.retain(|tx| tx.send(id.clone()).is_ok());
        info!(task_id = %task.id, "task enqueued");
        task
    }

    /// Remove and return the oldest pending task, marking it running.
    pub async fn get_next_task(&self) -> Option<Task> {
        let mut inner = self.inner.lock().await;
        let id = inner.backlog.pop_front()?;
        let task = inner.tasks.get_mut(&id)?;
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        Some(task.clone())
    }

    /// Record a task's terminal outcome.
    ///
    /// An unknown id is logged and ignored; queue state is never corrupted.
    pub async fn complete_task(&self, task_id: &str, result: TaskResult) {
        let mut inner = self.inner.lock().await;
        let Some(task) = inner.tasks.get_mut(task_id) else {
            warn!(task_id, "complete_task for unknown task id");
            return;
        };
        task.status = if result.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        task.completed_at = Some(Utc::now());
        task.result = Some(result);
    }

    /// Whether any task, in any status, already carries the given issue.
    pub async fn is_origin_processed(&self, issue: &IssueRef) -> bool {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .values()
            .any(|task| task.origin.issue() == Some(issue))
    }

    /// Snapshot of a task by id.
    pub async fn get(&self, task_id: &str) -> Option<Task> {
        let inner = self.inner.lock().await;
        inner.tasks.get(task_id).cloned()
    }

    /// Number of tasks still waiting in the backlog.
    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.backlog.len()
    }
}
