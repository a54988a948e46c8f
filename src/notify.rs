//! Outbound notification seam between the dispatcher and the chat platform.

use async_trait::async_trait;

use crate::models::task::Task;
use crate::Result;

/// A chat thread that task updates post into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRef {
    /// Channel the thread lives in.
    pub channel: String,
    /// Timestamp of the thread's root message.
    pub thread_ts: String,
}

/// Delivery of task lifecycle messages to the originating conversation.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce a started task, returning the thread that subsequent
    /// updates for this task post into. `None` when no channel is
    /// available (for example, chat integration disabled).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` when the announcement cannot be posted.
    async fn announce(&self, task: &Task, text: &str) -> Result<Option<ThreadRef>>;

    /// Post a follow-up message into a task's thread.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` when delivery fails.
    async fn post(&self, thread: &ThreadRef, text: &str) -> Result<()>;
}

/// Notifier used when chat integration is disabled; drops everything.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn announce(&self, _task: &Task, _text: &str) -> Result<Option<ThreadRef>> {
        Ok(None)
    }

    async fn post(&self, _thread: &ThreadRef, _text: &str) -> Result<()> {
        Ok(())
    }
}
