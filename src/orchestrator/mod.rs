//! Task orchestration: the single-flight dispatcher and output throttling.

pub mod dispatcher;
pub mod throttle;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use throttle::OutputThrottle;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::notify::ThreadRef;
use crate::session::ConversationKey;

/// The task currently being executed, kept so approval and question
/// requests arriving without an explicit task id can be attributed to it.
#[derive(Debug, Clone)]
pub struct ActiveTask {
    /// Id of the in-flight task.
    pub task_id: String,
    /// Conversation the task belongs to.
    pub conversation: ConversationKey,
    /// Thread its status updates post into, when one exists.
    pub thread: Option<ThreadRef>,
}

/// Shared handle to the dispatcher's current-task pointer.
///
/// Owned by the dispatcher; set when a task starts and cleared when it
/// reaches a terminal status.
pub type ActiveTaskHandle = Arc<Mutex<Option<ActiveTask>>>;
