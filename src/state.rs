//! Shared application state handed to the Slack and HTTP front ends.

use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::orchestrator::ActiveTaskHandle;
use crate::pending::{ApprovalRegistry, QuestionRegistry};
use crate::queue::TaskQueue;
use crate::session::SessionStore;
use crate::slack::client::SlackService;

/// State shared by every inbound request path.
///
/// All members are explicitly constructed at startup and owned here; there
/// are no process-wide singletons.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Task backlog and record.
    pub queue: Arc<TaskQueue>,
    /// Continuation store and thread-link index.
    pub store: Arc<SessionStore>,
    /// Pending approval requests.
    pub approvals: Arc<ApprovalRegistry>,
    /// Pending question requests.
    pub questions: Arc<QuestionRegistry>,
    /// Slack client service (absent when chat integration is disabled).
    pub slack: Option<Arc<SlackService>>,
    /// Dispatcher's current-task pointer, for attributing hook requests.
    pub active_task: ActiveTaskHandle,
    /// Bearer token hook callbacks must present.
    pub hook_token: String,
}
