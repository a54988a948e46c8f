//! Pending-request registry: a single-fire rendezvous between an in-flight
//! agent run and an out-of-band human decision.
//!
//! A hook callback registers a request and awaits the returned receiver; a
//! completely separate path (a Slack button press) resolves it. Each entry
//! is backed by a `tokio::sync::oneshot` channel, so a decision is delivered
//! at most once and resolving an unknown or already-resolved id is a
//! harmless `false`.
//!
//! The registry imposes no timeout of its own. The awaiting caller bounds
//! the wait and calls [`PendingRegistry::abandon`] on expiry so entries do
//! not accumulate.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::models::request::{Answer, ApprovalDecision};

/// Registry instance for approval decisions.
pub type ApprovalRegistry = PendingRegistry<ApprovalDecision>;

/// Registry instance for question answers.
pub type QuestionRegistry = PendingRegistry<Answer>;

/// Locator of the human-facing chat message announcing a request, kept so
/// the message can be updated after resolution or timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// Channel the message was posted to.
    pub channel: String,
    /// Platform timestamp identifying the message.
    pub ts: String,
}

struct PendingEntry<T> {
    task_id: Option<String>,
    message: Option<MessageRef>,
    tx: oneshot::Sender<T>,
}

/// Map of outstanding requests keyed by opaque request id.
pub struct PendingRegistry<T> {
    entries: Mutex<HashMap<String, PendingEntry<T>>>,
}

impl<T> Default for PendingRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingRegistry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a request and return the receiver that its resolution will
    /// complete.
    ///
    /// The entry is visible to [`resolve`](Self::resolve) before this call
    /// returns, so registering strictly before announcing the request id to
    /// the human-facing channel guarantees a concurrent resolve cannot be
    /// lost.
    pub async fn register(&self, request_id: &str, task_id: Option<String>) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock().await;
        if entries
            .insert(
                request_id.to_owned(),
                PendingEntry {
                    task_id,
                    message: None,
                    tx,
                },
            )
            .is_some()
        {
            warn!(request_id, "replaced an existing pending entry with the same id");
        }
        rx
    }

    /// Record where the request was announced, for later message updates.
    ///
    /// Returns `false` when the entry is already gone (resolved or
    /// abandoned before the announcement landed).
    pub async fn note_message(&self, request_id: &str, message: MessageRef) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(request_id) {
            Some(entry) => {
                entry.message = Some(message);
                true
            }
            None => false,
        }
    }

    /// Deliver a decision to the registered awaiter.
    ///
    /// Removes the entry and fires its channel exactly once. Returns `false`
    /// with no other effect when the id is unknown, already resolved, or
    /// abandoned; safe to call from any unrelated request path.
    pub async fn resolve(&self, request_id: &str, decision: T) -> bool {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.remove(request_id)
        };
        match entry {
            Some(entry) => {
                if entry.tx.send(decision).is_err() {
                    // Receiver dropped between timeout and abandon.
                    debug!(request_id, "pending receiver dropped before resolution");
                }
                true
            }
            None => {
                debug!(request_id, "resolve for unknown or already-resolved request");
                false
            }
        }
    }

    /// Drop an unresolved entry, returning its message locator if one was
    /// recorded. Called by the awaiting side when its bounded wait expires.
    pub async fn abandon(&self, request_id: &str) -> Option<MessageRef> {
        let mut entries = self.entries.lock().await;
        entries.remove(request_id).and_then(|entry| entry.message)
    }

    /// Task the request is attributed to, if the entry is still pending.
    pub async fn task_id(&self, request_id: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries.get(request_id).and_then(|entry| entry.task_id.clone())
    }

    /// Number of outstanding requests. Used by the shutdown summary.
    pub async fn pending_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}
