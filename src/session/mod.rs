//! Conversation identity and the continuation store.
//!
//! A [`ConversationKey`] deterministically names the conversation a task
//! belongs to; the [`store::SessionStore`] maps keys to resumable
//! continuation handles with TTL eviction and a thread-link secondary index.

pub mod store;

pub use store::{spawn_sweep_task, ContinuationRecord, SessionStore};

use crate::models::task::IssueRef;

/// Deterministic identity string for a conversation.
///
/// Each origin type uses its own prefix so keys from different origins can
/// never collide: Slack channel and user IDs contain no `:`, and repository
/// owner/name contain no `#`.
///
/// - chat mention: `chat:<channel>:<user>`
/// - chat thread (link index): `thread:<channel>:<thread_ts>`
/// - tracker item: `tracker:<owner>/<repo>#<number>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Key for a chat conversation: channel plus participant.
    #[must_use]
    pub fn chat(channel: &str, user: &str) -> Self {
        Self(format!("chat:{channel}:{user}"))
    }

    /// Key for a specific chat thread, used by the thread-link index.
    #[must_use]
    pub fn thread(channel: &str, thread_ts: &str) -> Self {
        Self(format!("thread:{channel}:{thread_ts}"))
    }

    /// Key for a tracker item.
    #[must_use]
    pub fn tracker(issue: &IssueRef) -> Self {
        Self(format!("tracker:{issue}"))
    }

    /// The underlying key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
