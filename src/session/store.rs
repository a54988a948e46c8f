//! In-memory continuation store with TTL eviction.
//!
//! Maps a [`ConversationKey`] to the opaque continuation handle the agent
//! returned for that conversation. Records expire `max_age` after their last
//! use; expired records are purged opportunistically on read and by the
//! periodic [`sweep`](SessionStore::sweep) task. The store also owns the
//! thread-link index that routes follow-up chat messages in a
//! tracker-originated thread back to the tracker item.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ConversationKey;
use crate::models::task::IssueRef;

/// A stored continuation handle with its freshness bookkeeping.
#[derive(Debug, Clone)]
pub struct ContinuationRecord {
    /// Opaque handle produced by the agent.
    pub handle: String,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every successful read.
    pub last_used: DateTime<Utc>,
}

struct StoreInner {
    records: HashMap<String, ContinuationRecord>,
    links: HashMap<String, IssueRef>,
}

/// Continuation store keyed by conversation identity.
///
/// All read-modify-write steps (expiry check plus refresh, purge) happen
/// under a single lock acquisition so concurrent callers observe a
/// consistent record.
pub struct SessionStore {
    inner: Mutex<StoreInner>,
    max_age: chrono::Duration,
}

impl SessionStore {
    /// Create a store whose records expire `max_age` after last use.
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                records: HashMap::new(),
                links: HashMap::new(),
            }),
            max_age: chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
        }
    }

    /// Look up the continuation handle for a conversation.
    ///
    /// A live record has its `last_used` refreshed; an expired record is
    /// purged and `None` is returned.
    pub async fn get(&self, key: &ConversationKey) -> Option<String> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let expired = match inner.records.get_mut(key.as_str()) {
            Some(record) if now - record.last_used <= self.max_age => {
                record.last_used = now;
                return Some(record.handle.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.records.remove(key.as_str());
            debug!(key = %key, "purged expired continuation record on read");
        }
        None
    }

    /// Store a continuation handle, replacing any existing record wholesale.
    pub async fn set(&self, key: &ConversationKey, handle: impl Into<String>) {
        let now = Utc::now();
        let record = ContinuationRecord {
            handle: handle.into(),
            created_at: now,
            last_used: now,
        };
        let mut inner = self.inner.lock().await;
        inner.records.insert(key.as_str().to_owned(), record);
    }

    /// Remove the record for a conversation, reporting whether one existed.
    pub async fn delete(&self, key: &ConversationKey) -> bool {
        let mut inner = self.inner.lock().await;
        inner.records.remove(key.as_str()).is_some()
    }

    /// Purge every expired record, returning the number removed.
    ///
    /// Safe to call concurrently with `get`/`set`; purging an already-gone
    /// record is a no-op.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let before = inner.records.len();
        let max_age = self.max_age;
        inner
            .records
            .retain(|_, record| now - record.last_used <= max_age);
        before - inner.records.len()
    }

    /// Link a chat thread to a tracker item so replies in that thread are
    /// treated as continuations of the tracker task.
    pub async fn link_thread(&self, thread: &ConversationKey, issue: IssueRef) {
        let mut inner = self.inner.lock().await;
        inner.links.insert(thread.as_str().to_owned(), issue);
    }

    /// Resolve a chat thread to its linked tracker item, if any.
    pub async fn resolve_thread(&self, thread: &ConversationKey) -> Option<IssueRef> {
        let inner = self.inner.lock().await;
        inner.links.get(thread.as_str()).cloned()
    }

    /// Remove at most the first thread link pointing at the given issue.
    ///
    /// One thread per tracker item is the expected cardinality; additional
    /// links to the same issue are not reconciled.
    pub async fn unlink_by_issue(&self, issue: &IssueRef) -> bool {
        let mut inner = self.inner.lock().await;
        let found = inner
            .links
            .iter()
            .find(|(_, linked)| *linked == issue)
            .map(|(key, _)| key.clone());
        match found {
            Some(key) => {
                inner.links.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// Spawn the periodic sweep background task.
///
/// Runs [`SessionStore::sweep`] every `period` until the token fires.
#[must_use]
pub fn spawn_sweep_task(
    store: Arc<SessionStore>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately; skip it so the initial
        // sweep happens one full period after startup.
        interval.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("continuation sweep task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let purged = store.sweep().await;
                    if purged > 0 {
                        info!(purged, "continuation sweep purged expired records");
                    }
                }
            }
        }
    })
}
