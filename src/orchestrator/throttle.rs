//! Buffered, throttled delivery of agent output to a chat thread.
//!
//! Chunks accumulate in order and are flushed to the thread at most once
//! per interval, with a final flush of any remainder when the stream ends.
//! Several chunks arriving within one interval coalesce into one message.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::notify::{Notifier, ThreadRef};

/// Handle to a running throttle task.
pub struct OutputThrottle {
    tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl OutputThrottle {
    /// Spawn the flush task for one agent run.
    #[must_use]
    pub fn spawn(notifier: Arc<dyn Notifier>, thread: ThreadRef, interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let task = tokio::spawn(async move {
            let mut buffer = String::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the
            // first flush happens one full interval after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    chunk = rx.recv() => match chunk {
                        Some(chunk) => buffer.push_str(&chunk),
                        None => break,
                    },
                    _ = ticker.tick() => {
                        flush(notifier.as_ref(), &thread, &mut buffer).await;
                    }
                }
            }

            // Final flush of any remainder.
            flush(notifier.as_ref(), &thread, &mut buffer).await;
        });

        Self { tx, task }
    }

    /// Sender for feeding chunks from a stream callback.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.tx.clone()
    }

    /// Append a chunk to the pending buffer.
    pub fn push(&self, chunk: &str) {
        let _ = self.tx.send(chunk.to_owned());
    }

    /// Close the stream and wait for the final flush.
    pub async fn finish(self) {
        let Self { tx, task } = self;
        drop(tx);
        if let Err(err) = task.await {
            warn!(%err, "output throttle task failed");
        }
    }
}

async fn flush(notifier: &dyn Notifier, thread: &ThreadRef, buffer: &mut String) {
    if buffer.is_empty() {
        return;
    }
    let chunk = std::mem::take(buffer);
    // Delivery failures degrade to a log line; output is already buffered
    // in the task result.
    if let Err(err) = notifier.post(thread, &chunk).await {
        warn!(%err, "failed to flush agent output to thread");
    }
}
