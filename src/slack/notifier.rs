//! Slack implementation of the dispatcher's [`Notifier`] seam.

use std::sync::Arc;

use async_trait::async_trait;
use slack_morphism::prelude::{SlackChannelId, SlackTs};

use super::client::{SlackMessage, SlackService};
use crate::models::task::{Task, TaskOrigin};
use crate::notify::{Notifier, ThreadRef};
use crate::Result;

/// Posts task lifecycle messages through the Slack service.
///
/// Chat-originated tasks are announced in their own thread; tracker tasks
/// get a fresh thread in the configured default channel.
pub struct SlackNotifier {
    service: Arc<SlackService>,
    default_channel: String,
}

impl SlackNotifier {
    /// Create a notifier posting tracker announcements to `default_channel`.
    #[must_use]
    pub fn new(service: Arc<SlackService>, default_channel: String) -> Self {
        Self {
            service,
            default_channel,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn announce(&self, task: &Task, text: &str) -> Result<Option<ThreadRef>> {
        let (channel, thread_ts) = match &task.origin {
            TaskOrigin::Chat {
                channel, thread_ts, ..
            } => (channel.clone(), thread_ts.clone()),
            TaskOrigin::Tracker { .. } => (self.default_channel.clone(), None),
        };

        let message = SlackMessage {
            channel: SlackChannelId(channel.clone()),
            text: Some(text.to_owned()),
            blocks: None,
            thread_ts: thread_ts.clone().map(SlackTs),
        };
        let posted_ts = self.service.post_now(message).await?;

        // Updates thread under the existing thread when there is one,
        // otherwise under the announcement itself.
        let thread_ts = thread_ts.unwrap_or_else(|| posted_ts.to_string());
        Ok(Some(ThreadRef { channel, thread_ts }))
    }

    async fn post(&self, thread: &ThreadRef, text: &str) -> Result<()> {
        let message = SlackMessage {
            channel: SlackChannelId(thread.channel.clone()),
            text: Some(text.to_owned()),
            blocks: None,
            thread_ts: Some(SlackTs(thread.thread_ts.clone())),
        };
        self.service.enqueue(message).await
    }
}
