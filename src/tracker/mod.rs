//! Issue tracker integration: REST client and polling loop.

pub mod github;
pub mod poller;

pub use github::GitHubClient;
pub use poller::spawn_poller;

use async_trait::async_trait;

use crate::models::task::IssueRef;
use crate::Result;

/// A tracker issue as discovered by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSummary {
    /// Identity of the issue.
    pub issue: IssueRef,
    /// Issue title.
    pub title: String,
    /// Issue body text.
    pub body: String,
}

/// Tracker operations the orchestrator and poller depend on.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// List open issues in a repository carrying the given label.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tracker` on API or transport failure.
    async fn list_open_issues(
        &self,
        owner: &str,
        repo: &str,
        label: &str,
    ) -> Result<Vec<IssueSummary>>;

    /// Open a change request from the pushed branch of a tracker item.
    ///
    /// Returns the URL of the created change request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tracker` on API or transport failure.
    async fn open_change_request(
        &self,
        issue: &IssueRef,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<String>;
}
