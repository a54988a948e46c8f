//! Worktree and branch management for tracker-originated tasks.
//!
//! Each tracker item gets a dedicated branch and worktree, reused across
//! resumed executions and removed only when the item is closed.

pub mod git;

pub use git::GitWorkspaces;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::models::task::IssueRef;
use crate::Result;

/// An acquired, ready-to-use worktree for a tracker item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// The tracker item the worktree is dedicated to.
    pub issue: IssueRef,
    /// Branch checked out in the worktree.
    pub branch: String,
    /// Filesystem path the agent runs in.
    pub path: PathBuf,
}

/// Branch name derived deterministically from the tracker item, so repeated
/// resumption finds the same branch.
#[must_use]
pub fn branch_name(issue: &IssueRef) -> String {
    format!("agent/{}-{}-{}", issue.owner, issue.repo, issue.number)
}

/// Filesystem and branch operations for per-item worktrees.
#[async_trait]
pub trait WorkspaceManager: Send + Sync {
    /// Create or reuse the worktree for an item.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` when the checkout cannot be created.
    async fn acquire(&self, issue: &IssueRef) -> Result<Workspace>;

    /// Commit all pending changes in the worktree and push its branch.
    ///
    /// Returns `false` without committing when the worktree is clean.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` when a git operation fails.
    async fn commit_and_push(&self, workspace: &Workspace, message: &str) -> Result<bool>;

    /// Remove the worktree for a closed item.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` when the worktree cannot be removed.
    async fn remove(&self, issue: &IssueRef) -> Result<()>;
}
