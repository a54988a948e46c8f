//! Git CLI implementation of [`WorkspaceManager`].
//!
//! Worktrees are created under a configured root, one per tracker item,
//! from a local clone of the item's repository. Layout:
//!
//! - clone:    `<repos_root>/<owner>-<repo>`
//! - worktree: `<workspaces_root>/<owner>-<repo>-<number>`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use super::{branch_name, Workspace, WorkspaceManager};
use crate::models::task::IssueRef;
use crate::{AppError, Result};

/// Worktree manager shelling out to the `git` binary.
pub struct GitWorkspaces {
    repos_root: PathBuf,
    workspaces_root: PathBuf,
}

impl GitWorkspaces {
    /// Create a manager rooted at the configured clone and worktree
    /// directories.
    #[must_use]
    pub fn new(repos_root: PathBuf, workspaces_root: PathBuf) -> Self {
        Self {
            repos_root,
            workspaces_root,
        }
    }

    fn repo_path(&self, issue: &IssueRef) -> PathBuf {
        self.repos_root.join(format!("{}-{}", issue.owner, issue.repo))
    }

    fn worktree_path(&self, issue: &IssueRef) -> PathBuf {
        self.workspaces_root
            .join(format!("{}-{}-{}", issue.owner, issue.repo, issue.number))
    }
}

#[async_trait]
impl WorkspaceManager for GitWorkspaces {
    async fn acquire(&self, issue: &IssueRef) -> Result<Workspace> {
        let repo_path = self.repo_path(issue);
        if !repo_path.is_dir() {
            return Err(AppError::Git(format!(
                "no local clone for {}/{} at {}",
                issue.owner,
                issue.repo,
                repo_path.display()
            )));
        }

        let branch = branch_name(issue);
        let path = self.worktree_path(issue);

        if path.is_dir() {
            // Reused across resumptions of the same item.
            return Ok(Workspace {
                issue: issue.clone(),
                branch,
                path,
            });
        }

        tokio::fs::create_dir_all(&self.workspaces_root).await?;

        let path_arg = path.display().to_string();
        run_git(
            &["worktree", "add", "-B", &branch, &path_arg],
            &repo_path,
        )
        .await?;

        info!(issue = %issue, branch, worktree = %path.display(), "created worktree");

        Ok(Workspace {
            issue: issue.clone(),
            branch,
            path,
        })
    }

    async fn commit_and_push(&self, workspace: &Workspace, message: &str) -> Result<bool> {
        run_git(&["add", "-A"], &workspace.path).await?;

        let status = run_git(&["status", "--porcelain"], &workspace.path).await?;
        if status.trim().is_empty() {
            info!(issue = %workspace.issue, "worktree clean, nothing to push");
            return Ok(false);
        }

        run_git(&["commit", "-m", message], &workspace.path).await?;
        run_git(
            &["push", "-u", "origin", &workspace.branch],
            &workspace.path,
        )
        .await?;

        info!(issue = %workspace.issue, branch = %workspace.branch, "pushed changes");
        Ok(true)
    }

    async fn remove(&self, issue: &IssueRef) -> Result<()> {
        let repo_path = self.repo_path(issue);
        let path = self.worktree_path(issue);
        if !path.is_dir() {
            return Ok(());
        }

        let path_arg = path.display().to_string();
        if let Err(err) = run_git(
            &["worktree", "remove", "--force", &path_arg],
            &repo_path,
        )
        .await
        {
            warn!(issue = %issue, %err, "worktree removal failed");
            return Err(err);
        }

        info!(issue = %issue, worktree = %path.display(), "removed worktree");
        Ok(())
    }
}

/// Run one git command, returning stdout or a `Git` error with stderr.
async fn run_git(args: &[&str], cwd: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|err| AppError::Git(format!("failed to run git {}: {err}", args.join(" "))))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(AppError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )))
    }
}
