//! GitHub REST implementation of [`TrackerClient`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{IssueSummary, TrackerClient};
use crate::models::task::IssueRef;
use crate::{AppError, Result};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("agent-dispatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct IssueItem {
    number: u64,
    title: String,
    body: Option<String>,
    /// Present when the "issue" is actually a pull request.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedPull {
    html_url: String,
}

/// GitHub API client authenticated with a bearer token.
pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
    default_base_branch: String,
}

impl GitHubClient {
    /// Create a client against the public GitHub API.
    #[must_use]
    pub fn new(token: String, default_base_branch: String) -> Self {
        Self::with_api_base(token, default_base_branch, DEFAULT_API_BASE.to_owned())
    }

    /// Create a client against a custom API base URL.
    #[must_use]
    pub fn with_api_base(token: String, default_base_branch: String, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            api_base,
            default_base_branch,
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }
}

#[async_trait]
impl TrackerClient for GitHubClient {
    async fn list_open_issues(
        &self,
        owner: &str,
        repo: &str,
        label: &str,
    ) -> Result<Vec<IssueSummary>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/issues?state=open&labels={label}",
            self.api_base
        );
        let response = self.request(reqwest::Method::GET, url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Tracker(format!(
                "listing issues for {owner}/{repo} failed with status {}",
                response.status()
            )));
        }

        let items: Vec<IssueItem> = response.json().await?;
        let issues = items
            .into_iter()
            // The issues endpoint also returns pull requests; skip them.
            .filter(|item| item.pull_request.is_none())
            .map(|item| IssueSummary {
                issue: IssueRef::new(owner, repo, item.number),
                title: item.title,
                body: item.body.unwrap_or_default(),
            })
            .collect();
        Ok(issues)
    }

    async fn open_change_request(
        &self,
        issue: &IssueRef,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/pulls",
            self.api_base, issue.owner, issue.repo
        );
        let payload = json!({
            "title": title,
            "head": branch,
            "base": self.default_base_branch,
            "body": body,
        });

        let response = self
            .request(reqwest::Method::POST, url)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Tracker(format!(
                "creating change request for {issue} failed with status {}",
                response.status()
            )));
        }

        let created: CreatedPull = response.json().await?;
        info!(issue = %issue, url = %created.html_url, "opened change request");
        Ok(created.html_url)
    }
}
