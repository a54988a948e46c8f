//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Nested Slack configuration for Socket Mode connectivity.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML file. An empty `channel_id` disables the Slack
/// integration entirely.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Default channel where tracker tasks are announced.
    #[serde(default)]
    pub channel_id: String,
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl SlackConfig {
    /// Whether the Slack integration is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.channel_id.is_empty()
    }
}

/// Issue tracker polling configuration.
///
/// The API token is loaded at runtime; an empty repo allow-list disables
/// the poller.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TrackerConfig {
    /// Allow-listed repositories as `owner/repo` strings.
    #[serde(default)]
    pub repos: Vec<String>,
    /// Label an issue must carry to be picked up.
    #[serde(default = "default_tracker_label")]
    pub label: String,
    /// Seconds between polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Base branch change requests target.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// API token (populated at runtime).
    #[serde(skip)]
    pub token: String,
}

impl TrackerConfig {
    /// Whether the tracker poller is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.repos.is_empty()
    }

    /// The allow-list parsed into `(owner, repo)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an entry is not of the form
    /// `owner/repo`.
    pub fn parsed_repos(&self) -> Result<Vec<(String, String)>> {
        self.repos
            .iter()
            .map(|entry| {
                entry
                    .split_once('/')
                    .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty())
                    .map(|(owner, repo)| (owner.to_owned(), repo.to_owned()))
                    .ok_or_else(|| {
                        AppError::Config(format!("invalid tracker repo entry: {entry}"))
                    })
            })
            .collect()
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            repos: Vec::new(),
            label: default_tracker_label(),
            poll_interval_seconds: default_poll_interval(),
            base_branch: default_base_branch(),
            token: String::new(),
        }
    }
}

fn default_tracker_label() -> String {
    "agent".into()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_base_branch() -> String {
    "main".into()
}

/// Agent CLI subprocess configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary (e.g., `claude`).
    pub binary: String,
    /// Default arguments passed before the resume flag and prompt.
    #[serde(default)]
    pub args: Vec<String>,
    /// Wall-clock limit for one run.
    #[serde(default = "default_agent_timeout")]
    pub timeout_seconds: u64,
    /// In-memory cap per buffered output stream.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_agent_timeout() -> u64 {
    1800
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

/// Continuation store eviction settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Hours a continuation record stays usable after its last use.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
    /// Seconds between periodic sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_sweep_interval() -> u64 {
    3600
}

/// Configurable timeout values (seconds) for blocking hook interactions.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Approval request timeout.
    #[serde(default = "default_approval_seconds")]
    pub approval_seconds: u64,
    /// Question request timeout.
    #[serde(default = "default_question_seconds")]
    pub question_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            approval_seconds: default_approval_seconds(),
            question_seconds: default_question_seconds(),
        }
    }
}

fn default_approval_seconds() -> u64 {
    300
}

fn default_question_seconds() -> u64 {
    300
}

fn default_http_port() -> u16 {
    3001
}

fn default_flush_interval() -> u64 {
    3
}

fn default_hook_token_path() -> PathBuf {
    PathBuf::from(".agent-dispatch/auth-token")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Working directory for chat tasks with no worktree.
    pub default_workspace_root: PathBuf,
    /// Directory holding local clones, one per tracked repository.
    pub repos_root: PathBuf,
    /// Directory worktrees are created under.
    pub workspaces_root: PathBuf,
    /// Slack connectivity settings.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Tracker polling settings.
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Agent subprocess settings.
    pub agent: AgentConfig,
    /// Continuation store eviction settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Timeouts for blocking hook flows.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Slack user IDs allowed to create tasks and resolve requests.
    pub authorized_user_ids: Vec<String>,
    /// Tools approved without operator involvement.
    #[serde(default)]
    pub auto_allow_tools: Vec<String>,
    /// Port the hook callback server binds on localhost.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// File the per-process hook auth token is written to.
    #[serde(default = "default_hook_token_path")]
    pub hook_token_path: PathBuf,
    /// Seconds between output flushes to a task thread.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load credentials for the enabled integrations from the OS keychain
    /// with environment-variable fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required credential is missing,
    /// which is fatal at startup.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if self.slack.enabled() {
            self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
            self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        }
        if self.tracker.enabled() {
            self.tracker.token = load_credential("tracker_token", "GITHUB_TOKEN").await?;
        }
        Ok(())
    }

    /// Validate that a Slack user may drive the bot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the user is not in the allowed list.
    pub fn ensure_authorized(&self, user_id: &str) -> Result<()> {
        if self.authorized_user_ids.iter().any(|id| id == user_id) {
            Ok(())
        } else {
            Err(AppError::Unauthorized("user is not authorized".into()))
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.authorized_user_ids.is_empty() {
            return Err(AppError::Config(
                "authorized_user_ids must not be empty".into(),
            ));
        }

        if self.agent.binary.is_empty() {
            return Err(AppError::Config("agent.binary must not be empty".into()));
        }

        if self.agent.max_output_bytes == 0 {
            return Err(AppError::Config(
                "agent.max_output_bytes must be greater than zero".into(),
            ));
        }

        // Surface malformed repo entries at startup, not first poll.
        self.tracker.parsed_repos()?;

        let canonical_root = self
            .default_workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("default_workspace_root invalid: {err}")))?;
        self.default_workspace_root = canonical_root;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Try OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new("agent-dispatch", &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    // Fallback to environment variable.
    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
