//! Agent process execution: spawning, streaming, and transcript parsing.

pub mod runner;
pub mod stream;

pub use runner::{AgentRunner, RunRequest};

use std::sync::Arc;
use std::time::Duration;

/// Which process stream a chunk arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Callback receiving each output line as it arrives.
pub type ChunkCallback = Arc<dyn Fn(StreamKind, &str) + Send + Sync>;

/// Static configuration for the agent subprocess.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Agent CLI binary.
    pub binary: String,
    /// Arguments passed before the resume flag and prompt.
    pub base_args: Vec<String>,
    /// Wall-clock limit for one run.
    pub timeout: Duration,
    /// In-memory cap for each buffered stream; further bytes are dropped.
    pub max_output_bytes: usize,
}

/// Assembled outcome of one agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Whether the process exited with code 0.
    pub success: bool,
    /// Text assembled from the stdout transcript.
    pub output: String,
    /// New continuation handle, surfaced even on failure.
    pub continuation: Option<String>,
    /// First change-request URL found in the output, if any.
    pub artifact_url: Option<String>,
    /// Failure description for unsuccessful runs.
    pub error: Option<String>,
}
