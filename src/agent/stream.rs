//! Parsing of the agent CLI's newline-delimited stdout transcript.
//!
//! The agent emits one JSON record per line. Recognized record shapes:
//!
//! | `type`      | Contribution                                            |
//! |-------------|---------------------------------------------------------|
//! | `system`    | `session_id` only                                       |
//! | `assistant` | text content blocks, plus `session_id` when present     |
//! | `result`    | terminal result text, plus `session_id` when present    |
//!
//! Any line that is not valid JSON is treated as plain text and carried
//! into the assembled output unchanged. The most recent `session_id` wins
//! as the continuation handle.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

/// One structured record from the agent's stdout stream.
#[derive(Debug, Deserialize)]
struct StreamRecord {
    /// Record discriminator (`system`, `assistant`, `result`, ...).
    #[serde(rename = "type")]
    kind: String,
    /// Continuation handle valid at the time of the record.
    session_id: Option<String>,
    /// Assistant message body for `assistant` records.
    message: Option<AssistantMessage>,
    /// Terminal result text for `result` records.
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<Vec<ContentBlock>>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Output of [`parse_transcript`]: assembled text plus the last
/// continuation handle seen.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedTranscript {
    /// Assistant text, result text, and unparsed lines in encounter order.
    pub text: String,
    /// Most recent continuation handle in the stream, if any.
    pub continuation: Option<String>,
}

/// Parse a buffered stdout transcript into text and a continuation handle.
#[must_use]
pub fn parse_transcript(stdout: &str) -> ParsedTranscript {
    let mut segments: Vec<String> = Vec::new();
    let mut continuation = None;

    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<StreamRecord>(line) else {
            // Not a structured record; pass the line through as-is.
            segments.push(line.to_owned());
            continue;
        };

        if let Some(id) = record.session_id {
            continuation = Some(id);
        }

        match record.kind.as_str() {
            "assistant" => {
                let blocks = record
                    .message
                    .and_then(|message| message.content)
                    .unwrap_or_default();
                for block in blocks {
                    if block.kind == "text" {
                        if let Some(text) = block.text {
                            segments.push(text);
                        }
                    }
                }
            }
            "result" => {
                if let Some(result) = record.result {
                    segments.push(result);
                }
            }
            _ => {}
        }
    }

    ParsedTranscript {
        text: segments.join("\n"),
        continuation,
    }
}

/// Find the first change-request URL in the assembled output.
#[must_use]
#[allow(clippy::unwrap_used)] // The pattern is a compile-time constant.
pub fn find_artifact_url(text: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"https://github\.com/[\w.-]+/[\w.-]+/pull/\d+").unwrap());
    pattern.find(text).map(|found| found.as_str().to_owned())
}
