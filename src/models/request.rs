//! Decision payloads delivered through the pending-request registries.

use serde::{Deserialize, Serialize};

/// Operator verdict on an approval request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ApprovalDecision {
    /// `true` to allow the gated action, `false` to deny it.
    pub approved: bool,
    /// Optional free-text comment accompanying the verdict.
    pub comment: Option<String>,
    /// Identity of the responder, when known.
    pub responder: Option<String>,
}

impl ApprovalDecision {
    /// An allow verdict from the given responder.
    #[must_use]
    pub fn allow(responder: Option<String>) -> Self {
        Self {
            approved: true,
            comment: None,
            responder,
        }
    }

    /// A deny verdict from the given responder.
    #[must_use]
    pub fn deny(responder: Option<String>) -> Self {
        Self {
            approved: false,
            comment: None,
            responder,
        }
    }
}

/// Operator answer to a question request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Answer {
    /// Free-text or chosen-option answer.
    pub text: String,
    /// Identity of the responder, when known.
    pub responder: Option<String>,
}
