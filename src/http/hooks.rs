//! Hook callback handlers.
//!
//! The agent's pre-tool-use hook posts `{tool_name, tool_input}` here and
//! blocks on the response. Gated tools are relayed to the operator through
//! an interactive chat message; the hook's HTTP response carries the
//! decision back in the shape the hook script consumes:
//! `{"permissionDecision": "allow"|"deny", "message": ...}`.
//!
//! Registration in the pending registry strictly precedes the chat
//! announcement, so a decision arriving from the Slack path can never be
//! lost to a race with the registering side.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use slack_morphism::prelude::{SlackChannelId, SlackTs};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::request::Answer;
use crate::notify::ThreadRef;
use crate::pending::MessageRef;
use crate::slack::blocks;
use crate::slack::client::SlackMessage;
use crate::state::AppState;

/// Pre-tool-use hook payload.
#[derive(Debug, Deserialize)]
pub struct ApprovalHookRequest {
    /// Name of the tool the agent wants to invoke.
    pub tool_name: String,
    /// Tool input as the agent supplied it.
    #[serde(default)]
    pub tool_input: serde_json::Value,
}

/// Decision returned to the hook.
#[derive(Debug, Serialize)]
pub struct ApprovalHookResponse {
    /// `allow` or `deny`.
    #[serde(rename = "permissionDecision")]
    pub permission_decision: String,
    /// Optional operator comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Question hook payload.
#[derive(Debug, Deserialize)]
pub struct QuestionHookRequest {
    /// Question text shown to the operator.
    pub question: String,
    /// Optional enumerated choices.
    #[serde(default)]
    pub choices: Option<Vec<String>>,
}

/// Answer returned to the hook. `answer` is `null` when the wait expired.
#[derive(Debug, Serialize)]
pub struct QuestionHookResponse {
    /// The operator's answer text.
    pub answer: Option<String>,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let presented = headers
        .get("x-auth-token")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if presented == state.hook_token {
        Ok(())
    } else {
        warn!("hook callback with missing or invalid auth token");
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Attribution context for a hook request: the in-flight task, if any.
async fn current_context(state: &AppState) -> (Option<String>, Option<ThreadRef>) {
    let active = state.active_task.lock().await;
    active
        .as_ref()
        .map_or((None, None), |task| (Some(task.task_id.clone()), task.thread.clone()))
}

/// Post an interactive request message, recording its locator for later
/// updates. Returns `None` when chat integration is disabled.
async fn post_request_message(
    state: &AppState,
    thread: Option<&ThreadRef>,
    text: String,
    message_blocks: Vec<slack_morphism::prelude::SlackBlock>,
) -> Option<MessageRef> {
    let slack = state.slack.as_ref()?;

    let (channel, thread_ts) = match thread {
        Some(thread) => (thread.channel.clone(), Some(thread.thread_ts.clone())),
        None => (state.config.slack.channel_id.clone(), None),
    };
    let message = SlackMessage {
        channel: SlackChannelId(channel.clone()),
        text: Some(text),
        blocks: Some(message_blocks),
        thread_ts: thread_ts.map(SlackTs),
    };
    match slack.post_now(message).await {
        Ok(ts) => Some(MessageRef {
            channel,
            ts: ts.to_string(),
        }),
        Err(err) => {
            warn!(%err, "failed to post request message; decision can still arrive");
            None
        }
    }
}

/// Replace an interactive request message with a static status line.
async fn finalize_message(state: &AppState, message: Option<&MessageRef>, status: &str) {
    let (Some(slack), Some(message)) = (state.slack.as_ref(), message) else {
        return;
    };
    let replacement = vec![blocks::text_section(status)];
    if let Err(err) = slack
        .update_message(
            SlackChannelId(message.channel.clone()),
            SlackTs(message.ts.clone()),
            replacement,
        )
        .await
    {
        warn!(%err, "failed to finalize request message");
    }
}

/// `POST /hooks/approval`: gate a tool call behind operator approval.
///
/// # Errors
///
/// Returns `401 Unauthorized` when the auth token is missing or wrong.
#[allow(clippy::needless_pass_by_value)] // axum extractors are taken by value.
pub async fn handle_approval(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ApprovalHookRequest>,
) -> Result<Json<ApprovalHookResponse>, StatusCode> {
    authorize(&state, &headers)?;

    let span = info_span!("approval_hook", tool = %request.tool_name);
    async move {
        if state
            .config
            .auto_allow_tools
            .iter()
            .any(|tool| tool == &request.tool_name)
        {
            info!("tool on auto-allow list");
            return Ok(Json(ApprovalHookResponse {
                permission_decision: "allow".to_owned(),
                message: None,
            }));
        }

        let request_id = Uuid::new_v4().to_string();
        let (task_id, thread) = current_context(&state).await;

        // Register before the message carrying the request id exists.
        let rx = state.approvals.register(&request_id, task_id).await;

        let message_blocks =
            blocks::approval_request_blocks(&request_id, &request.tool_name, &request.tool_input);
        let posted = post_request_message(
            &state,
            thread.as_ref(),
            format!("\u{1f510} Approval required: {}", request.tool_name),
            message_blocks,
        )
        .await;
        if let Some(ref message) = posted {
            state.approvals.note_message(&request_id, message.clone()).await;
        }

        let wait = Duration::from_secs(state.config.timeouts.approval_seconds);
        let response = match tokio::time::timeout(wait, rx).await {
            Ok(Ok(decision)) => {
                let responder = decision.responder.as_deref().unwrap_or("operator");
                let status = if decision.approved {
                    format!("\u{2705} *Allowed* by <@{responder}>")
                } else {
                    format!("\u{274c} *Denied* by <@{responder}>")
                };
                finalize_message(&state, posted.as_ref(), &status).await;
                ApprovalHookResponse {
                    permission_decision: if decision.approved { "allow" } else { "deny" }
                        .to_owned(),
                    message: decision.comment,
                }
            }
            Ok(Err(_closed)) => {
                // Registry dropped the sender (shutdown); fail closed.
                ApprovalHookResponse {
                    permission_decision: "deny".to_owned(),
                    message: Some("approval channel closed".to_owned()),
                }
            }
            Err(_elapsed) => {
                let abandoned = state.approvals.abandon(&request_id).await;
                finalize_message(
                    &state,
                    abandoned.as_ref().or(posted.as_ref()),
                    "\u{23f1}\u{fe0f} Approval request timed out",
                )
                .await;
                info!(request_id, "approval request timed out");
                ApprovalHookResponse {
                    permission_decision: "deny".to_owned(),
                    message: Some("approval timed out".to_owned()),
                }
            }
        };

        info!(
            request_id,
            decision = %response.permission_decision,
            "approval hook resolved"
        );
        Ok(Json(response))
    }
    .instrument(span)
    .await
}

/// `POST /hooks/question`: relay a question to the operator and wait.
///
/// # Errors
///
/// Returns `401 Unauthorized` when the auth token is missing or wrong.
#[allow(clippy::needless_pass_by_value)] // axum extractors are taken by value.
pub async fn handle_question(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<QuestionHookRequest>,
) -> Result<Json<QuestionHookResponse>, StatusCode> {
    authorize(&state, &headers)?;

    let span = info_span!("question_hook");
    async move {
        let request_id = Uuid::new_v4().to_string();
        let (task_id, thread) = current_context(&state).await;

        let rx = state.questions.register(&request_id, task_id).await;

        let message_blocks = blocks::question_blocks(
            &request_id,
            &request.question,
            request.choices.as_deref(),
        );
        let posted = post_request_message(
            &state,
            thread.as_ref(),
            format!("\u{2753} {}", request.question),
            message_blocks,
        )
        .await;
        if let Some(ref message) = posted {
            state.questions.note_message(&request_id, message.clone()).await;
        }

        let wait = Duration::from_secs(state.config.timeouts.question_seconds);
        let response = match tokio::time::timeout(wait, rx).await {
            Ok(Ok(Answer { text, responder })) => {
                let responder = responder.as_deref().unwrap_or("operator");
                finalize_message(
                    &state,
                    posted.as_ref(),
                    &format!("\u{1f4ac} Answered by <@{responder}>"),
                )
                .await;
                QuestionHookResponse { answer: Some(text) }
            }
            Ok(Err(_closed)) => QuestionHookResponse { answer: None },
            Err(_elapsed) => {
                let abandoned = state.questions.abandon(&request_id).await;
                finalize_message(
                    &state,
                    abandoned.as_ref().or(posted.as_ref()),
                    "\u{23f1}\u{fe0f} Question timed out",
                )
                .await;
                info!(request_id, "question timed out");
                QuestionHookResponse { answer: None }
            }
        };

        info!(
            request_id,
            answered = response.answer.is_some(),
            "question hook resolved"
        );
        Ok(Json(response))
    }
    .instrument(span)
    .await
}
