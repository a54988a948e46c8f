//! Slack event handlers: mentions become tasks, interactions resolve
//! pending requests.
//!
//! Every interaction is checked against `authorized_user_ids` before any
//! handler runs; unauthorized attempts are logged and silently dropped.
//! On the first button press the interactive buttons are replaced with a
//! transient indicator so a second tap cannot resolve the request twice;
//! the registry's single-fire channel makes a late duplicate harmless
//! either way.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use slack_morphism::prelude::{
    SlackActionId, SlackBasicChannelInfo, SlackBlockId, SlackClient, SlackClientEventsUserState,
    SlackClientHyperHttpsConnector, SlackEventCallbackBody, SlackHistoryMessage,
    SlackInteractionActionInfo, SlackInteractionEvent, SlackInteractionViewSubmissionEvent,
    SlackPushEventCallback, SlackView,
};
use tracing::{info, warn};

use crate::models::request::{Answer, ApprovalDecision};
use crate::models::task::TaskOrigin;
use crate::slack::blocks;
use crate::state::AppState;

/// Verify that the acting Slack user may drive the bot.
fn is_authorized(user_id: &str, state: &AppState) -> bool {
    if state.config.ensure_authorized(user_id).is_ok() {
        return true;
    }

    warn!(user_id, "unauthorized slack user (silently ignored)");
    false
}

/// Strip the leading bot mention token from a message text.
#[allow(clippy::unwrap_used)] // The pattern is a compile-time constant.
fn strip_mention(text: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^\s*<@[^>]+>\s*").unwrap());
    pattern.replace(text, "").into_owned()
}

/// Handle Socket Mode push events. Only `app_mention` is acted on: the
/// mention text becomes a chat-originated task.
///
/// # Errors
///
/// Never fails; problems are logged and swallowed so the listener stays up.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let app_state: Option<Arc<AppState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<AppState>>().cloned()
    };
    let Some(app) = app_state else {
        warn!("app state not available; cannot process push event");
        return Ok(());
    };

    let SlackEventCallbackBody::AppMention(mention) = event.event else {
        return Ok(());
    };

    let user_id = mention.user.to_string();
    if !is_authorized(&user_id, &app) {
        return Ok(());
    }

    let prompt = strip_mention(mention.content.text.as_deref().unwrap_or_default());
    if prompt.is_empty() {
        info!(user_id, "mention with no instruction text; ignoring");
        return Ok(());
    }

    // Replies stay threaded under the mention itself unless the mention
    // was already inside a thread.
    let thread_ts = mention
        .origin
        .thread_ts
        .as_ref()
        .map_or_else(|| mention.origin.ts.to_string(), ToString::to_string);

    let task = app
        .queue
        .add_task(
            TaskOrigin::Chat {
                channel: mention.channel.to_string(),
                user: user_id.clone(),
                thread_ts: Some(thread_ts),
            },
            prompt,
        )
        .await;

    info!(task_id = %task.id, user_id, "chat mention enqueued as task");
    Ok(())
}

/// Handle interactive payloads (buttons, modal submissions).
///
/// # Errors
///
/// Never fails; handler problems are logged and swallowed.
pub async fn handle_interaction(
    event: SlackInteractionEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let app_state: Option<Arc<AppState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<AppState>>().cloned()
    };
    let Some(app) = app_state else {
        warn!("app state not available; cannot process interaction");
        return Ok(());
    };

    match &event {
        SlackInteractionEvent::BlockActions(block_event) => {
            let user_id = block_event
                .user
                .as_ref()
                .map(|u| u.id.to_string())
                .unwrap_or_default();
            if user_id.is_empty() || !is_authorized(&user_id, &app) {
                return Ok(());
            }

            let Some(actions) = &block_event.actions else {
                return Ok(());
            };

            // Replace the buttons before dispatching so concurrent taps
            // are no-ops. Actions that open a modal are exempt: if the
            // operator dismisses the modal the buttons must stay usable.
            let opens_modal = actions
                .iter()
                .any(|a| a.action_id.to_string() == "question_answer");
            if !opens_modal {
                replace_buttons_with_processing(
                    block_event.channel.as_ref(),
                    block_event.message.as_ref(),
                    &app,
                )
                .await;
            }

            for action in actions {
                let action_id = action.action_id.to_string();
                info!(action_id, user_id, "dispatching block action");
                match action_id.as_str() {
                    "approval_allow" | "approval_deny" => {
                        handle_approval_action(action, &action_id, &user_id, &app).await;
                    }
                    "question_choice" => {
                        handle_question_choice(action, &user_id, &app).await;
                    }
                    "question_answer" => {
                        handle_question_answer(action, block_event.trigger_id.clone(), &app).await;
                    }
                    other => warn!(action_id = other, "unknown action_id"),
                }
            }
        }
        SlackInteractionEvent::ViewSubmission(view_event) => {
            let user_id = view_event.user.id.to_string();
            if !is_authorized(&user_id, &app) {
                return Ok(());
            }
            if let Err(err) = handle_view_submission(view_event, &user_id, &app).await {
                warn!(%err, "view submission handler failed");
            }
        }
        _ => {
            info!("unhandled interaction event type");
        }
    }
    Ok(())
}

/// Replace interactive buttons with a transient indicator.
async fn replace_buttons_with_processing(
    channel: Option<&SlackBasicChannelInfo>,
    message: Option<&SlackHistoryMessage>,
    state: &AppState,
) {
    let Some(ref slack) = state.slack else { return };
    let msg_ts = message.map(|m| m.origin.ts.clone());
    let chan_id = channel.map(|c| c.id.clone());

    if let (Some(ts), Some(ch)) = (msg_ts, chan_id) {
        let processing_blocks = vec![blocks::text_section("\u{23f3} Processing\u{2026}")];
        if let Err(err) = slack.update_message(ch, ts, processing_blocks).await {
            // Non-fatal; the hook side posts its own final status.
            warn!(%err, "failed to apply double-submission guard");
        }
    }
}

/// Resolve an approval request from an Allow/Deny button press.
async fn handle_approval_action(
    action: &SlackInteractionActionInfo,
    action_id: &str,
    user_id: &str,
    state: &AppState,
) {
    let Some(request_id) = action.value.as_deref() else {
        warn!(action_id, "approval action missing request_id value");
        return;
    };

    let decision = if action_id == "approval_allow" {
        ApprovalDecision::allow(Some(user_id.to_owned()))
    } else {
        ApprovalDecision::deny(Some(user_id.to_owned()))
    };

    let approved = decision.approved;
    if state.approvals.resolve(request_id, decision).await {
        info!(request_id, approved, user_id, "approval request resolved");
    } else {
        warn!(
            request_id,
            "approval already resolved or timed out; press ignored"
        );
    }
}

/// Resolve a question request from a choice button press.
async fn handle_question_choice(
    action: &SlackInteractionActionInfo,
    user_id: &str,
    state: &AppState,
) {
    let Some(value) = action.value.as_deref() else {
        warn!("question choice missing value");
        return;
    };
    let Some((request_id, choice)) = value.split_once(':') else {
        warn!(value, "malformed question choice value");
        return;
    };

    let answer = Answer {
        text: choice.to_owned(),
        responder: Some(user_id.to_owned()),
    };
    if state.questions.resolve(request_id, answer).await {
        info!(request_id, choice, user_id, "question answered by choice");
    } else {
        warn!(
            request_id,
            "question already resolved or timed out; press ignored"
        );
    }
}

/// Open the free-text answer modal for a question request.
async fn handle_question_answer(
    action: &SlackInteractionActionInfo,
    trigger_id: slack_morphism::prelude::SlackTriggerId,
    state: &AppState,
) {
    let Some(request_id) = action.value.as_deref() else {
        warn!("question answer action missing request_id value");
        return;
    };
    let Some(ref slack) = state.slack else { return };

    let callback_id = format!("question_answer:{request_id}");
    let modal = blocks::answer_modal(&callback_id, "Answer");
    if let Err(err) = slack.open_modal(trigger_id, modal).await {
        warn!(%err, request_id, "failed to open answer modal");
    }
}

/// Route a modal submission to its pending question.
async fn handle_view_submission(
    event: &SlackInteractionViewSubmissionEvent,
    user_id: &str,
    state: &AppState,
) -> std::result::Result<(), String> {
    let callback_id = match &event.view.view {
        SlackView::Modal(modal) => modal
            .callback_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        SlackView::Home(_) => {
            return Err("unexpected home view in modal submission".into());
        }
    };

    let (source, request_id) = callback_id
        .split_once(':')
        .ok_or_else(|| format!("malformed callback_id: {callback_id}"))?;
    if source != "question_answer" {
        return Err(format!("unknown modal source: {source}"));
    }

    let text = event
        .view
        .state_params
        .state
        .as_ref()
        .and_then(|s| s.values.get(&SlackBlockId("answer_block".to_owned())))
        .and_then(|block| block.get(&SlackActionId("answer_text".to_owned())))
        .and_then(|v| v.value.clone())
        .unwrap_or_default();
    if text.is_empty() {
        return Err("answer text is empty".into());
    }

    let answer = Answer {
        text,
        responder: Some(user_id.to_owned()),
    };
    if state.questions.resolve(request_id, answer).await {
        info!(request_id, user_id, "question answered via modal");
    } else {
        warn!(request_id, "question gone before modal submission landed");
    }
    Ok(())
}
