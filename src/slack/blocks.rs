//! Slack Block Kit message builders.
//!
//! Helpers for constructing the interactive approval and question
//! messages plus the status lines that replace them after resolution.

use slack_morphism::prelude::{
    SlackActionBlockElement, SlackActionId, SlackActionsBlock, SlackBlock, SlackBlockButtonElement,
    SlackBlockId, SlackBlockPlainTextInputElement, SlackBlockPlainTextOnly, SlackBlockText,
    SlackCallbackId, SlackInputBlock, SlackInputBlockElement, SlackModalView, SlackSectionBlock,
    SlackView,
};

/// Longest tool-input excerpt rendered inline in an approval message.
const INPUT_EXCERPT_LIMIT: usize = 600;

/// Build a plain text section block.
#[must_use]
pub fn text_section(text: &str) -> SlackBlock {
    SlackBlock::Section(SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(text.into())))
}

/// Build an actions block with the given buttons.
#[must_use]
pub fn action_buttons(block_id: &str, buttons: &[(&str, &str, &str)]) -> SlackBlock {
    let elements: Vec<SlackActionBlockElement> = buttons
        .iter()
        .map(|(action_id, text, value)| {
            SlackActionBlockElement::Button(
                SlackBlockButtonElement::new(
                    (*action_id).into(),
                    SlackBlockPlainTextOnly::from(*text),
                )
                .with_value((*value).into()),
            )
        })
        .collect();
    SlackBlock::Actions(
        SlackActionsBlock::new(elements).with_block_id(SlackBlockId(block_id.into())),
    )
}

/// Build approval action buttons (Allow / Deny).
#[must_use]
pub fn approval_buttons(request_id: &str) -> SlackBlock {
    action_buttons(
        &format!("approval_{request_id}"),
        &[
            ("approval_allow", "Allow", request_id),
            ("approval_deny", "Deny", request_id),
        ],
    )
}

/// Build the full approval request message for a gated tool call.
#[must_use]
pub fn approval_request_blocks(
    request_id: &str,
    tool_name: &str,
    tool_input: &serde_json::Value,
) -> Vec<SlackBlock> {
    let rendered =
        serde_json::to_string_pretty(tool_input).unwrap_or_else(|_| tool_input.to_string());
    let excerpt: String = rendered.chars().take(INPUT_EXCERPT_LIMIT).collect();
    let truncated = if excerpt.len() < rendered.len() {
        format!("{excerpt}\u{2026}")
    } else {
        excerpt
    };

    vec![
        text_section(&format!(
            "\u{1f510} *Approval required:* `{tool_name}`\n```\n{truncated}\n```"
        )),
        approval_buttons(request_id),
    ]
}

/// Build a question message with one button per choice, or an Answer
/// button opening a free-text modal when no choices are given.
#[must_use]
pub fn question_blocks(
    request_id: &str,
    question: &str,
    choices: Option<&[String]>,
) -> Vec<SlackBlock> {
    let header = text_section(&format!("\u{2753} {question}"));

    let buttons_block = match choices {
        Some(choices) if !choices.is_empty() => {
            let elements: Vec<SlackActionBlockElement> = choices
                .iter()
                .map(|choice| {
                    SlackActionBlockElement::Button(
                        SlackBlockButtonElement::new(
                            "question_choice".into(),
                            SlackBlockPlainTextOnly::from(choice.as_str()),
                        )
                        .with_value(format!("{request_id}:{choice}")),
                    )
                })
                .collect();
            SlackBlock::Actions(
                SlackActionsBlock::new(elements)
                    .with_block_id(SlackBlockId(format!("question_{request_id}"))),
            )
        }
        _ => action_buttons(
            &format!("question_{request_id}"),
            &[("question_answer", "Answer", request_id)],
        ),
    };

    vec![header, buttons_block]
}

/// Build a Slack modal view for collecting a free-text answer.
///
/// The `callback_id` encodes `question_answer:{request_id}` so the
/// `ViewSubmission` handler can route the text to the right pending
/// request.
#[must_use]
pub fn answer_modal(callback_id: &str, title: &str) -> SlackView {
    let input_element =
        SlackBlockPlainTextInputElement::new(SlackActionId("answer_text".to_owned()))
            .with_multiline(true)
            .with_placeholder(SlackBlockPlainTextOnly::from("Type your answer\u{2026}"));

    let input_block = SlackInputBlock::new(
        SlackBlockPlainTextOnly::from("Answer"),
        SlackInputBlockElement::PlainTextInput(input_element),
    )
    .with_block_id(SlackBlockId("answer_block".to_owned()));

    SlackView::Modal(
        SlackModalView::new(
            SlackBlockPlainTextOnly::from(title),
            vec![input_block.into()],
        )
        .with_callback_id(SlackCallbackId(callback_id.to_owned()))
        .with_submit(SlackBlockPlainTextOnly::from("Submit")),
    )
}
