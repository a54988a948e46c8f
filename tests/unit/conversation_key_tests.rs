//! Unit tests for conversation key construction.

use agent_dispatch::models::task::IssueRef;
use agent_dispatch::session::ConversationKey;

#[test]
fn chat_key_includes_channel_and_user() {
    let key = ConversationKey::chat("C123", "U456");
    assert_eq!(key.as_str(), "chat:C123:U456");
}

#[test]
fn thread_key_includes_channel_and_ts() {
    let key = ConversationKey::thread("C123", "1700000000.000100");
    assert_eq!(key.as_str(), "thread:C123:1700000000.000100");
}

#[test]
fn tracker_key_includes_full_triple() {
    let key = ConversationKey::tracker(&IssueRef::new("acme", "widget", 7));
    assert_eq!(key.as_str(), "tracker:acme/widget#7");
}

#[test]
fn distinct_chat_pairs_never_collide() {
    let a = ConversationKey::chat("C1", "U1");
    let b = ConversationKey::chat("C1", "U2");
    let c = ConversationKey::chat("C2", "U1");
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_ne!(b, c);
}

#[test]
fn distinct_tracker_triples_never_collide() {
    let a = ConversationKey::tracker(&IssueRef::new("acme", "widget", 7));
    let b = ConversationKey::tracker(&IssueRef::new("acme", "widget", 8));
    let c = ConversationKey::tracker(&IssueRef::new("acme", "gadget", 7));
    assert_ne!(a, b);
    assert_ne!(a, c);
}

#[test]
fn origin_types_never_collide() {
    // Same raw fragments under different origin prefixes stay distinct.
    let chat = ConversationKey::chat("x", "y");
    let thread = ConversationKey::thread("x", "y");
    assert_ne!(chat, thread);
}

#[test]
fn display_matches_as_str() {
    let key = ConversationKey::chat("C9", "U9");
    assert_eq!(key.to_string(), key.as_str());
}
