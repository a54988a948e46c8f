//! Integration tests for throttled output flushing.

use std::sync::Arc;
use std::time::Duration;

use agent_dispatch::notify::{Notifier, ThreadRef};
use agent_dispatch::orchestrator::OutputThrottle;

use super::test_helpers::RecordingNotifier;

fn thread() -> ThreadRef {
    ThreadRef {
        channel: "C_TEST".into(),
        thread_ts: "1000.0001".into(),
    }
}

#[tokio::test]
async fn chunks_within_one_interval_coalesce_into_one_flush() {
    let notifier = Arc::new(RecordingNotifier::new());
    let throttle = OutputThrottle::spawn(
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        thread(),
        Duration::from_millis(150),
    );

    throttle.push("a");
    throttle.push("b");
    throttle.push("c");

    // Well past one interval, well short of two flushes' worth of input.
    tokio::time::sleep(Duration::from_millis(400)).await;
    throttle.finish().await;

    assert_eq!(notifier.posts().await, vec!["abc".to_owned()]);
}

#[tokio::test]
async fn remainder_is_flushed_on_finish() {
    let notifier = Arc::new(RecordingNotifier::new());
    let throttle = OutputThrottle::spawn(
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        thread(),
        Duration::from_secs(3600),
    );

    throttle.push("tail");
    throttle.finish().await;

    assert_eq!(notifier.posts().await, vec!["tail".to_owned()]);
}

#[tokio::test]
async fn flushes_preserve_arrival_order() {
    let notifier = Arc::new(RecordingNotifier::new());
    let throttle = OutputThrottle::spawn(
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        thread(),
        Duration::from_millis(100),
    );

    throttle.push("one");
    tokio::time::sleep(Duration::from_millis(250)).await;
    throttle.push("two");
    throttle.finish().await;

    assert_eq!(
        notifier.posts().await,
        vec!["one".to_owned(), "two".to_owned()]
    );
}

#[tokio::test]
async fn empty_stream_produces_no_flushes() {
    let notifier = Arc::new(RecordingNotifier::new());
    let throttle = OutputThrottle::spawn(
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        thread(),
        Duration::from_millis(50),
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    throttle.finish().await;

    assert!(notifier.posts().await.is_empty());
}

#[tokio::test]
async fn sender_feeds_the_same_buffer() {
    let notifier = Arc::new(RecordingNotifier::new());
    let throttle = OutputThrottle::spawn(
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        thread(),
        Duration::from_secs(3600),
    );

    let tx = throttle.sender();
    tx.send("via-sender".into()).expect("send");
    throttle.finish().await;

    assert_eq!(notifier.posts().await, vec!["via-sender".to_owned()]);
}
