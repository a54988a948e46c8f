//! Unit tests for the task model.

use agent_dispatch::models::task::{IssueRef, Task, TaskOrigin, TaskResult, TaskStatus};

#[test]
fn new_task_is_pending_with_generated_id() {
    let task = Task::new(
        TaskOrigin::Chat {
            channel: "C1".into(),
            user: "U1".into(),
            thread_ts: None,
        },
        "fix the bug",
    );

    assert!(!task.id.is_empty());
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.prompt, "fix the bug");
    assert!(task.started_at.is_none());
    assert!(task.completed_at.is_none());
    assert!(task.result.is_none());
}

#[test]
fn task_ids_are_unique() {
    let origin = TaskOrigin::Tracker {
        issue: IssueRef::new("acme", "widget", 1),
    };
    let a = Task::new(origin.clone(), "a");
    let b = Task::new(origin, "b");
    assert_ne!(a.id, b.id);
}

#[test]
fn issue_ref_displays_as_owner_repo_number() {
    let issue = IssueRef::new("acme", "widget", 42);
    assert_eq!(issue.to_string(), "acme/widget#42");
}

#[test]
fn origin_issue_accessor() {
    let issue = IssueRef::new("acme", "widget", 7);
    let tracker = TaskOrigin::Tracker {
        issue: issue.clone(),
    };
    let chat = TaskOrigin::Chat {
        channel: "C1".into(),
        user: "U1".into(),
        thread_ts: Some("1.0".into()),
    };

    assert_eq!(tracker.issue(), Some(&issue));
    assert_eq!(chat.issue(), None);
}

#[test]
fn failure_result_carries_error_only() {
    let result = TaskResult::failure("it broke");
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("it broke"));
    assert!(result.output.is_empty());
    assert!(result.artifact_url.is_none());
}

#[test]
fn origin_serializes_with_kind_tag() {
    let origin = TaskOrigin::Tracker {
        issue: IssueRef::new("acme", "widget", 7),
    };
    let json = serde_json::to_value(&origin).expect("serialize");
    assert_eq!(json["kind"], "tracker");
    assert_eq!(json["issue"]["number"], 7);
}
