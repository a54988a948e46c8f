//! Unit tests for configuration parsing and validation.

use agent_dispatch::config::GlobalConfig;

fn minimal_toml(root: &str) -> String {
    format!(
        r#"
default_workspace_root = '{root}'
repos_root = '{root}'
workspaces_root = '{root}'
authorized_user_ids = ["U1"]

[agent]
binary = "claude"
"#
    )
}

#[test]
fn minimal_config_parses_with_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_string_lossy().into_owned();
    let config = GlobalConfig::from_toml_str(&minimal_toml(&root)).expect("valid config");

    assert_eq!(config.http_port, 3001);
    assert_eq!(config.flush_interval_seconds, 3);
    assert_eq!(config.timeouts.approval_seconds, 300);
    assert_eq!(config.timeouts.question_seconds, 300);
    assert_eq!(config.session.max_age_hours, 24);
    assert_eq!(config.session.sweep_interval_seconds, 3600);
    assert_eq!(config.agent.timeout_seconds, 1800);
    assert_eq!(config.agent.max_output_bytes, 1024 * 1024);
    assert_eq!(config.tracker.label, "agent");
    assert_eq!(config.tracker.base_branch, "main");
    assert!(!config.slack.enabled());
    assert!(!config.tracker.enabled());
}

#[test]
fn empty_authorized_users_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_string_lossy().into_owned();
    let toml = minimal_toml(&root).replace(r#"["U1"]"#, "[]");

    let err = GlobalConfig::from_toml_str(&toml).expect_err("must fail");
    assert!(err.to_string().contains("authorized_user_ids"));
}

#[test]
fn missing_workspace_root_is_rejected() {
    let toml = minimal_toml("/definitely/not/a/real/path");
    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn malformed_tracker_repo_entry_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_string_lossy().into_owned();
    let toml = format!(
        "{}\n[tracker]\nrepos = [\"not-a-repo\"]\n",
        minimal_toml(&root)
    );

    let err = GlobalConfig::from_toml_str(&toml).expect_err("must fail");
    assert!(err.to_string().contains("invalid tracker repo entry"));
}

#[test]
fn tracker_repos_parse_into_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_string_lossy().into_owned();
    let toml = format!(
        "{}\n[tracker]\nrepos = [\"acme/widget\", \"acme/gadget\"]\n",
        minimal_toml(&root)
    );

    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");
    assert!(config.tracker.enabled());
    assert_eq!(
        config.tracker.parsed_repos().expect("pairs"),
        vec![
            ("acme".to_owned(), "widget".to_owned()),
            ("acme".to_owned(), "gadget".to_owned()),
        ]
    );
}

#[test]
fn ensure_authorized_distinguishes_users() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_string_lossy().into_owned();
    let config = GlobalConfig::from_toml_str(&minimal_toml(&root)).expect("valid config");

    assert!(config.ensure_authorized("U1").is_ok());
    assert!(config.ensure_authorized("U2").is_err());
}

#[test]
fn slack_section_enables_integration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_string_lossy().into_owned();
    let toml = format!(
        "{}\n[slack]\nchannel_id = \"C_OPS\"\n",
        minimal_toml(&root)
    );

    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");
    assert!(config.slack.enabled());
    assert_eq!(config.slack.channel_id, "C_OPS");
}

#[test]
fn empty_agent_binary_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_string_lossy().into_owned();
    let toml = minimal_toml(&root).replace("\"claude\"", "\"\"");

    let err = GlobalConfig::from_toml_str(&toml).expect_err("must fail");
    assert!(err.to_string().contains("agent.binary"));
}
