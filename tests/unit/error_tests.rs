//! Unit tests for error display formatting.

use agent_dispatch::AppError;

#[test]
fn display_prefixes_by_domain() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Slack("down".into()), "slack: down"),
        (AppError::Tracker("404".into()), "tracker: 404"),
        (AppError::Process("spawn".into()), "process: spawn"),
        (AppError::Git("push".into()), "git: push"),
        (AppError::Http("bind".into()), "http: bind"),
        (AppError::Unauthorized("who".into()), "unauthorized: who"),
        (AppError::Io("disk".into()), "io: disk"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let parse_err = toml::from_str::<toml::Value>("not = = valid").expect_err("invalid toml");
    let err: AppError = parse_err.into();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("invalid config"));
}
