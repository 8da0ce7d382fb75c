//! Tests for error reporting, hints and global flags.

use crate::support::*;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let t = Test::new("s3cret");

    t.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("register"))
        .stdout(predicate::str::contains("produce"))
        .stdout(predicate::str::contains("consume"));
}

#[test]
fn test_unknown_command_fails() {
    let t = Test::new("s3cret");

    let output = t.cmd().arg("unknown-command").output().unwrap();
    assert_failure(&output);
}

#[test]
fn test_version_flag() {
    let t = Test::new("s3cret");

    t.cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fieldguard"));
}

#[test]
fn test_unknown_subject_fails_with_hint() {
    let t = Test::new("s3cret");

    let output = t.produce("users", &[&user_json("alice", CARD_NUMBER)]);
    assert_failure(&output);
    assert_stderr_contains(&output, "subject not found: users-value");
    assert_stderr_contains(&output, "fieldguard register");
}

#[test]
fn test_missing_explicit_config() {
    let t = Test::new("s3cret");

    t.cmd()
        .args(["--config", "missing.toml", "consume", "AAAAAAE="])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"))
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn test_invalid_config_values() {
    let t = Test::new("s3cret");
    t.write("fieldguard.toml", "[cache]\ndek_ttl_secs = 0\n");

    t.cmd()
        .args(["consume", "AAAAAAE="])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dek_ttl_secs"));
}

#[test]
fn test_config_from_env() {
    let t = Test::new("s3cret");
    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));
    let config = t.dir.path().join("fieldguard.toml");
    let elsewhere = tempfile::TempDir::new().unwrap();
    let registry = t.dir.path().join("registry");
    std::fs::write(
        &config,
        format!(
            "[registry]\npath = \"{}\"\n\n[kms.local]\nsecret = \"s3cret\"\n",
            registry.display()
        ),
    )
    .unwrap();

    t.cmd()
        .current_dir(elsewhere.path())
        .env("FIELDGUARD_CONFIG", &config)
        .args(["produce", "--topic", "users", "--record", &user_json("a", "1")])
        .assert()
        .success();
}

#[test]
fn test_local_secret_from_env() {
    let t = Test::new("s3cret");
    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));
    t.write("fieldguard.toml", "[registry]\npath = \"registry\"\n");

    t.cmd()
        .env("LOCAL_SECRET", "s3cret")
        .args(["produce", "--topic", "users", "--record", &user_json("a", "1")])
        .assert()
        .success();
}

#[test]
fn test_default_has_no_debug_logs() {
    let t = Test::new("s3cret");

    let output = t.register("users-value", USER_SCHEMA, None);
    assert_success(&output);
    let err = stderr(&output);
    assert!(!err.contains("DEBUG") && !err.contains("TRACE"), "stderr: {}", err);
}

#[test]
fn test_verbose_shows_debug_logs() {
    let t = Test::new("s3cret");
    let schema = t.write("user.avsc", USER_SCHEMA);

    t.cmd()
        .args(["--verbose", "register", "--subject", "users-value", "--schema", &schema])
        .assert()
        .success()
        .stderr(predicate::str::contains("DEBUG"));
}

#[test]
fn test_json_log_format() {
    let t = Test::new("s3cret");
    let schema = t.write("user.avsc", USER_SCHEMA);

    let output = t
        .cmd()
        .env("FIELDGUARD_LOG", "fieldguard=debug")
        .args(["--log-format", "json", "register", "--subject", "users-value", "--schema", &schema])
        .output()
        .unwrap();
    assert_success(&output);
    let json_lines: Vec<serde_json::Value> = stderr(&output)
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    assert!(!json_lines.is_empty());
    assert!(json_lines.iter().all(|l| l.get("level").is_some()));
    // stdout stays clean for the schema id
    assert_eq!(stdout(&output).trim(), "1");
}

#[test]
fn test_completions_bash_outputs_script() {
    let t = Test::new("s3cret");

    t.cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_fieldguard").or(predicate::str::contains("complete")));
}

#[test]
fn test_completions_zsh() {
    let t = Test::new("s3cret");

    t.cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}
