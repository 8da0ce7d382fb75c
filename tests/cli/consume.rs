//! Tests for `fieldguard consume`.

use crate::support::*;
use predicates::prelude::*;
use serde_json::Value as Json;

/// Register the PII schema and produce one message per name.
fn produced(t: &Test, names: &[&str]) -> Vec<String> {
    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));
    let records: Vec<String> = names.iter().map(|n| user_json(n, CARD_NUMBER)).collect();
    let refs: Vec<&str> = records.iter().map(String::as_str).collect();
    let output = t.produce("users", &refs);
    assert_success(&output);
    stdout_lines(&output)
}

#[test]
fn test_consume_roundtrip() {
    let t = Test::new("s3cret");
    let messages = produced(&t, &["alice"]);

    let output = t.consume(&messages);
    assert_success(&output);
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);

    let record: Json = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(record["name"], "alice");
    assert_eq!(record["favoriteNumber"], 42);
    assert_eq!(record["creditCardNumber"], CARD_NUMBER);
}

#[test]
fn test_consume_from_stdin() {
    let t = Test::new("s3cret");
    let messages = produced(&t, &["a", "b"]);

    t.cmd()
        .arg("consume")
        .write_stdin(format!("{}\n\n{}\n", messages[0], messages[1]))
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name":"a""#))
        .stdout(predicate::str::contains(r#""name":"b""#));
}

#[test]
fn test_consume_with_wrong_secret_reports_each_message() {
    let t = Test::new("s3cret");
    let messages = produced(&t, &["alice", "bob"]);
    t.write_config("not-the-secret");

    let output = t.consume(&messages);
    assert_success(&output);
    assert!(stdout(&output).is_empty());
    let err = stderr(&output);
    assert!(err.contains("message 0"), "stderr: {}", err);
    assert!(err.contains("message 1"), "stderr: {}", err);
    assert!(err.contains("access denied"), "stderr: {}", err);
    assert!(err.contains("2 of 2 messages failed"), "stderr: {}", err);
}

#[test]
fn test_consume_continues_past_bad_messages() {
    let t = Test::new("s3cret");
    let mut messages = produced(&t, &["alice"]);
    messages.insert(0, "%%%not-base64%%%".to_string());
    messages.insert(1, "AQAAAAE=".to_string());

    let output = t.consume(&messages);
    assert_success(&output);
    assert_eq!(stdout_lines(&output).len(), 1);
    let err = stderr(&output);
    assert!(err.contains("invalid message encoding"), "stderr: {}", err);
    assert!(err.contains("unknown magic byte"), "stderr: {}", err);
    assert!(err.contains("2 of 3 messages failed"), "stderr: {}", err);
}

#[test]
fn test_consume_unknown_schema_id() {
    let t = Test::new("s3cret");

    // 0x00 | id 7 | empty body
    let output = t.consume(&["AAAAAAc=".to_string()]);
    assert_success(&output);
    assert_stderr_contains(&output, "7");
    assert!(stdout(&output).is_empty());
}
