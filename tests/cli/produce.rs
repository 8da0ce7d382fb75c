//! Tests for `fieldguard produce`.

use crate::support::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use predicates::prelude::*;

fn decode(line: &str) -> Vec<u8> {
    STANDARD.decode(line).expect("produce should print base64")
}

#[test]
fn test_produce_encrypts_tagged_field() {
    let t = Test::new("s3cret");
    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));

    let output = t.produce("users", &[&user_json("alice", CARD_NUMBER)]);
    assert_success(&output);

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    let message = decode(&lines[0]);
    assert_eq!(&message[..5], &[0, 0, 0, 0, 1]);
    let text = String::from_utf8_lossy(&message);
    assert!(text.contains("alice"));
    assert!(!text.contains(CARD_NUMBER));
}

#[test]
fn test_produce_without_rules_keeps_plaintext() {
    let t = Test::new("s3cret");
    assert_success(&t.register("users-value", USER_SCHEMA, None));

    let output = t.produce("users", &[&user_json("bob", CARD_NUMBER)]);
    assert_success(&output);
    let message = decode(&stdout_lines(&output)[0]);
    assert!(String::from_utf8_lossy(&message).contains(CARD_NUMBER));
}

#[test]
fn test_produce_one_line_per_record() {
    let t = Test::new("s3cret");
    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));

    let output = t.produce(
        "users",
        &[&user_json("a", "1"), &user_json("b", "2"), &user_json("c", "3")],
    );
    assert_success(&output);
    assert_eq!(stdout_lines(&output).len(), 3);
}

#[test]
fn test_produce_record_from_file() {
    let t = Test::new("s3cret");
    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));
    let record = t.write("alice.json", &user_json("alice", CARD_NUMBER));

    t.cmd()
        .args(["produce", "--topic", "users", "--record", &format!("@{}", record)])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_produce_explicit_subject_and_version() {
    let t = Test::new("s3cret");
    assert_success(&t.register("people", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));
    assert_success(&t.register("people", r#""string""#, None));

    t.cmd()
        .args([
            "produce",
            "--subject",
            "people",
            "--version",
            "1",
            "--record",
            &user_json("carol", CARD_NUMBER),
        ])
        .assert()
        .success();

    t.cmd()
        .args(["produce", "--subject", "people", "--record", &user_json("carol", CARD_NUMBER)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("type mismatch"));
}

#[test]
fn test_produce_rejects_record_not_matching_schema() {
    let t = Test::new("s3cret");
    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));

    let output = t.produce("users", &[r#"{"name": "alice"}"#]);
    assert_failure(&output);
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_produce_without_kms_secret_fails() {
    let t = Test::new("s3cret");
    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));
    t.write("fieldguard.toml", "[registry]\npath = \"registry\"\n\n[retry]\nmax_retries = 0\n");

    let output = t.produce("users", &[&user_json("dave", CARD_NUMBER)]);
    assert_failure(&output);
    assert_stderr_contains(&output, "encryptPII");
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_produce_requires_topic_or_subject() {
    let t = Test::new("s3cret");

    t.cmd()
        .args(["produce", "--record", "{}"])
        .assert()
        .failure();
}
