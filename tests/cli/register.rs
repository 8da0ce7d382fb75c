//! Tests for `fieldguard register`.

use crate::support::*;
use predicates::prelude::*;

#[test]
fn test_register_prints_schema_id() {
    let t = Test::new("s3cret");

    let output = t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES));
    assert_success(&output);
    assert_eq!(stdout(&output).trim(), "1");
    assert_stderr_contains(&output, "registered users-value");
    assert!(t.dir.path().join("registry").join("registry.json").exists());
}

#[test]
fn test_register_same_definition_reuses_id() {
    let t = Test::new("s3cret");

    assert_success(&t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES)));
    let output = t.register("users-value", USER_SCHEMA, Some(ENCRYPT_PII_RULES));
    assert_success(&output);
    assert_eq!(stdout(&output).trim(), "1");

    let output = t.register("users-value", USER_SCHEMA, None);
    assert_success(&output);
    assert_eq!(stdout(&output).trim(), "2");
    assert_stderr_contains(&output, "version");
}

#[test]
fn test_register_warns_when_nothing_is_tagged() {
    let t = Test::new("s3cret");

    let output = t.register("users-value", UNTAGGED_USER_SCHEMA, Some(ENCRYPT_PII_RULES));
    assert_success(&output);
    assert_stderr_contains(&output, "no field carries a tag");
}

#[test]
fn test_register_with_metadata_tags() {
    let t = Test::new("s3cret");
    let schema = t.write("user.avsc", UNTAGGED_USER_SCHEMA);
    let rules = t.write("rules.json", ENCRYPT_PII_RULES);
    let metadata = t.write("metadata.json", r#"{"tags": {"creditCardNumber": ["PII"]}}"#);

    t.cmd()
        .args([
            "register",
            "--subject",
            "users-value",
            "--schema",
            &schema,
            "--rules",
            &rules,
            "--metadata",
            &metadata,
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("no field carries a tag").not());
}

#[test]
fn test_register_rejects_invalid_schema() {
    let t = Test::new("s3cret");

    let output = t.register("users-value", r#"{"type": "record", "name": "X"}"#, None);
    assert_failure(&output);
    assert_stderr_contains(&output, "invalid schema");
    assert!(!t.dir.path().join("registry").join("registry.json").exists());
}

#[test]
fn test_register_rejects_bad_on_failure() {
    let t = Test::new("s3cret");
    let rules = ENCRYPT_PII_RULES.replace("ERROR,NONE", "ERROR,RETRY");

    let output = t.register("users-value", USER_SCHEMA, Some(&rules));
    assert_failure(&output);
    assert_stderr_contains(&output, "RETRY");
}

#[test]
fn test_register_missing_schema_file() {
    let t = Test::new("s3cret");

    t.cmd()
        .args(["register", "--subject", "users-value", "--schema", "nope.avsc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("io error"));
}
