//! Produce command.
//!
//! Serializes each record and prints the wire message as base64, one per
//! line. Stops at the first record that fails.

use std::fs;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value as Json;
use tracing::debug;

use crate::core::pipeline::{subject_name, Pipeline, SerdeKind};
use crate::error::{ConfigError, Result};

/// Serialize `records` for a topic or explicit subject.
pub fn execute(
    pipeline: &Pipeline,
    topic: Option<&str>,
    subject: Option<&str>,
    version: Option<u32>,
    records: &[String],
) -> Result<()> {
    let subject = match (subject, topic) {
        (Some(s), _) => s.to_string(),
        (None, Some(t)) => subject_name(t, SerdeKind::Value),
        (None, None) => {
            return Err(ConfigError::Invalid("--topic or --subject is required".into()).into())
        }
    };

    for (i, raw) in records.iter().enumerate() {
        let record = parse_record(raw)?;
        let message = match version {
            Some(v) => pipeline.serialize_pinned(&subject, v, &record)?,
            None => pipeline.serialize_value(&subject, &record)?,
        };
        debug!(record = i, bytes = message.len(), "produced message");
        println!("{}", STANDARD.encode(&message));
    }
    Ok(())
}

/// A record given inline as JSON or as `@path`.
fn parse_record(raw: &str) -> Result<Json> {
    let text = match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)?,
        None => raw.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_record_inline_and_file() {
        assert_eq!(parse_record(r#"{"a": 1}"#).unwrap()["a"], 1);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.json");
        fs::write(&path, r#"{"b": "x"}"#).unwrap();
        let record = parse_record(&format!("@{}", path.display())).unwrap();
        assert_eq!(record["b"], "x");

        assert!(parse_record("not json").is_err());
    }
}
