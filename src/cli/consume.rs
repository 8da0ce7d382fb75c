//! Consume command.
//!
//! Deserializes base64 wire messages and prints each record as one JSON
//! line. A message that fails is reported on stderr and the loop moves on.

use std::io::{self, BufRead};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, warn};

use crate::cli::output;
use crate::core::pipeline::Pipeline;
use crate::error::{Error, Result, WireError};

/// Consume `messages`, or stdin lines when none are given.
pub fn execute(pipeline: &Pipeline, topic: Option<&str>, messages: &[String]) -> Result<()> {
    let messages: Vec<String> = if messages.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect()
    } else {
        messages.to_vec()
    };

    let mut failed = 0;
    for (i, encoded) in messages.iter().enumerate() {
        match consume_one(pipeline, encoded.trim()) {
            Ok(record) => println!("{}", record),
            Err(e) => {
                failed += 1;
                warn!(
                    topic = topic.unwrap_or("-"),
                    message = i,
                    kind = %e.kind(),
                    "message failed"
                );
                output::error(&format!("message {}: {}", i, e));
            }
        }
    }

    debug!(total = messages.len(), failed, "consume finished");
    if failed > 0 {
        output::warn(&format!("{} of {} messages failed", failed, messages.len()));
    }
    Ok(())
}

fn consume_one(pipeline: &Pipeline, encoded: &str) -> Result<serde_json::Value> {
    let message = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Wire(WireError::Encoding(format!("not base64: {}", e))))?;
    pipeline.deserialize_value(&message)
}
