//! Register command.

use std::fs;
use std::path::Path;

use crate::cli::output;
use crate::core::pipeline::Pipeline;
use crate::core::registry::{Metadata, SchemaInfo};
use crate::core::rules::RuleSet;
use crate::error::Result;

/// Register a schema and print its id on stdout.
pub fn execute(
    pipeline: &Pipeline,
    subject: &str,
    schema: &Path,
    rules: Option<&Path>,
    metadata: Option<&Path>,
) -> Result<()> {
    let mut info = SchemaInfo::avro(fs::read_to_string(schema)?);

    if let Some(path) = rules {
        let rule_set: RuleSet = serde_json::from_str(&fs::read_to_string(path)?)?;
        info = info.with_rule_set(rule_set);
    }
    if let Some(path) = metadata {
        let metadata: Metadata = serde_json::from_str(&fs::read_to_string(path)?)?;
        info = info.with_metadata(metadata);
    }

    // reject definitions the pipeline could not use before storing them
    let parsed = info.parse()?;

    let id = pipeline.register(subject, &info)?;
    let registered = pipeline.resolver().resolve(subject)?;

    output::success(&format!("registered {}", subject));
    output::kv("schema id", id);
    output::kv("version", registered.version.unwrap_or(1));
    output::kv("rules", info.rules().domain_rules.len());
    if !parsed.is_tagged() && !info.rules().is_empty() {
        output::warn("rules are attached but no field carries a tag");
    }

    println!("{}", id);
    Ok(())
}
