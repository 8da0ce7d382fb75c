//! Command-line interface.

pub mod completions;
pub mod consume;
pub mod output;
pub mod produce;
pub mod register;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::core::config::Config;
use crate::core::kms::KmsRegistry;
use crate::core::pipeline::Pipeline;
use crate::core::registry::FileRegistry;
use crate::error::Result;

/// Fieldguard - schema-bound field-level encryption for pub/sub records.
#[derive(Parser)]
#[command(
    name = "fieldguard",
    about = "Schema-bound field-level encryption for pub/sub records",
    version
)]
pub struct Cli {
    /// Path to fieldguard.toml
    #[arg(long, global = true, env = "FIELDGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output formats.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Command {
    /// Register a schema, with optional rules and metadata, under a subject
    Register {
        /// Subject name (e.g. users-value)
        #[arg(long)]
        subject: String,
        /// Avro schema definition (JSON)
        #[arg(long)]
        schema: PathBuf,
        /// Rule set JSON ({"domainRules": [...]})
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Metadata JSON ({"tags": {"field.path": ["PII"]}})
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Serialize records and print base64 wire messages, one per line
    Produce {
        /// Topic; the subject is <topic>-value
        #[arg(long, conflicts_with = "subject", required_unless_present = "subject")]
        topic: Option<String>,
        /// Explicit subject
        #[arg(long)]
        subject: Option<String>,
        /// Serialize against this subject version instead of the latest
        #[arg(long)]
        version: Option<u32>,
        /// Record as JSON, or @FILE to read it from a file (repeatable)
        #[arg(long = "record", required = true)]
        records: Vec<String>,
    },

    /// Deserialize base64 wire messages and print one JSON record per line
    Consume {
        /// Topic the messages were read from (informational)
        #[arg(long)]
        topic: Option<String>,
        /// Base64 messages; read from stdin, one per line, when omitted
        messages: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Execute a command.
pub fn execute(command: Command, config: Option<&Path>) -> Result<()> {
    use Command::*;

    match command {
        Register {
            subject,
            schema,
            rules,
            metadata,
        } => register::execute(
            &pipeline(config)?,
            &subject,
            &schema,
            rules.as_deref(),
            metadata.as_deref(),
        ),
        Produce {
            topic,
            subject,
            version,
            records,
        } => produce::execute(
            &pipeline(config)?,
            topic.as_deref(),
            subject.as_deref(),
            version,
            &records,
        ),
        Consume { topic, messages } => {
            consume::execute(&pipeline(config)?, topic.as_deref(), &messages)
        }
        Completions { shell } => completions::execute(shell),
    }
}

/// Load configuration and build the pipeline over the file registry.
fn pipeline(config_path: Option<&Path>) -> Result<Pipeline> {
    let config = Config::discover(config_path)?;

    let kms = KmsRegistry::global();
    kms.register_from_config(&config)?;
    debug!(
        registry = %config.registry.path.display(),
        kms_types = ?kms.types(),
        "pipeline ready"
    );

    let registry = Arc::new(FileRegistry::new(config.registry.path.clone()));
    Ok(Pipeline::from_config(&config, registry, kms))
}
