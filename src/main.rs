//! Fieldguard - schema-bound field-level encryption for pub/sub records.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fieldguard::cli::output;
use fieldguard::cli::{execute, Cli, LogFormat};
use fieldguard::error::ErrorKind;

fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber with env-filter support
    let filter = EnvFilter::try_from_env("FIELDGUARD_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("fieldguard=debug")
        } else {
            EnvFilter::new("fieldguard=warn")
        }
    });

    // Logs go to stderr; stdout carries produced messages and records.
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    if let Err(e) = execute(cli.command, cli.config.as_deref()) {
        // Format error with suggestion if available
        let suggestion = match e.root_kind() {
            ErrorKind::KeyAccessDenied => {
                Some("check [kms] in fieldguard.toml or set LOCAL_SECRET")
            }
            ErrorKind::SchemaNotFound => {
                Some("run: fieldguard register --subject <subject> --schema <file>")
            }
            ErrorKind::RegistryUnavailable | ErrorKind::BackendUnavailable => {
                Some("transient failure; retry later or raise [retry] max_retries")
            }
            ErrorKind::Config => Some("check fieldguard.toml or pass --config"),
            _ => None,
        };

        output::error(&e.to_string());
        if let Some(hint) = suggestion {
            output::hint(hint);
        }
        std::process::exit(1);
    }
}
