//! Core library components.
//!
//! Everything the serialize/deserialize pipeline needs: key-management
//! backends, the data-key cache and envelope cipher, schemas and rules, the
//! registry interface with its caching resolver, and configuration.

pub mod cache;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod evaluator;
pub mod flight;
pub mod kms;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod rules;
pub mod schema;
pub mod wire;
