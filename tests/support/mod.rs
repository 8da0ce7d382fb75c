//! Test support utilities for fieldguard integration tests.
//!
//! Provides isolated CLI environments, instrumented KMS and registry
//! doubles, and shared fixtures.

#![allow(dead_code)]

pub mod assertions;
pub mod backends;
pub mod commands;
pub mod fixtures;
pub mod skip;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use backends::*;
#[allow(unused_imports)]
pub use fixtures::*;

use std::fs;

use tempfile::TempDir;

/// Test environment with an isolated working directory.
///
/// The directory holds a `fieldguard.toml` pointing the file registry into
/// the same directory. Child processes use `.current_dir()` so tests can
/// run in parallel.
pub struct Test {
    /// Temporary working directory
    pub dir: TempDir,
}

impl Test {
    /// Create an environment whose local KMS uses `secret`.
    pub fn new(secret: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let t = Self { dir };
        t.write_config(secret);
        t
    }

    /// Rewrite `fieldguard.toml` with another local KMS secret.
    pub fn write_config(&self, secret: &str) {
        let config = format!(
            "[registry]\npath = \"registry\"\n\n[retry]\nmax_retries = 0\n\n[kms.local]\nsecret = \"{}\"\n",
            secret
        );
        fs::write(self.dir.path().join("fieldguard.toml"), config).expect("failed to write config");
    }

    /// Write a file into the working directory and return its name.
    pub fn write(&self, name: &str, contents: &str) -> String {
        fs::write(self.dir.path().join(name), contents).expect("failed to write file");
        name.to_string()
    }
}
