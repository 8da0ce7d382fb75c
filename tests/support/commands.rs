//! Command helper methods for Test.

use super::Test;
use assert_cmd::Command;
use std::process::Output;

impl Test {
    /// Create a fieldguard command running in the test directory.
    ///
    /// `LOCAL_SECRET` and `FIELDGUARD_CONFIG` are cleared so only the
    /// test's `fieldguard.toml` is used.
    pub fn cmd(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd = Command::cargo_bin("fieldguard").expect("failed to find fieldguard binary");
        cmd.env_remove("LOCAL_SECRET");
        cmd.env_remove("FIELDGUARD_CONFIG");
        cmd.env_remove("FIELDGUARD_LOG");
        cmd.env("NO_COLOR", "1");
        cmd.current_dir(self.dir.path());
        cmd
    }

    /// Shortcut for `fieldguard register`.
    pub fn register(&self, subject: &str, schema: &str, rules: Option<&str>) -> Output {
        let schema_file = self.write(&format!("{}.avsc", subject), schema);
        let mut args = vec![
            "register".to_string(),
            "--subject".to_string(),
            subject.to_string(),
            "--schema".to_string(),
            schema_file,
        ];
        if let Some(rules) = rules {
            args.push("--rules".to_string());
            args.push(self.write(&format!("{}.rules.json", subject), rules));
        }
        self.cmd()
            .args(&args)
            .output()
            .expect("failed to run fieldguard register")
    }

    /// Shortcut for `fieldguard produce --topic`.
    pub fn produce(&self, topic: &str, records: &[&str]) -> Output {
        let mut args = vec!["produce".to_string(), "--topic".to_string(), topic.to_string()];
        for r in records {
            args.push("--record".to_string());
            args.push(r.to_string());
        }
        self.cmd()
            .args(&args)
            .output()
            .expect("failed to run fieldguard produce")
    }

    /// Shortcut for `fieldguard consume`.
    pub fn consume(&self, messages: &[String]) -> Output {
        self.cmd()
            .arg("consume")
            .args(messages)
            .output()
            .expect("failed to run fieldguard consume")
    }
}
