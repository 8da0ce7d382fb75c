//! Rules attached to schema versions.
//!
//! Rules use the registry's JSON shape:
//!
//! ```json
//! {
//!   "name": "encryptPII",
//!   "kind": "TRANSFORM",
//!   "mode": "WRITEREAD",
//!   "type": "ENCRYPT",
//!   "tags": ["PII"],
//!   "params": {"encrypt.kek.name": "kek1", "encrypt.kms.type": "local-kms", "encrypt.kms.key.id": "k"},
//!   "onFailure": "ERROR,NONE"
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::constants;
use crate::error::RuleError;

/// Rule category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleKind {
    #[default]
    Transform,
    Condition,
}

/// Pipeline direction a rule participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleMode {
    Write,
    Read,
    #[serde(rename = "WRITEREAD")]
    WriteRead,
}

/// Direction the pipeline is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Serializing (producer)
    Write,
    /// Deserializing (consumer)
    Read,
}

impl RuleMode {
    /// Whether a rule with this mode runs in `direction`.
    pub fn applies_to(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (Self::WriteRead, _) | (Self::Write, Direction::Write) | (Self::Read, Direction::Read)
        )
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => f.write_str("write"),
            Self::Read => f.write_str("read"),
        }
    }
}

/// What to do when a rule's transform fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Abort processing of the record with the underlying error
    Error,
    /// Keep the record as it was before the rule and continue
    None,
}

impl FromStr for FailureAction {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ERROR" => Ok(Self::Error),
            "NONE" => Ok(Self::None),
            other => Err(RuleError::InvalidOnFailure(other.to_string())),
        }
    }
}

impl fmt::Display for FailureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("ERROR"),
            Self::None => f.write_str("NONE"),
        }
    }
}

/// Ordered fallback list of failure actions, written `"ERROR,NONE"`.
///
/// Actions are consulted in order and the first one decides whether the
/// error is surfaced or swallowed. An empty list surfaces the error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OnFailure(Vec<FailureAction>);

impl OnFailure {
    pub fn new(actions: Vec<FailureAction>) -> Self {
        Self(actions)
    }

    pub fn actions(&self) -> &[FailureAction] {
        &self.0
    }

    /// The action that handles a failure.
    pub fn resolve(&self) -> FailureAction {
        self.0.first().copied().unwrap_or(FailureAction::Error)
    }
}

impl FromStr for OnFailure {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        s.split(',')
            .map(FailureAction::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl TryFrom<String> for OnFailure {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OnFailure> for String {
    fn from(value: OnFailure) -> Self {
        value.to_string()
    }
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join(","))
    }
}

/// A single domain rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub kind: RuleKind,
    pub mode: RuleMode,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// All parameters, recognized or not, are preserved
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_default_on_failure")]
    pub on_failure: OnFailure,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

fn is_default_on_failure(on_failure: &OnFailure) -> bool {
    on_failure.actions().is_empty()
}

impl Rule {
    /// A WRITEREAD ENCRYPT rule for `tags` using the given key parameters.
    pub fn encrypt(
        name: impl Into<String>,
        tags: &[&str],
        kek_name: &str,
        kms_type: &str,
        kms_key_id: &str,
    ) -> Self {
        let params = [
            (constants::PARAM_KEK_NAME, kek_name),
            (constants::PARAM_KMS_TYPE, kms_type),
            (constants::PARAM_KMS_KEY_ID, kms_key_id),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            name: name.into(),
            kind: RuleKind::Transform,
            mode: RuleMode::WriteRead,
            rule_type: constants::ENCRYPT_RULE_TYPE.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            params,
            on_failure: OnFailure::default(),
            disabled: false,
        }
    }

    pub fn with_mode(mut self, mode: RuleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Whether any of `field_tags` is one of this rule's tags.
    pub fn matches<'a>(&self, field_tags: impl IntoIterator<Item = &'a String>) -> bool {
        field_tags.into_iter().any(|t| self.tags.contains(t))
    }

    pub fn is_encrypt(&self) -> bool {
        self.rule_type == constants::ENCRYPT_RULE_TYPE
    }
}

/// Ordered rules attached to a schema version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default)]
    pub domain_rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(domain_rules: Vec<Rule>) -> Self {
        Self { domain_rules }
    }

    pub fn is_empty(&self) -> bool {
        self.domain_rules.is_empty()
    }

    /// Rules that run in `direction`, in declaration order.
    pub fn active(&self, direction: Direction) -> impl Iterator<Item = &Rule> {
        self.domain_rules
            .iter()
            .filter(move |r| !r.disabled && r.mode.applies_to(direction))
    }
}
