//! Rule Evaluator.
//!
//! Applies ENCRYPT rules to a decoded record tree. For each active rule, in
//! declaration order, every field whose tags intersect the rule's tags is
//! encrypted (write) or decrypted (read). A rule runs against a copy of the
//! tree; if it fails, its onFailure action either surfaces the error or
//! keeps the tree as it was before the rule, so a record never carries a
//! half-applied rule.
//!
//! Encryptable leaves are `string` and `bytes`, reached directly or through
//! arrays, maps and unions. String ciphertext is base64 encoded so the field
//! keeps its schema type. A null branch of a tagged optional field is left
//! alone.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, trace, warn};

use crate::core::cache::DataKey;
use crate::core::envelope::EnvelopeCipher;
use crate::core::kms::KeyRef;
use crate::core::rules::{Direction, FailureAction, Rule, RuleKind, RuleSet};
use crate::core::schema::{child_path, Schema, SchemaNode, Value};
use crate::error::{CipherError, Error, Result, RuleError};

/// Field label used when a rule fails before touching any field.
const RULE_LEVEL_FIELD: &str = "*";

/// Applies rule sets through an envelope cipher.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    cipher: Arc<EnvelopeCipher>,
}

impl RuleEvaluator {
    pub fn new(cipher: Arc<EnvelopeCipher>) -> Self {
        Self { cipher }
    }

    pub fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    /// Apply the rules of `rule_set` active in `direction` to `record`.
    ///
    /// `subject` is only used for error context.
    ///
    /// # Errors
    ///
    /// Returns `Error::RuleEvaluation` for the first rule that fails with an
    /// `ERROR` onFailure action.
    pub fn apply(
        &self,
        subject: &str,
        schema: &Schema,
        rule_set: &RuleSet,
        direction: Direction,
        mut record: Value,
    ) -> Result<Value> {
        for rule in rule_set.active(direction) {
            if rule.kind == RuleKind::Condition {
                debug!(rule = %rule.name, "skipping condition rule");
                continue;
            }

            let mut working = record.clone();
            match self.apply_rule(schema, rule, direction, &mut working) {
                Ok(transformed) => {
                    debug!(
                        subject,
                        rule = %rule.name,
                        %direction,
                        fields = transformed,
                        "applied rule"
                    );
                    record = working;
                }
                Err(failure) => match rule.on_failure.resolve() {
                    FailureAction::Error => {
                        return Err(Error::RuleEvaluation {
                            subject: subject.to_string(),
                            rule: rule.name.clone(),
                            field: failure.field,
                            source: Box::new(failure.source),
                        });
                    }
                    FailureAction::None => {
                        warn!(
                            subject,
                            rule = %rule.name,
                            field = %failure.field,
                            kind = %failure.source.kind(),
                            error = %failure.source,
                            "rule failed, onFailure NONE keeps record unchanged"
                        );
                    }
                },
            }
        }
        Ok(record)
    }

    fn apply_rule(
        &self,
        schema: &Schema,
        rule: &Rule,
        direction: Direction,
        record: &mut Value,
    ) -> std::result::Result<usize, Failure> {
        if !rule.is_encrypt() {
            return Err(Failure::rule_level(RuleError::UnsupportedType(rule.rule_type.clone())));
        }
        let key_ref = KeyRef::from_params(&rule.params).map_err(Failure::rule_level)?;

        let mut run = RuleRun {
            cipher: &self.cipher,
            schema,
            rule,
            key_ref,
            direction,
            dek: None,
            transformed: 0,
        };
        run.walk(schema.root(), record, "")?;
        Ok(run.transformed)
    }
}

struct Failure {
    field: String,
    source: Error,
}

impl Failure {
    fn rule_level(source: impl Into<Error>) -> Self {
        Self {
            field: RULE_LEVEL_FIELD.to_string(),
            source: source.into(),
        }
    }

    fn at(field: &str) -> impl FnOnce(Error) -> Self + '_ {
        move |source| Self {
            field: field.to_string(),
            source,
        }
    }
}

/// State of one rule applied to one record.
struct RuleRun<'a> {
    cipher: &'a EnvelopeCipher,
    schema: &'a Schema,
    rule: &'a Rule,
    key_ref: KeyRef,
    direction: Direction,
    /// Write-path DEK, resolved on the first matched field
    dek: Option<Arc<DataKey>>,
    transformed: usize,
}

impl RuleRun<'_> {
    fn walk(
        &mut self,
        node: &SchemaNode,
        value: &mut Value,
        path: &str,
    ) -> std::result::Result<(), Failure> {
        let schema = self.schema;
        let node = schema.resolve(node).map_err(Failure::at(path))?;
        match (node, value) {
            (SchemaNode::Record(record), Value::Record(fields)) => {
                for (field, (_, v)) in record.fields.iter().zip(fields.iter_mut()) {
                    let field_path = child_path(path, &field.name);
                    if self.rule.matches(&schema.field_tags(&field_path, field)) {
                        self.transform(&field.schema, v, &field_path)?;
                    } else {
                        self.walk(&field.schema, v, &field_path)?;
                    }
                }
            }
            (SchemaNode::Array(items), Value::Array(elems)) => {
                for e in elems {
                    self.walk(items, e, path)?;
                }
            }
            (SchemaNode::Map(values), Value::Map(entries)) => {
                for v in entries.values_mut() {
                    self.walk(values, v, path)?;
                }
            }
            (SchemaNode::Union(branches), Value::Union(i, inner)) => {
                if let Some(branch) = branches.get(*i as usize) {
                    self.walk(branch, inner, path)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn transform(
        &mut self,
        node: &SchemaNode,
        value: &mut Value,
        path: &str,
    ) -> std::result::Result<(), Failure> {
        let schema = self.schema;
        let node = schema.resolve(node).map_err(Failure::at(path))?;
        match (node, value) {
            (SchemaNode::String, Value::String(s)) => {
                *s = match self.direction {
                    Direction::Write => STANDARD.encode(self.seal(s.as_bytes(), path)?),
                    Direction::Read => {
                        let sealed = STANDARD.decode(s.as_bytes()).map_err(|e| Failure {
                            field: path.to_string(),
                            source: CipherError::MalformedValue(format!("not base64: {}", e))
                                .into(),
                        })?;
                        String::from_utf8(self.open(&sealed, path)?).map_err(|_| Failure {
                            field: path.to_string(),
                            source: CipherError::DecryptionFailed("plaintext is not UTF-8".into())
                                .into(),
                        })?
                    }
                };
            }
            (SchemaNode::Bytes, Value::Bytes(b)) => {
                *b = match self.direction {
                    Direction::Write => self.seal(b, path)?,
                    Direction::Read => self.open(b, path)?,
                };
            }
            (SchemaNode::Union(branches), Value::Union(i, inner)) => {
                if matches!(**inner, Value::Null) {
                    return Ok(());
                }
                if let Some(branch) = branches.get(*i as usize) {
                    self.transform(branch, inner, path)?;
                }
            }
            (SchemaNode::Array(items), Value::Array(elems)) => {
                for e in elems {
                    self.transform(items, e, path)?;
                }
            }
            (SchemaNode::Map(values), Value::Map(entries)) => {
                for v in entries.values_mut() {
                    self.transform(values, v, path)?;
                }
            }
            (node, _) => {
                return Err(Failure {
                    field: path.to_string(),
                    source: RuleError::UnsupportedField(node.type_name().to_string()).into(),
                });
            }
        }
        Ok(())
    }

    fn seal(&mut self, plaintext: &[u8], path: &str) -> std::result::Result<Vec<u8>, Failure> {
        let dek = match &self.dek {
            Some(dek) => Arc::clone(dek),
            None => {
                let dek = self.cipher.data_key(&self.key_ref).map_err(Failure::at(path))?;
                self.dek = Some(Arc::clone(&dek));
                dek
            }
        };
        let sealed = self.cipher.seal(&dek, plaintext).map_err(Failure::at(path))?;
        trace!(field = path, "encrypted field");
        self.transformed += 1;
        Ok(sealed)
    }

    fn open(&mut self, sealed: &[u8], path: &str) -> std::result::Result<Vec<u8>, Failure> {
        let plaintext = self.cipher.open(&self.key_ref, sealed).map_err(Failure::at(path))?;
        trace!(field = path, "decrypted field");
        self.transformed += 1;
        Ok(plaintext)
    }
}
