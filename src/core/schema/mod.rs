//! Record schemas.
//!
//! Schemas are Avro JSON definitions. Besides the structure used by the body
//! codec, a schema carries field tags: the `confluent:tags` annotation on a
//! record field, merged with path tags supplied in the registry metadata.
//!
//! Field paths are record-field names joined by `.` starting below the root
//! record, e.g. `address.street`. Arrays, maps and unions do not add path
//! segments.

pub mod avro;
pub mod value;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::Value as Json;

use crate::core::constants::FIELD_TAGS_PROPERTY;
use crate::error::{Result, SchemaError};

pub use value::Value;

/// A node of the schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Record(RecordSchema),
    Enum { name: String, symbols: Vec<String> },
    Fixed { name: String, size: usize },
    Array(Box<SchemaNode>),
    Map(Box<SchemaNode>),
    Union(Vec<SchemaNode>),
    /// Reference to a named type by full name
    Ref(String),
}

impl SchemaNode {
    /// Avro type name, used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bytes => "bytes",
            Self::String => "string",
            Self::Record(r) => &r.name,
            Self::Enum { name, .. } | Self::Fixed { name, .. } => name,
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Union(_) => "union",
            Self::Ref(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    /// Full name including namespace
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: SchemaNode,
    /// Tags from the field's `confluent:tags` annotation
    pub tags: BTreeSet<String>,
    pub default: Option<Json>,
}

/// A parsed schema with its named types and path tags.
#[derive(Debug, Clone)]
pub struct Schema {
    root: SchemaNode,
    named: HashMap<String, SchemaNode>,
    path_tags: BTreeMap<String, BTreeSet<String>>,
}

impl Schema {
    /// Parse an Avro JSON schema definition.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Parse` for invalid JSON, unknown types,
    /// duplicate or undefined names.
    pub fn parse(definition: &str) -> Result<Self> {
        let json: Json = serde_json::from_str(definition)
            .map_err(|e| SchemaError::Parse(format!("not valid JSON: {}", e)))?;

        let mut parser = Parser::default();
        let root = parser.node(&json, None)?;

        Ok(Self {
            root,
            named: parser.named,
            path_tags: BTreeMap::new(),
        })
    }

    /// Attach path tags from registry metadata.
    pub fn with_path_tags(mut self, tags: BTreeMap<String, BTreeSet<String>>) -> Self {
        self.path_tags = tags;
        self
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Follow a named-type reference.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Parse` if the name is not defined.
    pub fn resolve<'a>(&'a self, node: &'a SchemaNode) -> Result<&'a SchemaNode> {
        match node {
            SchemaNode::Ref(name) => self
                .named
                .get(name)
                .ok_or_else(|| SchemaError::Parse(format!("undefined type '{}'", name)).into()),
            other => Ok(other),
        }
    }

    /// Tags of `field` at `path`: its annotation merged with metadata tags.
    pub fn field_tags(&self, path: &str, field: &Field) -> BTreeSet<String> {
        let mut tags = field.tags.clone();
        if let Some(extra) = self.path_tags.get(path) {
            tags.extend(extra.iter().cloned());
        }
        tags
    }

    /// Whether any field carries a tag.
    pub fn is_tagged(&self) -> bool {
        !self.path_tags.is_empty()
            || self
                .named
                .values()
                .chain(std::iter::once(&self.root))
                .any(|n| match n {
                    SchemaNode::Record(r) => r.fields.iter().any(|f| !f.tags.is_empty()),
                    _ => false,
                })
    }

    /// Convert a JSON document into a value tree.
    pub fn value_from_json(&self, json: &Json) -> Result<Value> {
        value::from_json(self, &self.root, json, "")
    }

    /// Convert a value tree into a JSON document.
    pub fn value_to_json(&self, value: &Value) -> Json {
        value::to_json(value)
    }

    /// Binary-encode a value tree.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        avro::encode(self, value)
    }

    /// Binary-decode a body into a value tree.
    pub fn decode(&self, body: &[u8]) -> Result<Value> {
        avro::decode(self, body)
    }
}

/// Join a parent path and a field name.
pub fn child_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

#[derive(Default)]
struct Parser {
    named: HashMap<String, SchemaNode>,
    declared: HashSet<String>,
}

impl Parser {
    fn node(&mut self, json: &Json, namespace: Option<&str>) -> Result<SchemaNode> {
        match json {
            Json::String(name) => self.by_name(name, namespace),
            Json::Array(branches) => {
                let nodes = branches
                    .iter()
                    .map(|b| self.node(b, namespace))
                    .collect::<Result<Vec<_>>>()?;
                if nodes.iter().any(|n| matches!(n, SchemaNode::Union(_))) {
                    return Err(SchemaError::Parse(
                        "unions may not directly contain unions".into(),
                    )
                    .into());
                }
                Ok(SchemaNode::Union(nodes))
            }
            Json::Object(obj) => {
                let kind = obj
                    .get("type")
                    .ok_or_else(|| SchemaError::Parse("schema object without 'type'".into()))?;
                match kind.as_str() {
                    Some("record") | Some("error") => self.record(obj, namespace),
                    Some("enum") => self.enumeration(obj, namespace),
                    Some("fixed") => self.fixed(obj, namespace),
                    Some("array") => {
                        let items = obj
                            .get("items")
                            .ok_or_else(|| SchemaError::Parse("array without 'items'".into()))?;
                        Ok(SchemaNode::Array(Box::new(self.node(items, namespace)?)))
                    }
                    Some("map") => {
                        let values = obj
                            .get("values")
                            .ok_or_else(|| SchemaError::Parse("map without 'values'".into()))?;
                        Ok(SchemaNode::Map(Box::new(self.node(values, namespace)?)))
                    }
                    // primitive with attributes, e.g. logicalType
                    _ => self.node(kind, namespace),
                }
            }
            other => {
                Err(SchemaError::Parse(format!("unexpected schema element: {}", other)).into())
            }
        }
    }

    fn by_name(&self, name: &str, namespace: Option<&str>) -> Result<SchemaNode> {
        let primitive = match name {
            "null" => Some(SchemaNode::Null),
            "boolean" => Some(SchemaNode::Boolean),
            "int" => Some(SchemaNode::Int),
            "long" => Some(SchemaNode::Long),
            "float" => Some(SchemaNode::Float),
            "double" => Some(SchemaNode::Double),
            "bytes" => Some(SchemaNode::Bytes),
            "string" => Some(SchemaNode::String),
            _ => None,
        };
        if let Some(p) = primitive {
            return Ok(p);
        }

        let qualified = full_name(name, namespace);
        if self.declared.contains(&qualified) {
            return Ok(SchemaNode::Ref(qualified));
        }
        if self.declared.contains(name) {
            return Ok(SchemaNode::Ref(name.to_string()));
        }
        Err(SchemaError::Parse(format!("unknown type '{}'", name)).into())
    }

    fn declare(
        &mut self,
        obj: &serde_json::Map<String, Json>,
        namespace: Option<&str>,
    ) -> Result<(String, Option<String>)> {
        let name = obj
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| SchemaError::Parse("named type without 'name'".into()))?;
        let own_ns = obj.get("namespace").and_then(Json::as_str).or(namespace);
        let full = full_name(name, own_ns);
        if !self.declared.insert(full.clone()) {
            return Err(SchemaError::Parse(format!("duplicate type '{}'", full)).into());
        }
        let ns = full.rsplit_once('.').map(|(ns, _)| ns.to_string());
        Ok((full, ns))
    }

    fn record(
        &mut self,
        obj: &serde_json::Map<String, Json>,
        namespace: Option<&str>,
    ) -> Result<SchemaNode> {
        let (name, ns) = self.declare(obj, namespace)?;
        let fields_json = obj
            .get("fields")
            .and_then(Json::as_array)
            .ok_or_else(|| SchemaError::Parse(format!("record '{}' without 'fields'", name)))?;

        let mut fields = Vec::with_capacity(fields_json.len());
        let mut seen = HashSet::new();
        for f in fields_json {
            let field_name = f
                .get("name")
                .and_then(Json::as_str)
                .ok_or_else(|| SchemaError::Parse(format!("field without name in '{}'", name)))?;
            if !seen.insert(field_name) {
                return Err(SchemaError::Parse(format!(
                    "duplicate field '{}' in '{}'",
                    field_name, name
                ))
                .into());
            }
            let field_type = f
                .get("type")
                .ok_or_else(|| SchemaError::Parse(format!("field '{}' without type", field_name)))?;
            let tags = match f.get(FIELD_TAGS_PROPERTY) {
                None => BTreeSet::new(),
                Some(Json::Array(items)) => items
                    .iter()
                    .map(|t| {
                        t.as_str().map(str::to_string).ok_or_else(|| {
                            SchemaError::Parse(format!("non-string tag on field '{}'", field_name))
                        })
                    })
                    .collect::<std::result::Result<_, _>>()?,
                Some(_) => {
                    return Err(SchemaError::Parse(format!(
                        "'{}' on field '{}' must be an array",
                        FIELD_TAGS_PROPERTY, field_name
                    ))
                    .into())
                }
            };

            fields.push(Field {
                name: field_name.to_string(),
                schema: self.node(field_type, ns.as_deref())?,
                tags,
                default: f.get("default").cloned(),
            });
        }

        let node = SchemaNode::Record(RecordSchema { name: name.clone(), fields });
        self.named.insert(name, node.clone());
        Ok(node)
    }

    fn enumeration(
        &mut self,
        obj: &serde_json::Map<String, Json>,
        namespace: Option<&str>,
    ) -> Result<SchemaNode> {
        let (name, _) = self.declare(obj, namespace)?;
        let symbols = obj
            .get("symbols")
            .and_then(Json::as_array)
            .ok_or_else(|| SchemaError::Parse(format!("enum '{}' without 'symbols'", name)))?
            .iter()
            .map(|s| {
                s.as_str().map(str::to_string).ok_or_else(|| {
                    SchemaError::Parse(format!("non-string symbol in enum '{}'", name))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let node = SchemaNode::Enum { name: name.clone(), symbols };
        self.named.insert(name, node.clone());
        Ok(node)
    }

    fn fixed(
        &mut self,
        obj: &serde_json::Map<String, Json>,
        namespace: Option<&str>,
    ) -> Result<SchemaNode> {
        let (name, _) = self.declare(obj, namespace)?;
        let size = obj
            .get("size")
            .and_then(Json::as_u64)
            .ok_or_else(|| SchemaError::Parse(format!("fixed '{}' without 'size'", name)))?;

        let node = SchemaNode::Fixed {
            name: name.clone(),
            size: size as usize,
        };
        self.named.insert(name, node.clone());
        Ok(node)
    }
}

fn full_name(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !name.contains('.') && !ns.is_empty() => format!("{}.{}", ns, name),
        _ => name.to_string(),
    }
}
