//! Decoded field tree.
//!
//! Values are always checked against a schema node on the way in. JSON uses
//! the plain shape serde produces for Rust types: unions are written as the
//! bare branch value, bytes and fixed as arrays of numbers.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as Json};

use super::{child_path, Schema, SchemaNode};
use crate::error::{Result, SchemaError};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    /// Field values in schema order
    Record(Vec<(String, Value)>),
    Enum(u32, String),
    Fixed(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Branch index and value
    Union(u32, Box<Value>),
}

impl Value {
    /// Field of a record value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

fn mismatch(path: &str, expected: &str) -> crate::error::Error {
    SchemaError::TypeMismatch {
        path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
        expected: expected.to_string(),
    }
    .into()
}

/// Convert `json` into a value of `node`.
pub(crate) fn from_json(
    schema: &Schema,
    node: &SchemaNode,
    json: &Json,
    path: &str,
) -> Result<Value> {
    let node = schema.resolve(node)?;
    match (node, json) {
        (SchemaNode::Null, Json::Null) => Ok(Value::Null),
        (SchemaNode::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
        (SchemaNode::Int, Json::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Int)
            .ok_or_else(|| mismatch(path, "int")),
        (SchemaNode::Long, Json::Number(n)) => {
            n.as_i64().map(Value::Long).ok_or_else(|| mismatch(path, "long"))
        }
        (SchemaNode::Float, Json::Number(n)) => n
            .as_f64()
            .map(|v| Value::Float(v as f32))
            .ok_or_else(|| mismatch(path, "float")),
        (SchemaNode::Double, Json::Number(n)) => {
            n.as_f64().map(Value::Double).ok_or_else(|| mismatch(path, "double"))
        }
        (SchemaNode::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (SchemaNode::Bytes, json) => bytes_from_json(json, path, "bytes").map(Value::Bytes),
        (SchemaNode::Fixed { size, name }, json) => {
            let bytes = bytes_from_json(json, path, name)?;
            if bytes.len() != *size {
                return Err(mismatch(path, &format!("{} ({} bytes)", name, size)));
            }
            Ok(Value::Fixed(bytes))
        }
        (SchemaNode::Enum { name, symbols }, Json::String(s)) => symbols
            .iter()
            .position(|sym| sym == s)
            .map(|i| Value::Enum(i as u32, s.clone()))
            .ok_or_else(|| mismatch(path, &format!("symbol of {}", name))),
        (SchemaNode::Array(items), Json::Array(elems)) => elems
            .iter()
            .map(|e| from_json(schema, items, e, path))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (SchemaNode::Map(values), Json::Object(obj)) => obj
            .iter()
            .map(|(k, v)| Ok((k.clone(), from_json(schema, values, v, path)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Map),
        (SchemaNode::Union(branches), json) => {
            for (i, branch) in branches.iter().enumerate() {
                if let Ok(v) = from_json(schema, branch, json, path) {
                    return Ok(Value::Union(i as u32, Box::new(v)));
                }
            }
            Err(mismatch(path, "one of the union branches"))
        }
        (SchemaNode::Record(record), Json::Object(obj)) => {
            if let Some(unknown) = obj
                .keys()
                .find(|k| !record.fields.iter().any(|f| &f.name == *k))
            {
                return Err(SchemaError::UnknownField(child_path(path, unknown)).into());
            }

            let mut fields = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let field_path = child_path(path, &field.name);
                let value = match obj.get(&field.name).or(field.default.as_ref()) {
                    Some(v) => from_json(schema, &field.schema, v, &field_path)?,
                    None => from_json(schema, &field.schema, &Json::Null, &field_path)
                        .map_err(|_| mismatch(&field_path, "value for required field"))?,
                };
                fields.push((field.name.clone(), value));
            }
            Ok(Value::Record(fields))
        }
        (node, _) => Err(mismatch(path, node.type_name())),
    }
}

fn bytes_from_json(json: &Json, path: &str, expected: &str) -> Result<Vec<u8>> {
    match json {
        Json::Array(items) => items
            .iter()
            .map(|i| {
                i.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| mismatch(path, expected))
            })
            .collect(),
        Json::String(s) => Ok(s.as_bytes().to_vec()),
        _ => Err(mismatch(path, expected)),
    }
}

/// Convert a value into JSON.
pub(crate) fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Long(l) => Json::from(*l),
        Value::Float(f) => Number::from_f64(f64::from(*f)).map_or(Json::Null, Json::Number),
        Value::Double(d) => Number::from_f64(*d).map_or(Json::Null, Json::Number),
        Value::Bytes(b) | Value::Fixed(b) => {
            Json::Array(b.iter().map(|x| Json::from(*x)).collect())
        }
        Value::String(s) | Value::Enum(_, s) => Json::String(s.clone()),
        Value::Record(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Union(_, inner) => to_json(inner),
    }
}
