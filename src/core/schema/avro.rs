//! Avro binary encoding of value trees.

use std::collections::BTreeMap;

use super::{Schema, SchemaNode, Value};
use crate::core::constants::{MAX_NESTING_DEPTH, MAX_ZERO_WIDTH_ITEMS};
use crate::error::{Result, SchemaError};

/// Encode `value` as an Avro binary body.
///
/// # Errors
///
/// Returns `SchemaError::Encode` if the value does not fit the schema.
pub fn encode(schema: &Schema, value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(schema, schema.root(), value, &mut out)?;
    Ok(out)
}

/// Decode an Avro binary body.
///
/// # Errors
///
/// Returns `SchemaError::Decode` on truncated or invalid input, trailing
/// bytes after the root value, nesting deeper than `MAX_NESTING_DEPTH`, or
/// block counts the body cannot hold.
pub fn decode(schema: &Schema, body: &[u8]) -> Result<Value> {
    let mut reader = Reader::new(body);
    let value = reader.value(schema, schema.root())?;
    if reader.pos != body.len() {
        return Err(SchemaError::Decode(format!(
            "{} trailing bytes after value",
            body.len() - reader.pos
        ))
        .into());
    }
    Ok(value)
}

fn encode_err(node: &SchemaNode, value: &Value) -> crate::error::Error {
    SchemaError::Encode(format!("cannot write {:?} as {}", value, node.type_name())).into()
}

fn write_long(n: i64, out: &mut Vec<u8>) {
    let mut z = ((n << 1) ^ (n >> 63)) as u64;
    while z >= 0x80 {
        out.push((z as u8) | 0x80);
        z >>= 7;
    }
    out.push(z as u8);
}

fn write_bytes(b: &[u8], out: &mut Vec<u8>) {
    write_long(b.len() as i64, out);
    out.extend_from_slice(b);
}

fn write_value(
    schema: &Schema,
    node: &SchemaNode,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<()> {
    let node = schema.resolve(node)?;
    match (node, value) {
        (SchemaNode::Null, Value::Null) => {}
        (SchemaNode::Boolean, Value::Boolean(b)) => out.push(u8::from(*b)),
        (SchemaNode::Int, Value::Int(i)) => write_long(i64::from(*i), out),
        (SchemaNode::Long, Value::Long(l)) => write_long(*l, out),
        (SchemaNode::Float, Value::Float(f)) => out.extend_from_slice(&f.to_le_bytes()),
        (SchemaNode::Double, Value::Double(d)) => out.extend_from_slice(&d.to_le_bytes()),
        (SchemaNode::Bytes, Value::Bytes(b)) => write_bytes(b, out),
        (SchemaNode::String, Value::String(s)) => write_bytes(s.as_bytes(), out),
        (SchemaNode::Fixed { size, .. }, Value::Fixed(b)) if b.len() == *size => {
            out.extend_from_slice(b)
        }
        (SchemaNode::Enum { symbols, .. }, Value::Enum(i, _)) if (*i as usize) < symbols.len() => {
            write_long(i64::from(*i), out)
        }
        (SchemaNode::Array(items), Value::Array(elems)) => {
            if !elems.is_empty() {
                write_long(elems.len() as i64, out);
                for e in elems {
                    write_value(schema, items, e, out)?;
                }
            }
            write_long(0, out);
        }
        (SchemaNode::Map(values), Value::Map(entries)) => {
            if !entries.is_empty() {
                write_long(entries.len() as i64, out);
                for (k, v) in entries {
                    write_bytes(k.as_bytes(), out);
                    write_value(schema, values, v, out)?;
                }
            }
            write_long(0, out);
        }
        (SchemaNode::Union(branches), Value::Union(i, inner)) => {
            let branch = branches
                .get(*i as usize)
                .ok_or_else(|| SchemaError::Encode(format!("union branch {} out of range", i)))?;
            write_long(i64::from(*i), out);
            write_value(schema, branch, inner, out)?;
        }
        (SchemaNode::Record(record), Value::Record(fields)) => {
            if record.fields.len() != fields.len() {
                return Err(encode_err(node, value));
            }
            for (field, (name, v)) in record.fields.iter().zip(fields) {
                if &field.name != name {
                    return Err(SchemaError::Encode(format!(
                        "expected field '{}' in {}, found '{}'",
                        field.name, record.name, name
                    ))
                    .into());
                }
                write_value(schema, &field.schema, v, out)?;
            }
        }
        (node, value) => return Err(encode_err(node, value)),
    }
    Ok(())
}

/// Whether values of `node` encode to zero bytes.
fn is_zero_width(schema: &Schema, node: &SchemaNode, depth: usize) -> bool {
    if depth > MAX_NESTING_DEPTH {
        return false;
    }
    match schema.resolve(node) {
        Ok(SchemaNode::Null) => true,
        Ok(SchemaNode::Fixed { size, .. }) => *size == 0,
        Ok(SchemaNode::Record(record)) => record
            .fields
            .iter()
            .all(|f| is_zero_width(schema, &f.schema, depth + 1)),
        _ => false,
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
    zero_width_items: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
            zero_width_items: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                SchemaError::Decode(format!("unexpected end of body at offset {}", self.pos))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn long(&mut self) -> Result<i64> {
        let mut z: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.take(1)?[0];
            if shift >= 64 {
                return Err(SchemaError::Decode("varint overflow".into()).into());
            }
            z |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(((z >> 1) as i64) ^ -((z & 1) as i64))
    }

    fn len(&mut self) -> Result<usize> {
        let n = self.long()?;
        usize::try_from(n)
            .ok()
            .filter(|n| *n <= self.remaining())
            .ok_or_else(|| SchemaError::Decode(format!("invalid length {}", n)).into())
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let n = self.len()?;
        Ok(self.take(n)?.to_vec())
    }

    /// Item count of the next block; 0 ends the sequence.
    fn block_count(&mut self) -> Result<usize> {
        let count = self.long()?;
        if count < 0 {
            // negative count is followed by the block size in bytes
            self.long()?;
        }
        usize::try_from(count.unsigned_abs())
            .map_err(|_| SchemaError::Decode(format!("invalid block count {}", count)).into())
    }

    /// Item count of the next array block, bounded by what the body can hold.
    fn array_block(&mut self, schema: &Schema, items: &SchemaNode) -> Result<usize> {
        let count = self.block_count()?;
        if count == 0 {
            return Ok(0);
        }
        if is_zero_width(schema, items, 0) {
            self.zero_width_items = self.zero_width_items.saturating_add(count);
            if self.zero_width_items > MAX_ZERO_WIDTH_ITEMS {
                return Err(SchemaError::Decode(format!(
                    "more than {} zero-width items",
                    MAX_ZERO_WIDTH_ITEMS
                ))
                .into());
            }
        } else if count > self.remaining() {
            return Err(self.oversized_block(count));
        }
        Ok(count)
    }

    /// Entry count of the next map block. Every entry carries a key.
    fn map_block(&mut self) -> Result<usize> {
        let count = self.block_count()?;
        if count > self.remaining() {
            return Err(self.oversized_block(count));
        }
        Ok(count)
    }

    fn oversized_block(&self, count: usize) -> crate::error::Error {
        SchemaError::Decode(format!(
            "block of {} items exceeds the {} bytes left",
            count,
            self.remaining()
        ))
        .into()
    }

    fn value(&mut self, schema: &Schema, node: &SchemaNode) -> Result<Value> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(SchemaError::Decode(format!(
                "nesting deeper than {} at offset {}",
                MAX_NESTING_DEPTH, self.pos
            ))
            .into());
        }
        self.depth += 1;
        let value = self.nested_value(schema, node);
        self.depth -= 1;
        value
    }

    fn nested_value(&mut self, schema: &Schema, node: &SchemaNode) -> Result<Value> {
        let node = schema.resolve(node)?;
        Ok(match node {
            SchemaNode::Null => Value::Null,
            SchemaNode::Boolean => match self.take(1)?[0] {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                b => return Err(SchemaError::Decode(format!("invalid boolean {}", b)).into()),
            },
            SchemaNode::Int => {
                let n = self.long()?;
                Value::Int(i32::try_from(n).map_err(|_| {
                    SchemaError::Decode(format!("int out of range: {}", n))
                })?)
            }
            SchemaNode::Long => Value::Long(self.long()?),
            SchemaNode::Float => {
                let mut b = [0u8; 4];
                b.copy_from_slice(self.take(4)?);
                Value::Float(f32::from_le_bytes(b))
            }
            SchemaNode::Double => {
                let mut b = [0u8; 8];
                b.copy_from_slice(self.take(8)?);
                Value::Double(f64::from_le_bytes(b))
            }
            SchemaNode::Bytes => Value::Bytes(self.bytes()?),
            SchemaNode::String => Value::String(
                String::from_utf8(self.bytes()?)
                    .map_err(|_| SchemaError::Decode("string is not valid UTF-8".into()))?,
            ),
            SchemaNode::Fixed { size, .. } => Value::Fixed(self.take(*size)?.to_vec()),
            SchemaNode::Enum { name, symbols } => {
                let i = self.long()?;
                let symbol = usize::try_from(i)
                    .ok()
                    .and_then(|i| symbols.get(i))
                    .ok_or_else(|| SchemaError::Decode(format!("invalid {} index {}", name, i)))?;
                Value::Enum(i as u32, symbol.clone())
            }
            SchemaNode::Array(items) => {
                let mut elems = Vec::new();
                loop {
                    let count = self.array_block(schema, items)?;
                    if count == 0 {
                        break;
                    }
                    elems.reserve(count);
                    for _ in 0..count {
                        elems.push(self.value(schema, items)?);
                    }
                }
                Value::Array(elems)
            }
            SchemaNode::Map(values) => {
                let mut entries = BTreeMap::new();
                loop {
                    let count = self.map_block()?;
                    if count == 0 {
                        break;
                    }
                    for _ in 0..count {
                        let key = String::from_utf8(self.bytes()?)
                            .map_err(|_| SchemaError::Decode("map key is not valid UTF-8".into()))?;
                        entries.insert(key, self.value(schema, values)?);
                    }
                }
                Value::Map(entries)
            }
            SchemaNode::Union(branches) => {
                let i = self.long()?;
                let branch = usize::try_from(i)
                    .ok()
                    .and_then(|i| branches.get(i))
                    .ok_or_else(|| SchemaError::Decode(format!("invalid union index {}", i)))?;
                Value::Union(i as u32, Box::new(self.value(schema, branch)?))
            }
            SchemaNode::Record(record) => {
                let mut fields = Vec::with_capacity(record.fields.len());
                for field in &record.fields {
                    fields.push((field.name.clone(), self.value(schema, &field.schema)?));
                }
                Value::Record(fields)
            }
            SchemaNode::Ref(name) => {
                return Err(SchemaError::Decode(format!("unresolved type '{}'", name)).into())
            }
        })
    }
}
