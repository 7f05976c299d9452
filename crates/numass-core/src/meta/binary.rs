//! Compact binary rendering of `Meta` (panic-free).
//!
//! Layout (all integers big-endian):
//! ```text
//! node  := u16 value_count { name value }* u16 group_count { name u16 node_count node* }*
//! name  := u16 len, utf-8 bytes
//! value := u8 tag, payload
//!          0 null | 1 bool(u8) | 2 int(i64) | 3 float(f64)
//!          4 string(u32 len, utf-8) | 5 list(u32 count, value*)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Meta, Value};
use crate::error::{NumassError, Result};

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_LIST: u8 = 5;

/// Nesting bound for nodes and lists.
const MAX_DEPTH: usize = 64;

pub fn encode(meta: &Meta) -> Result<Vec<u8>> {
    let mut out = BytesMut::new();
    put_node(&mut out, meta, 0)?;
    Ok(out.to_vec())
}

pub fn decode(bytes: &[u8]) -> Result<Meta> {
    let mut buf = Bytes::copy_from_slice(bytes);
    let meta = get_node(&mut buf, 0)?;
    if buf.has_remaining() {
        return Err(NumassError::MetaDecode(format!(
            "{} trailing bytes after binary meta",
            buf.remaining()
        )));
    }
    Ok(meta)
}

fn count_u16(n: usize, what: &str) -> Result<u16> {
    u16::try_from(n).map_err(|_| NumassError::MetaEncode(format!("too many {what}: {n}")))
}

fn count_u32(n: usize, what: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| NumassError::MetaEncode(format!("{what} too long: {n}")))
}

fn put_name(out: &mut BytesMut, name: &str) -> Result<()> {
    out.put_u16(count_u16(name.len(), "name bytes")?);
    out.put_slice(name.as_bytes());
    Ok(())
}

fn put_node(out: &mut BytesMut, meta: &Meta, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(NumassError::MetaEncode("meta nested too deep".into()));
    }
    out.put_u16(count_u16(meta.values.len(), "values")?);
    for (name, value) in meta.values() {
        put_name(out, name)?;
        put_value(out, value, depth)?;
    }
    out.put_u16(count_u16(meta.nodes.len(), "node groups")?);
    for (name, nodes) in meta.nodes() {
        put_name(out, name)?;
        out.put_u16(count_u16(nodes.len(), "nodes")?);
        for node in nodes {
            put_node(out, node, depth + 1)?;
        }
    }
    Ok(())
}

fn put_value(out: &mut BytesMut, value: &Value, depth: usize) -> Result<()> {
    match value {
        Value::Null => out.put_u8(TAG_NULL),
        Value::Bool(v) => {
            out.put_u8(TAG_BOOL);
            out.put_u8(u8::from(*v));
        }
        Value::Int(v) => {
            out.put_u8(TAG_INT);
            out.put_i64(*v);
        }
        Value::Float(v) => {
            out.put_u8(TAG_FLOAT);
            out.put_f64(*v);
        }
        Value::Str(s) => {
            out.put_u8(TAG_STRING);
            out.put_u32(count_u32(s.len(), "string")?);
            out.put_slice(s.as_bytes());
        }
        Value::List(items) => {
            if depth > MAX_DEPTH {
                return Err(NumassError::MetaEncode("value list nested too deep".into()));
            }
            out.put_u8(TAG_LIST);
            out.put_u32(count_u32(items.len(), "list")?);
            for item in items {
                put_value(out, item, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(NumassError::MetaDecode(format!(
            "truncated binary meta while reading {what}"
        )));
    }
    Ok(())
}

fn get_utf8(buf: &mut Bytes, len: usize, what: &str) -> Result<String> {
    need(buf, len, what)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| NumassError::MetaDecode(format!("{what} is not valid utf-8")))
}

fn get_name(buf: &mut Bytes) -> Result<String> {
    need(buf, 2, "name length")?;
    let len = usize::from(buf.get_u16());
    get_utf8(buf, len, "name")
}

fn get_node(buf: &mut Bytes, depth: usize) -> Result<Meta> {
    if depth > MAX_DEPTH {
        return Err(NumassError::MetaDecode("meta nested too deep".into()));
    }
    let mut meta = Meta::new();

    need(buf, 2, "value count")?;
    for _ in 0..buf.get_u16() {
        let name = get_name(buf)?;
        let value = get_value(buf, depth)?;
        meta.values.insert(name, value);
    }

    need(buf, 2, "group count")?;
    for _ in 0..buf.get_u16() {
        let name = get_name(buf)?;
        need(buf, 2, "node count")?;
        for _ in 0..buf.get_u16() {
            let child = get_node(buf, depth + 1)?;
            meta.put_node(&name, child);
        }
    }
    Ok(meta)
}

fn get_value(buf: &mut Bytes, depth: usize) -> Result<Value> {
    need(buf, 1, "value tag")?;
    match buf.get_u8() {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => {
            need(buf, 1, "bool")?;
            Ok(Value::Bool(buf.get_u8() != 0))
        }
        TAG_INT => {
            need(buf, 8, "int")?;
            Ok(Value::Int(buf.get_i64()))
        }
        TAG_FLOAT => {
            need(buf, 8, "float")?;
            Ok(Value::Float(buf.get_f64()))
        }
        TAG_STRING => {
            need(buf, 4, "string length")?;
            let len = buf.get_u32() as usize;
            Ok(Value::Str(get_utf8(buf, len, "string")?))
        }
        TAG_LIST => {
            if depth > MAX_DEPTH {
                return Err(NumassError::MetaDecode("value list nested too deep".into()));
            }
            need(buf, 4, "list length")?;
            let count = buf.get_u32() as usize;
            // every item takes at least its tag byte
            need(buf, count, "list items")?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(get_value(buf, depth + 1)?);
            }
            Ok(Value::List(items))
        }
        other => Err(NumassError::MetaDecode(format!("unknown value tag {other}"))),
    }
}
