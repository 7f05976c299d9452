//! JSON rendering of `Meta`.
//!
//! Values map to JSON scalars and arrays of scalars; child nodes map to
//! objects, and node lists to arrays of objects.

use serde_json::{Map, Number};

use super::{Meta, Value};
use crate::error::{NumassError, Result};

pub fn encode(meta: &Meta) -> Result<Vec<u8>> {
    let doc = to_json(meta)?;
    serde_json::to_vec(&doc).map_err(|e| NumassError::MetaEncode(format!("json: {e}")))
}

pub fn decode(bytes: &[u8]) -> Result<Meta> {
    let doc: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| NumassError::MetaDecode(format!("invalid json meta: {e}")))?;
    match doc {
        serde_json::Value::Object(map) => from_object(map),
        _ => Err(NumassError::MetaDecode("json meta must be an object".into())),
    }
}

fn to_json(meta: &Meta) -> Result<serde_json::Value> {
    let mut map = Map::new();
    for (name, value) in meta.values() {
        map.insert(name.to_string(), value_to_json(value)?);
    }
    for (name, nodes) in meta.nodes() {
        // One object key cannot carry both a scalar and a child object.
        if map.contains_key(name) {
            return Err(NumassError::MetaEncode(format!(
                "json: '{name}' is both a value and a node"
            )));
        }
        let rendered = match nodes {
            [single] => to_json(single)?,
            many => serde_json::Value::Array(many.iter().map(to_json).collect::<Result<_>>()?),
        };
        map.insert(name.to_string(), rendered);
    }
    Ok(serde_json::Value::Object(map))
}

fn value_to_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => serde_json::Value::Bool(*v),
        Value::Int(v) => serde_json::Value::Number((*v).into()),
        Value::Float(v) => Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .ok_or_else(|| NumassError::MetaEncode(format!("non-finite float {v}")))?,
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect::<Result<_>>()?)
        }
    })
}

fn from_object(map: Map<String, serde_json::Value>) -> Result<Meta> {
    let mut meta = Meta::new();
    for (name, item) in map {
        match item {
            serde_json::Value::Object(child) => {
                meta.put_node(&name, from_object(child)?);
            }
            serde_json::Value::Array(items)
                if !items.is_empty() && items.iter().all(serde_json::Value::is_object) =>
            {
                for child in items {
                    if let serde_json::Value::Object(child) = child {
                        meta.put_node(&name, from_object(child)?);
                    }
                }
            }
            other => {
                meta.values.insert(name, json_to_value(other)?);
            }
        }
    }
    Ok(meta)
}

fn json_to_value(item: serde_json::Value) -> Result<Value> {
    Ok(match item {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(v) => Value::Bool(v),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(json_to_value).collect::<Result<_>>()?)
        }
        serde_json::Value::Object(_) => {
            return Err(NumassError::MetaDecode(
                "objects are not allowed inside value lists".into(),
            ))
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn nodes_and_lists_round_trip() {
        let meta = Meta::new()
            .with_value("type", "numass.state")
            .with_value("name", vec!["hv", "vacuum"])
            .with_value("ratio", 0.5)
            .with_node("state", Meta::new().with_value("name", "hv"))
            .with_node("state", Meta::new().with_value("name", "vacuum"))
            .with_value("error.message", "none");

        let bytes = encode(&meta).unwrap();
        assert_eq!(decode(&bytes).unwrap(), meta);
    }

    #[test]
    fn rejects_non_object_document() {
        let err = decode(b"[1,2]").unwrap_err();
        assert!(matches!(err, NumassError::MetaDecode(_)));
        let err = decode(b"{\"a\":").unwrap_err();
        assert!(matches!(err, NumassError::MetaDecode(_)));
    }

    #[test]
    fn value_and_node_under_one_name_rejected() {
        let meta = Meta::new()
            .with_value("note", "x")
            .with_value("note.text", "y");
        assert_eq!(meta.get_string("note").unwrap(), "x");
        assert!(matches!(encode(&meta), Err(NumassError::MetaEncode(_))));

        let bytes = crate::meta::binary::encode(&meta).unwrap();
        assert_eq!(crate::meta::binary::decode(&bytes).unwrap(), meta);
    }

    #[test]
    fn rejects_non_finite_floats() {
        let meta = Meta::new().with_value("x", f64::INFINITY);
        assert!(matches!(encode(&meta), Err(NumassError::MetaEncode(_))));
    }
}
