//! Structured document carried in every envelope.
//!
//! A `Meta` is a tree of named scalar/list values and named child nodes. A
//! child name may hold several nodes (a node list, e.g. repeated `state`
//! entries). Dotted paths such as `error.message` walk through the first node
//! of each intermediate name.

pub mod binary;
pub mod json;

use std::collections::BTreeMap;
use std::fmt;

/// Path separator for nested names.
pub const PATH_SEPARATOR: char = '.';

/// A typed scalar or list stored in a `Meta` node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// String view; numbers and booleans are rendered, lists are not.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => Some(self.to_string()),
            Value::Null | Value::List(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Str(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::Str(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Items of a list value; a scalar is a one-element list.
    pub fn items(&self) -> Vec<&Value> {
        match self {
            Value::List(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Named-value tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Meta {
    values: BTreeMap<String, Value>,
    nodes: BTreeMap<String, Vec<Meta>>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.nodes.is_empty()
    }

    /// Direct values of this node.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Direct child node lists of this node.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &[Meta])> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Value at a dotted path.
    pub fn get_value(&self, path: &str) -> Option<&Value> {
        let (parent, name) = split_last(path);
        let owner = match parent {
            Some(p) => self.node(p)?,
            None => self,
        };
        owner.values.get(name)
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get_value(path).and_then(Value::as_string)
    }

    pub fn get_int(&self, path: &str) -> Option<i64> {
        self.get_value(path).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_value(path).and_then(Value::as_bool)
    }

    pub fn has_value(&self, path: &str) -> bool {
        self.get_value(path).is_some()
    }

    /// First node at a dotted path.
    pub fn node(&self, path: &str) -> Option<&Meta> {
        path.split(PATH_SEPARATOR)
            .try_fold(self, |cur, name| cur.nodes.get(name).and_then(|list| list.first()))
    }

    /// Every node stored under the last segment of a dotted path.
    pub fn get_nodes(&self, path: &str) -> &[Meta] {
        let (parent, name) = split_last(path);
        let owner = match parent {
            Some(p) => self.node(p),
            None => Some(self),
        };
        owner
            .and_then(|m| m.nodes.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Set a value, creating intermediate nodes along the path.
    pub fn set_value(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
        let (parent, name) = split_last(path);
        let owner = match parent {
            Some(p) => self.node_mut_or_insert(p),
            None => self,
        };
        owner.values.insert(name.to_string(), value.into());
        self
    }

    /// Append a child node under `name` (repeated names form a node list).
    pub fn put_node(&mut self, name: &str, child: Meta) -> &mut Self {
        self.nodes.entry(name.to_string()).or_default().push(child);
        self
    }

    /// Consuming form of [`Meta::set_value`].
    pub fn with_value(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.set_value(path, value);
        self
    }

    /// Consuming form of [`Meta::put_node`].
    pub fn with_node(mut self, name: &str, child: Meta) -> Self {
        self.put_node(name, child);
        self
    }

    fn node_mut_or_insert(&mut self, path: &str) -> &mut Meta {
        path.split(PATH_SEPARATOR).fold(self, |cur, name| {
            let list = cur.nodes.entry(name.to_string()).or_default();
            if list.is_empty() {
                list.push(Meta::new());
            }
            // non-empty by the push above
            &mut list[0]
        })
    }
}

fn split_last(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once(PATH_SEPARATOR) {
        Some((parent, name)) => (Some(parent), name),
        None => (None, path),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dotted_paths_create_nodes() {
        let mut meta = Meta::new();
        meta.set_value("note.text", "cooling started")
            .set_value("type", "numass.notes");

        assert_eq!(meta.get_string("note.text").as_deref(), Some("cooling started"));
        assert_eq!(meta.node("note").map(|n| n.get_string("text")), Some(Some("cooling started".into())));
        assert_eq!(meta.get_string("type").as_deref(), Some("numass.notes"));
        assert!(meta.get_value("note.time").is_none());
    }

    #[test]
    fn repeated_nodes_form_a_list() {
        let meta = Meta::new()
            .with_node("state", Meta::new().with_value("name", "hv").with_value("value", 18600))
            .with_node("state", Meta::new().with_value("name", "vacuum").with_value("value", 1e-7));

        let states = meta.get_nodes("state");
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].get_int("value"), Some(18600));
        assert_eq!(states[1].get_value("value"), Some(&Value::Float(1e-7)));
        assert!(meta.get_nodes("missing").is_empty());
    }

    #[test]
    fn scalar_coercions() {
        let meta = Meta::new()
            .with_value("flag", "TRUE")
            .with_value("count", "42")
            .with_value("ratio", 2.0);
        assert_eq!(meta.get_bool("flag"), Some(true));
        assert_eq!(meta.get_int("count"), Some(42));
        assert_eq!(meta.get_int("ratio"), Some(2));
        assert_eq!(meta.get_string("ratio").as_deref(), Some("2"));
        assert_eq!(meta.get_bool("count"), None);
    }

    #[test]
    fn list_items() {
        let v = Value::from(vec!["a", "b"]);
        assert_eq!(v.items().len(), 2);
        assert_eq!(Value::from("a").items(), vec![&Value::Str("a".into())]);
        assert_eq!(v.to_string(), "[a, b]");
    }
}
