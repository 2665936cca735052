//! Tagged-sum property value model with dotted/bracketed path access.
//!
//! Values are the payload of a `Message`'s `properties` bag and of an
//! `Extension`'s own property store. The wire-agnostic interchange format is
//! JSON (`to_json`/`from_json`); any concrete wire codec is an external
//! collaborator this crate does not implement.

mod path;
pub mod schema;

pub use path::{parse_path, PathSegment};

use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, TenError};

/// A property value. `Ptr` models the original's opaque-pointer-plus-
/// destructor variant as an `Arc<dyn Any + Send + Sync>` — the destructor is
/// simply `Arc`'s drop glue.
#[derive(Clone)]
pub enum Value {
    Invalid,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Buf(Vec<u8>),
    Ptr(Arc<dyn std::any::Any + Send + Sync>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Invalid => write!(f, "Invalid"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Uint(u) => write!(f, "Uint({u})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Buf(b) => write!(f, "Buf(len={})", b.len()),
            Value::Ptr(_) => write!(f, "Ptr(..)"),
            Value::Array(a) => f.debug_list().entries(a).finish(),
            Value::Object(o) => f.debug_map().entries(o).finish(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Object(BTreeMap::new())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Invalid, Value::Invalid) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Buf(a), Value::Buf(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Uint(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Peek (borrow) the value at `path` without removing it.
    pub fn peek(&self, path: &str) -> Result<Option<&Value>> {
        let segs = parse_path(path)?;
        let mut cur = self;
        for seg in &segs {
            cur = match (cur, seg) {
                (Value::Object(m), PathSegment::Key(k)) => match m.get(k) {
                    Some(v) => v,
                    None => return Ok(None),
                },
                (Value::Array(a), PathSegment::Index(i)) => match a.get(*i) {
                    Some(v) => v,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            };
        }
        Ok(Some(cur))
    }

    pub fn get(&self, path: &str) -> Result<Value> {
        Ok(self.peek(path)?.cloned().unwrap_or(Value::Invalid))
    }

    /// Set the value at `path`, creating intermediate objects/arrays as
    /// needed. This is a copying set (`clone`s `val` in); use `move_set` to
    /// transfer ownership without an extra clone.
    pub fn set(&mut self, path: &str, val: Value) -> Result<()> {
        self.move_set(path, val)
    }

    /// Set the value at `path`, taking ownership of `val` (no clone of the
    /// incoming value, matching the original's "move-set" naming).
    pub fn move_set(&mut self, path: &str, val: Value) -> Result<()> {
        let segs = parse_path(path)?;
        if segs.is_empty() {
            *self = val;
            return Ok(());
        }
        set_recursive(self, &segs, val)
    }

    /// Deep-copy upsert: merge `other`'s object keys into `self` at `path`,
    /// recursing into nested objects rather than overwriting them wholesale.
    pub fn merge_with_clone(&mut self, path: &str, other: &Value) -> Result<()> {
        let existing = self.peek(path)?.cloned().unwrap_or_else(Value::object);
        let merged = merge_values(existing, other.clone());
        self.move_set(path, merged)
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Invalid => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Uint(u) => Number::from_f64(*u as f64)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Float(x) => Number::from_f64(*x).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Buf(b) => {
                use std::fmt::Write;
                let mut hex = String::with_capacity(b.len() * 2);
                for byte in b {
                    let _ = write!(hex, "{byte:02x}");
                }
                Json::String(hex)
            }
            Value::Ptr(_) => Json::Null,
            Value::Array(a) => Json::Array(a.iter().map(Value::to_json).collect()),
            Value::Object(o) => {
                let mut map = Map::new();
                for (k, v) in o {
                    map.insert(k.clone(), v.to_json());
                }
                Json::Object(map)
            }
        }
    }

    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Invalid,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::String(s.clone()),
            Json::Array(a) => Value::Array(a.iter().map(Value::from_json).collect()),
            Json::Object(o) => {
                let mut map = BTreeMap::new();
                for (k, v) in o {
                    map.insert(k.clone(), Value::from_json(v));
                }
                Value::Object(map)
            }
        }
    }
}

fn set_recursive(cur: &mut Value, segs: &[PathSegment], val: Value) -> Result<()> {
    let (head, rest) = segs.split_first().expect("non-empty path");

    match head {
        PathSegment::Key(k) => {
            if !matches!(cur, Value::Object(_)) {
                *cur = Value::object();
            }
            let map = cur.as_object_mut().unwrap();
            if rest.is_empty() {
                map.insert(k.clone(), val);
                Ok(())
            } else {
                let entry = map.entry(k.clone()).or_insert_with(|| match rest[0] {
                    PathSegment::Index(_) => Value::Array(Vec::new()),
                    PathSegment::Key(_) => Value::object(),
                });
                set_recursive(entry, rest, val)
            }
        }
        PathSegment::Index(i) => {
            if !matches!(cur, Value::Array(_)) {
                *cur = Value::Array(Vec::new());
            }
            let arr = match cur {
                Value::Array(a) => a,
                _ => unreachable!(),
            };
            while arr.len() <= *i {
                arr.push(Value::Invalid);
            }
            if rest.is_empty() {
                arr[*i] = val;
                Ok(())
            } else {
                set_recursive(&mut arr[*i], rest, val)
            }
        }
    }
}

fn merge_values(base: Value, incoming: Value) -> Value {
    match (base, incoming) {
        (Value::Object(mut a), Value::Object(b)) => {
            for (k, v) in b {
                let merged = match a.remove(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => v,
                };
                a.insert(k, merged);
            }
            Value::Object(a)
        }
        (_, incoming) => incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_path() {
        let mut v = Value::object();
        v.set("a.b[2].c", Value::Int(42)).unwrap();
        assert_eq!(v.get("a.b[2].c").unwrap(), Value::Int(42));
        assert_eq!(v.get("a.b[0]").unwrap(), Value::Invalid);
    }

    #[test]
    fn json_round_trip_semantically_equal() {
        let json = serde_json::json!({"a": 1, "b": [1,2,3], "c": {"d": "x"}});
        let v = Value::from_json(&json);
        assert_eq!(v.to_json(), json);
    }

    #[test]
    fn merge_with_clone_deep_merges_objects() {
        let mut v = Value::object();
        v.set("cfg.a", Value::Int(1)).unwrap();
        v.set("cfg.b", Value::Int(2)).unwrap();

        let mut incoming = Value::object();
        incoming.set("b", Value::Int(99)).unwrap();
        incoming.set("c", Value::Int(3)).unwrap();

        v.merge_with_clone("cfg", &incoming).unwrap();
        assert_eq!(v.get("cfg.a").unwrap(), Value::Int(1));
        assert_eq!(v.get("cfg.b").unwrap(), Value::Int(99));
        assert_eq!(v.get("cfg.c").unwrap(), Value::Int(3));
    }

    #[test]
    fn typed_setter_then_typed_getter_round_trips() {
        let mut v = Value::object();
        v.set("x", Value::Bool(true)).unwrap();
        assert_eq!(v.get("x").unwrap().as_bool(), Some(true));
    }
}
