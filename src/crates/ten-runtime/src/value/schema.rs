//! Property schemas: per-message-kind shape declarations, value adjustment
//! (integer widening) and validation.
//!
//! Grounded on `schema_primitive.c`'s widening table: any `Int`/`Uint` is
//! widened up to the schema's declared width; `Int -> Float` widening is
//! allowed; narrowing and signedness changes are never performed implicitly.

use std::collections::HashMap;

use crate::error::{Result, TenError};
use crate::value::Value;

/// Declared primitive type for a single schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
    Buf,
    Array,
    Object,
}

impl PrimitiveKind {
    fn int_width(self) -> Option<u8> {
        match self {
            PrimitiveKind::Int8 | PrimitiveKind::Uint8 => Some(8),
            PrimitiveKind::Int16 | PrimitiveKind::Uint16 => Some(16),
            PrimitiveKind::Int32 | PrimitiveKind::Uint32 => Some(32),
            PrimitiveKind::Int64 | PrimitiveKind::Uint64 => Some(64),
            _ => None,
        }
    }

    fn is_unsigned(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Uint8 | PrimitiveKind::Uint16 | PrimitiveKind::Uint32 | PrimitiveKind::Uint64
        )
    }

    fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::Float32 | PrimitiveKind::Float64)
    }
}

/// Schema for a single message kind's property bag: one declared field per
/// top-level key. Nested object/array schemas are intentionally not modeled
/// here — the full schema language is an external collaborator; this is
/// the minimal in-repo shape `adjust`/`validate` need.
#[derive(Debug, Clone, Default)]
pub struct MsgSchema {
    pub fields: HashMap<String, PrimitiveKind>,
    /// Required field names; validation fails if any is absent.
    pub required: Vec<String>,
}

impl MsgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, kind: PrimitiveKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Widen `value`'s top-level fields in place to match declared kinds.
    /// Fields not present in the schema are left untouched.
    pub fn adjust(&self, value: &mut Value) -> Result<()> {
        let Some(map) = value.as_object_mut() else {
            return Ok(());
        };
        for (name, kind) in &self.fields {
            if let Some(v) = map.get_mut(name) {
                adjust_one(v, *kind)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        let map = value
            .as_object()
            .ok_or_else(|| TenError::invalid_argument("schema validation requires an object value"))?;

        for req in &self.required {
            if !map.contains_key(req) {
                return Err(TenError::invalid_argument(format!(
                    "missing required property '{req}'"
                )));
            }
        }

        for (name, kind) in &self.fields {
            if let Some(v) = map.get(name) {
                check_kind(name, v, *kind)?;
            }
        }
        Ok(())
    }
}

fn adjust_one(v: &mut Value, kind: PrimitiveKind) -> Result<()> {
    match (&*v, kind) {
        (Value::Int(i), k) if kind.int_width().is_some() => {
            if k.is_unsigned() {
                if *i >= 0 {
                    *v = Value::Uint(*i as u64);
                }
                // negative Int can't be widened into an unsigned slot; leave
                // as-is and let validate() reject it.
            }
            // signed -> signed widening is a no-op at the Rust level since we
            // store the widest signed repr already.
        }
        (Value::Uint(u), k) if kind.int_width().is_some() && !k.is_unsigned() => {
            if let Ok(i) = i64::try_from(*u) {
                *v = Value::Int(i);
            }
        }
        (Value::Int(i), k) if k.is_float() => {
            *v = Value::Float(*i as f64);
        }
        (Value::Uint(u), k) if k.is_float() => {
            *v = Value::Float(*u as f64);
        }
        _ => {}
    }
    Ok(())
}

fn check_kind(name: &str, v: &Value, kind: PrimitiveKind) -> Result<()> {
    let ok = match kind {
        PrimitiveKind::Bool => matches!(v, Value::Bool(_)),
        PrimitiveKind::Int8
        | PrimitiveKind::Int16
        | PrimitiveKind::Int32
        | PrimitiveKind::Int64 => matches!(v, Value::Int(_)),
        PrimitiveKind::Uint8
        | PrimitiveKind::Uint16
        | PrimitiveKind::Uint32
        | PrimitiveKind::Uint64 => matches!(v, Value::Uint(_)),
        PrimitiveKind::Float32 | PrimitiveKind::Float64 => matches!(v, Value::Float(_)),
        PrimitiveKind::String => matches!(v, Value::String(_)),
        PrimitiveKind::Buf => matches!(v, Value::Buf(_)),
        PrimitiveKind::Array => matches!(v, Value::Array(_)),
        PrimitiveKind::Object => matches!(v, Value::Object(_)),
    };
    if ok {
        Ok(())
    } else {
        Err(TenError::invalid_argument(format!(
            "property '{name}' does not match declared schema type {kind:?}"
        )))
    }
}

/// Per-message-kind schema registry. An `Extension` (or `App`) owns one.
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    by_msg_name: HashMap<String, MsgSchema>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, msg_name: impl Into<String>, schema: MsgSchema) {
        self.by_msg_name.insert(msg_name.into(), schema);
    }

    pub fn get(&self, msg_name: &str) -> Option<&MsgSchema> {
        self.by_msg_name.get(msg_name)
    }

    /// Adjust then validate `value` against `msg_name`'s schema, if any is
    /// registered. Messages with no registered schema pass through untouched.
    pub fn adjust_and_validate(&self, msg_name: &str, value: &mut Value) -> Result<()> {
        if let Some(schema) = self.by_msg_name.get(msg_name) {
            schema.adjust(value)?;
            schema.validate(value)?;
        }
        Ok(())
    }
}

/// Optional, feature-gated hook for a richer JSON-Schema validator. Not used
/// by `adjust_and_validate` directly; callers that want full JSON Schema
/// semantics on top of the lightweight `MsgSchema` can wire this in.
#[cfg(feature = "schema-validation")]
pub trait SchemaValidator: Send + Sync {
    fn validate_json(&self, value: &serde_json::Value) -> Result<()>;
}

#[cfg(feature = "schema-validation")]
pub struct JsonSchemaValidator {
    compiled: jsonschema::JSONSchema,
}

#[cfg(feature = "schema-validation")]
impl JsonSchemaValidator {
    pub fn compile(schema: &serde_json::Value) -> Result<Self> {
        let compiled = jsonschema::JSONSchema::compile(schema)
            .map_err(|e| TenError::invalid_argument(format!("invalid json schema: {e}")))?;
        Ok(Self { compiled })
    }
}

#[cfg(feature = "schema-validation")]
impl SchemaValidator for JsonSchemaValidator {
    fn validate_json(&self, value: &serde_json::Value) -> Result<()> {
        self.compiled
            .validate(value)
            .map_err(|errors| {
                let detail = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                TenError::invalid_argument(format!("schema validation failed: {detail}"))
            })
    }
}
