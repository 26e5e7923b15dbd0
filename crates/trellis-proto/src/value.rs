//! Runtime value types for record fields.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::write::{Increment, JsonPatch};

/// A runtime value held in a key map or passed through a constraint.
///
/// This enum represents all values that can be assigned to a declared field,
/// stored in a row, or compared in a WHERE clause. The two marker variants
/// (`Increment`, `Patch`) never come back from storage; they only travel on
/// the write path, where the compiler renders them as column-referencing SQL
/// expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// UTC timestamp.
    Date(DateTime<Utc>),
    /// Arbitrary JSON payload.
    Json(serde_json::Value),
    /// A relation field value (foreign-key record).
    Pointer(Pointer),
    /// Numeric increment marker (write path only).
    Increment(Increment),
    /// JSON patch marker (write path only).
    Patch(JsonPatch),
}

/// How a pointer renders in the serialized record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    /// A plain foreign-key reference.
    Pointer,
    /// A relation reference carrying fetched attributes.
    Relation,
}

/// A foreign-key record value.
///
/// On the write path a pointer collapses to its bare identifier; on the read
/// path it is a nested object optionally carrying the attributes fetched
/// through a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    /// Rendering kind in the wire shape.
    #[serde(rename = "type")]
    pub kind: PointerKind,
    /// Name of the referenced class.
    pub class_name: String,
    /// Identifier of the referenced row, if known.
    pub id: Option<i64>,
    /// Attribute payload fetched through a join, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Pointer {
    /// Create a bare pointer to a row of the given class.
    pub fn new(class_name: impl Into<String>, id: i64) -> Self {
        Self {
            kind: PointerKind::Pointer,
            class_name: class_name.into(),
            id: Some(id),
            attributes: None,
        }
    }

    /// Create a relation pointer carrying fetched attributes.
    pub fn relation(
        class_name: impl Into<String>,
        id: i64,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            kind: PointerKind::Relation,
            class_name: class_name.into(),
            id: Some(id),
            attributes: Some(attributes),
        }
    }

    /// Whether this pointer references a persisted row of `class_name`.
    pub fn implements(&self, class_name: &str) -> bool {
        self.class_name == class_name && self.id.is_some()
    }
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a write-path marker rather than a literal.
    pub fn is_marker(&self) -> bool {
        matches!(self, Value::Increment(_) | Value::Patch(_))
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a date.
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Try to get as a pointer reference.
    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Value::Pointer(p) => Some(p),
            _ => None,
        }
    }

    /// Render this value into its wire (JSON) shape.
    ///
    /// Dates render as RFC 3339 strings, pointers as their tagged object,
    /// JSON payloads inline. Markers have no wire shape and render as null.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => {
                serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Json(j) => j.clone(),
            Value::Pointer(p) => serde_json::to_value(p).unwrap_or(serde_json::Value::Null),
            Value::Increment(_) | Value::Patch(_) => serde_json::Value::Null,
        }
    }

    /// Interpret a wire (JSON) value.
    ///
    /// Objects tagged with a pointer `type` become pointers; everything else
    /// maps structurally. Numbers become `Int` when integral.
    pub fn from_wire(wire: &serde_json::Value) -> Result<Self, Error> {
        match wire {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(Error::InvalidValue(format!("unrepresentable number {n}")))
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Object(map) if map.contains_key("type") => {
                let pointer: Pointer = serde_json::from_value(wire.clone())
                    .map_err(|e| Error::InvalidPointer(e.to_string()))?;
                Ok(Value::Pointer(pointer))
            }
            other => Ok(Value::Json(other.clone())),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Pointer> for Value {
    fn from(v: Pointer) -> Self {
        Value::Pointer(v)
    }
}
