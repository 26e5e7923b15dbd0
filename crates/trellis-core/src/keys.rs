//! Typed key managers.
//!
//! Every declared field owns a `KeyManager`: a named setter/getter pair that
//! validates an external value into its storage representation and back.
//! Both directions are total functions over a single value; no call observes
//! partial state.

use chrono::{DateTime, Utc};
use trellis_proto::{Increment, Pointer, Value};

use crate::error::Error;

/// Numeric interpretation of a number key.
///
/// The mode is always explicit at registration; nothing is inferred from the
/// value being assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericMode {
    /// Any finite number.
    Plain,
    /// Integral values only.
    Integer,
    /// Fixed-decimal float, rounded to the given number of decimal places.
    Fixed(u8),
}

/// The declared kind of a key, together with its validation options.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySpec {
    /// UTF-8 string with optional length bounds (in characters).
    String {
        /// Minimum accepted length.
        min_length: Option<usize>,
        /// Maximum accepted length.
        max_length: Option<usize>,
    },
    /// Numeric value with an explicit mode and optional range bounds.
    Number {
        /// Numeric interpretation.
        mode: NumericMode,
        /// Minimum accepted value (inclusive).
        min: Option<f64>,
        /// Maximum accepted value (inclusive).
        max: Option<f64>,
    },
    /// Boolean value.
    Boolean,
    /// UTC timestamp; string inputs are parsed as RFC 3339.
    Date,
    /// JSON document, stored as serialized text.
    Json,
    /// Foreign-key field referencing another class.
    Relation {
        /// Name of the referenced class.
        class_name: String,
    },
}

/// A named setter/getter pair for one declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyManager {
    name: String,
    spec: KeySpec,
}

impl KeyManager {
    /// Create a string key without length bounds.
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: KeySpec::String {
                min_length: None,
                max_length: None,
            },
        }
    }

    /// Create a string key with length bounds.
    pub fn string_bounded(
        name: impl Into<String>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            spec: KeySpec::String {
                min_length,
                max_length,
            },
        }
    }

    /// Create a number key with an explicit mode.
    pub fn number(name: impl Into<String>, mode: NumericMode) -> Self {
        Self {
            name: name.into(),
            spec: KeySpec::Number {
                mode,
                min: None,
                max: None,
            },
        }
    }

    /// Create a number key with an explicit mode and range bounds.
    pub fn number_bounded(
        name: impl Into<String>,
        mode: NumericMode,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            spec: KeySpec::Number { mode, min, max },
        }
    }

    /// Create a boolean key.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: KeySpec::Boolean,
        }
    }

    /// Create a date key.
    pub fn date(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: KeySpec::Date,
        }
    }

    /// Create a JSON key.
    pub fn json(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: KeySpec::Json,
        }
    }

    /// Create a relation key referencing `class_name`.
    pub fn relation(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: KeySpec::Relation {
                class_name: class_name.into(),
            },
        }
    }

    /// Field name this manager is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind and options.
    pub fn spec(&self) -> &KeySpec {
        &self.spec
    }

    /// Whether this is a relation key.
    pub fn is_relation(&self) -> bool {
        matches!(self.spec, KeySpec::Relation { .. })
    }

    /// Map an external value to its storage representation.
    ///
    /// Fails with `InvalidObjectKey` when the value does not satisfy the
    /// key's validation rules. Null is accepted for every kind (unset).
    pub fn set(&self, value: Value) -> Result<Value, Error> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match &self.spec {
            KeySpec::String {
                min_length,
                max_length,
            } => self.set_string(value, *min_length, *max_length),
            KeySpec::Number { mode, min, max } => self.set_number(value, *mode, *min, *max),
            KeySpec::Boolean => match value {
                Value::Bool(_) => Ok(value),
                other => Err(self.bad_value("boolean", &other)),
            },
            KeySpec::Date => self.set_date(value),
            KeySpec::Json => self.set_json(value),
            KeySpec::Relation { class_name } => self.set_relation(value, class_name),
        }
    }

    /// Map a storage representation back to its external value.
    ///
    /// Structural inverse of [`KeyManager::set`]; for JSON keys this fails
    /// with `InvalidObjectKey` when the stored text does not parse.
    pub fn get(&self, stored: Value) -> Result<Value, Error> {
        if stored.is_null() {
            return Ok(Value::Null);
        }
        match &self.spec {
            KeySpec::String { .. } | KeySpec::Number { .. } => Ok(stored),
            KeySpec::Boolean => match stored {
                Value::Bool(_) => Ok(stored),
                // Drivers commonly surface booleans as 0/1 integers.
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                other => Err(self.bad_value("boolean", &other)),
            },
            KeySpec::Date => self.set_date(stored),
            KeySpec::Json => match stored {
                Value::String(text) => {
                    let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                        Error::InvalidObjectKey(format!(
                            "stored content of {} is not valid JSON: {e}",
                            self.name
                        ))
                    })?;
                    Ok(Value::Json(parsed))
                }
                Value::Json(_) => Ok(stored),
                other => Err(self.bad_value("json", &other)),
            },
            KeySpec::Relation { class_name } => match stored {
                Value::Int(id) => Ok(Value::Pointer(Pointer::new(class_name.clone(), id))),
                Value::Pointer(_) => Ok(stored),
                other => Err(self.bad_value("relation", &other)),
            },
        }
    }

    fn set_string(
        &self,
        value: Value,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Result<Value, Error> {
        let s = match value {
            Value::String(s) => s,
            other => return Err(self.bad_value("string", &other)),
        };
        let len = s.chars().count();
        if let Some(min) = min_length {
            if len < min {
                return Err(Error::InvalidObjectKey(format!(
                    "{} must be at least {min} characters, got {len}",
                    self.name
                )));
            }
        }
        if let Some(max) = max_length {
            if len > max {
                return Err(Error::InvalidObjectKey(format!(
                    "{} must be at most {max} characters, got {len}",
                    self.name
                )));
            }
        }
        Ok(Value::String(s))
    }

    fn set_number(
        &self,
        value: Value,
        mode: NumericMode,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Value, Error> {
        // An increment descriptor passes through with the field's bounds
        // folded into its clamps.
        if let Value::Increment(inc) = &value {
            let merged = Increment {
                amount: inc.amount,
                min: min.unwrap_or(inc.min),
                max: inc.max.or(max),
            };
            return Ok(Value::Increment(merged));
        }

        let numeric = match &value {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            other => return Err(self.bad_value("number", other)),
        };
        if !numeric.is_finite() {
            return Err(Error::InvalidObjectKey(format!(
                "{} must be a finite number",
                self.name
            )));
        }
        if let Some(min) = min {
            if numeric < min {
                return Err(Error::InvalidObjectKey(format!(
                    "{} must be >= {min}, got {numeric}",
                    self.name
                )));
            }
        }
        if let Some(max) = max {
            if numeric > max {
                return Err(Error::InvalidObjectKey(format!(
                    "{} must be <= {max}, got {numeric}",
                    self.name
                )));
            }
        }
        match mode {
            NumericMode::Plain => Ok(match value {
                Value::Int(i) => Value::Int(i),
                _ => Value::Float(numeric),
            }),
            NumericMode::Integer => match value {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
                _ => Err(Error::InvalidObjectKey(format!(
                    "{} must be an integer, got {numeric}",
                    self.name
                ))),
            },
            NumericMode::Fixed(scale) => {
                let factor = 10f64.powi(i32::from(scale));
                Ok(Value::Float((numeric * factor).round() / factor))
            }
        }
    }

    fn set_date(&self, value: Value) -> Result<Value, Error> {
        match value {
            Value::Date(_) => Ok(value),
            Value::String(text) => {
                let parsed = DateTime::parse_from_rfc3339(&text).map_err(|e| {
                    Error::InvalidObjectKey(format!("{} is not a valid date: {e}", self.name))
                })?;
                Ok(Value::Date(parsed.with_timezone(&Utc)))
            }
            other => Err(self.bad_value("date", &other)),
        }
    }

    fn set_json(&self, value: Value) -> Result<Value, Error> {
        match value {
            // Patch descriptors pass through for the compiler.
            Value::Patch(_) => Ok(value),
            Value::Json(json) => {
                let text = serde_json::to_string(&json).map_err(|e| {
                    Error::InvalidObjectKey(format!("{} cannot be serialized: {e}", self.name))
                })?;
                Ok(Value::String(text))
            }
            other => Err(self.bad_value("json", &other)),
        }
    }

    fn set_relation(&self, value: Value, class_name: &str) -> Result<Value, Error> {
        match value {
            Value::Pointer(ref pointer) => match pointer.id {
                Some(id) if pointer.implements(class_name) => Ok(Value::Int(id)),
                _ => Err(Error::InvalidObjectKey(format!(
                    "{} expects a saved {class_name} pointer",
                    self.name
                ))),
            },
            // A bare identifier is the write-side shape of a pointer.
            Value::Int(id) => Ok(Value::Int(id)),
            other => Err(self.bad_value("relation", &other)),
        }
    }

    fn bad_value(&self, expected: &str, got: &Value) -> Error {
        Error::InvalidObjectKey(format!("{} expects a {expected}, got {got:?}", self.name))
    }
}
