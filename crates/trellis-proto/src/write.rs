//! Write-path marker types.
//!
//! These markers stand in for a literal value in a key map when the caller
//! asks for a relative mutation: a numeric increment, or a patch applied to
//! a stored JSON document. The SQL compiler renders them as expressions over
//! the current column value rather than as literals.

use serde::{Deserialize, Serialize};

/// A numeric increment with optional clamping bounds.
///
/// Renders as `GREATEST(IFNULL(col, 0) + (amount), min)`, wrapped in
/// `LEAST(.., max)` when an upper bound is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Increment {
    /// Signed amount to add to the current value.
    pub amount: f64,
    /// Lower clamp applied after the addition.
    pub min: f64,
    /// Optional upper clamp applied after the addition.
    pub max: Option<f64>,
}

impl Increment {
    /// Increment by `amount`, clamped below at zero.
    pub fn by(amount: f64) -> Self {
        Self {
            amount,
            min: 0.0,
            max: None,
        }
    }

    /// Set the lower clamp.
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    /// Set the upper clamp.
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }
}

/// A patch against a stored JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsonPatch {
    /// Set the value at a JSON path, e.g. `$.settings.theme`.
    Set {
        /// JSON path of the member to set.
        path: String,
        /// Value to store at the path.
        value: serde_json::Value,
    },
    /// Append a value to the array at a JSON path.
    Append {
        /// JSON path of the array.
        path: String,
        /// Value to append.
        value: serde_json::Value,
    },
}

impl JsonPatch {
    /// Create a set patch.
    pub fn set(path: impl Into<String>, value: serde_json::Value) -> Self {
        JsonPatch::Set {
            path: path.into(),
            value,
        }
    }

    /// Create an append patch.
    pub fn append(path: impl Into<String>, value: serde_json::Value) -> Self {
        JsonPatch::Append {
            path: path.into(),
            value,
        }
    }

    /// The JSON path this patch addresses.
    pub fn path(&self) -> &str {
        match self {
            JsonPatch::Set { path, .. } | JsonPatch::Append { path, .. } => path,
        }
    }
}
