//! Serialized record shape.
//!
//! A persisted or wire-visible row renders as
//! `{ id, <declared fields in declaration order>, created_at, updated_at }`,
//! with relation fields as a bare identifier on write and a nested pointer
//! object on read.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::value::Value;

/// An ordered, wire-shaped record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SerializedRecord {
    entries: Vec<(String, serde_json::Value)>,
}

impl SerializedRecord {
    /// Start a record with its identifier.
    pub fn new(id: i64) -> Self {
        Self {
            entries: vec![("id".to_string(), serde_json::Value::from(id))],
        }
    }

    /// Append a field in declaration order.
    pub fn with_field(mut self, name: impl Into<String>, value: &Value) -> Self {
        self.entries.push((name.into(), value.to_wire()));
        self
    }

    /// Append the timestamp pair.
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        let render =
            |d: DateTime<Utc>| serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true));
        self.entries.push(("created_at".to_string(), render(created_at)));
        self.entries.push(("updated_at".to_string(), render(updated_at)));
        self
    }

    /// Look up a rendered field by name.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Iterate rendered fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Render into a JSON object, preserving field order.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.entries {
            map.insert(name.clone(), value.clone());
        }
        serde_json::Value::Object(map)
    }
}
