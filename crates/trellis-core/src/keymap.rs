//! Ordered field-name → value store for one record.
//!
//! A `KeyMap` is both the mutable field bag of a live instance and the
//! row-shaped payload coming back from storage. Entries keep insertion
//! order, which is what makes compilation deterministic downstream.

use trellis_proto::Value;

use crate::error::Error;

/// An ordered, optionally-frozen string-keyed value store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyMap {
    entries: Vec<(String, Value)>,
    frozen: bool,
}

impl KeyMap {
    /// Create an empty key map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a key map from ordered entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            frozen: false,
        }
    }

    /// Set a field value, replacing in place or appending.
    ///
    /// Fails with `ForbiddenOperation` once the map is frozen.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<(), Error> {
        if self.frozen {
            return Err(Error::ForbiddenOperation(
                "cannot set a key on a frozen key map".to_string(),
            ));
        }
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Remove a field, returning its value if present.
    ///
    /// Fails with `ForbiddenOperation` once the map is frozen.
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, Error> {
        if self.frozen {
            return Err(Error::ForbiddenOperation(
                "cannot remove a key from a frozen key map".to_string(),
            ));
        }
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(idx) => Ok(Some(self.entries.remove(idx).1)),
            None => Ok(None),
        }
    }

    /// Get a field value by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether a field is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Freeze the map; all later `set`/`remove` calls fail.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the map is frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, Value)> for KeyMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self::from_entries(iter)
    }
}
