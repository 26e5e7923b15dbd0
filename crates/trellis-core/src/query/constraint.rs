//! Constraint map: field name → ordered (operator, value) pairs.

use trellis_proto::Value;

use crate::error::Error;
use crate::query::options::QueryOptions;

/// Comparison operators supported by the query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `key = value`
    Equal,
    /// `key <> value`
    NotEqual,
    /// `key > value`
    GreaterThan,
    /// `key >= value`
    GreaterThanOrEqual,
    /// `key < value`
    LessThan,
    /// `key <= value`
    LessThanOrEqual,
    /// `key IS [NOT] NULL`, switched by a boolean value
    Exists,
    /// `key IN (values)`
    ContainedIn,
    /// `key NOT IN (values)`
    NotContainedIn,
    /// `key IS NULL OR key IN (values)`
    ContainedInOrNull,
    /// `key LIKE 'value%'`
    StartsWith,
    /// `key LIKE '%value'`
    EndsWith,
    /// `key LIKE '%value%'`
    Contains,
    /// OR-joined prefix matches
    StartsWithEither,
    /// OR-joined suffix matches
    EndsWithEither,
    /// OR-joined substring matches
    ContainsEither,
    /// AND-joined prefix matches
    StartsWithAll,
    /// AND-joined suffix matches
    EndsWithAll,
    /// AND-joined substring matches
    ContainsAll,
    /// `key IN (subquery)`
    FoundIn,
    /// OR-joined subquery memberships
    FoundInEither,
    /// AND-joined subquery memberships
    FoundInAll,
    /// `key NOT IN (subquery)`
    NotFoundIn,
    /// OR-joined subquery non-memberships
    NotFoundInEither,
    /// AND-joined subquery non-memberships
    NotFoundInAll,
}

/// The value side of one constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintValue {
    /// A single literal.
    Value(Value),
    /// An ordered list of literals.
    Values(Vec<Value>),
    /// A compiled-on-demand subquery.
    Subquery(Box<QueryOptions>),
    /// An ordered list of subqueries (either/all variants).
    Subqueries(Vec<QueryOptions>),
}

/// All constraints attached to one field, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyConstraints {
    key: String,
    constraints: Vec<(Operator, ConstraintValue)>,
}

impl KeyConstraints {
    /// Create an empty constraint set for a field.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            constraints: Vec::new(),
        }
    }

    /// The field name this set is attached to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append a constraint.
    pub fn push(&mut self, operator: Operator, value: ConstraintValue) {
        self.constraints.push((operator, value));
    }

    /// Iterate constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(Operator, ConstraintValue)> {
        self.constraints.iter()
    }

    /// Number of constraints on this field.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// Mapping from field name to its constraint set, in insertion order.
///
/// Insertion order is load-bearing: the compiler walks this map front to
/// back, so two identical maps always render identical SQL.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstraintMap {
    entries: Vec<KeyConstraints>,
}

impl ConstraintMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constraint for `key`, creating its set on first use.
    pub fn add(&mut self, key: impl Into<String>, operator: Operator, value: ConstraintValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.push(operator, value),
            None => {
                let mut entry = KeyConstraints::new(key);
                entry.push(operator, value);
                self.entries.push(entry);
            }
        }
    }

    /// Get the constraint set for a field.
    pub fn get(&self, key: &str) -> Option<&KeyConstraints> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Rename a field's constraint set in place.
    ///
    /// Used to qualify bare field names with a table alias during
    /// compilation. Renaming a missing key is a configuration error, and a
    /// rename never merges two existing sets.
    pub fn change_key(&mut self, from: &str, to: impl Into<String>) -> Result<(), Error> {
        let to = to.into();
        if from == to {
            return Ok(());
        }
        if self.entries.iter().any(|e| e.key == to) {
            return Err(Error::MissingConfiguration(format!(
                "cannot rename constraint key {from:?} to {to:?}: target already exists"
            )));
        }
        match self.entries.iter_mut().find(|e| e.key == from) {
            Some(entry) => {
                entry.key = to;
                Ok(())
            }
            None => Err(Error::MissingConfiguration(format!(
                "cannot rename missing constraint key {from:?}"
            ))),
        }
    }

    /// Iterate constraint sets in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyConstraints> {
        self.entries.iter()
    }

    /// Number of constrained fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no field is constrained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
