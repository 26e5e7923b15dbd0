//! Class definitions.
//!
//! One definition exists per declared class. It accumulates the declared
//! keys, timestamp fields, relations, triggers, and the hidden/guarded
//! lists, and enforces that a field name lives in at most one of those
//! families.

use crate::catalog::relation::RelationDefinition;
use crate::catalog::trigger::{Trigger, TriggerPhase};
use crate::error::Error;
use crate::keys::KeyManager;

/// Stable identity of a declared class.
///
/// Handed out by the registry at declaration time; lookups go through the
/// id, not the name, so classes with colliding names in different hierarchies
/// cannot shadow each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

/// The identifier column every class carries.
pub const IDENTIFIER_KEY: &str = "id";

/// Timestamp fields every class carries.
pub const TIMESTAMP_KEYS: [&str; 2] = ["created_at", "updated_at"];

/// Column backing soft deletion.
pub const SOFT_DELETE_KEY: &str = "deleted_at";

/// Per-class metadata: declared fields, timestamps, relations, triggers,
/// hidden and guarded fields.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    id: ClassId,
    name: String,
    source: String,
    keys: Vec<KeyManager>,
    timestamps: Vec<String>,
    relations: Vec<RelationDefinition>,
    triggers: Vec<Trigger>,
    hidden: Vec<String>,
    guarded: Vec<String>,
}

impl ClassDefinition {
    pub(crate) fn new(id: ClassId, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            source: source.into(),
            keys: Vec::new(),
            timestamps: TIMESTAMP_KEYS.iter().map(|k| k.to_string()).collect(),
            relations: Vec::new(),
            triggers: Vec::new(),
            hidden: Vec::new(),
            guarded: Vec::new(),
        }
    }

    /// Stable class identity.
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Declared class name, e.g. `"Post"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing table, e.g. `"post"`; doubles as the root query alias.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Declared scalar keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &KeyManager> {
        self.keys.iter()
    }

    /// Timestamp field names.
    pub fn timestamps(&self) -> &[String] {
        &self.timestamps
    }

    /// Declared relations in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &RelationDefinition> {
        self.relations.iter()
    }

    /// Registered triggers in registration order.
    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter()
    }

    /// Triggers of one phase, in registration order.
    pub fn triggers_for(&self, phase: TriggerPhase) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter().filter(move |t| t.phase == phase)
    }

    /// Hidden field names.
    pub fn hidden(&self) -> &[String] {
        &self.hidden
    }

    /// Guarded field names.
    pub fn guarded(&self) -> &[String] {
        &self.guarded
    }

    /// Look up a scalar key manager by name.
    pub fn key_manager(&self, name: &str) -> Option<&KeyManager> {
        self.keys.iter().find(|k| k.name() == name)
    }

    /// Look up a relation by declaring field name.
    pub fn relation(&self, field: &str) -> Option<&RelationDefinition> {
        self.relations.iter().find(|r| r.field == field)
    }

    /// Whether `name` is addressable on this class: the identifier, a
    /// declared key, a timestamp field, or a relation field.
    pub fn has_field(&self, name: &str) -> bool {
        name == IDENTIFIER_KEY
            || self.key_manager(name).is_some()
            || self.timestamps.iter().any(|t| t == name)
            || self.relation(name).is_some()
    }

    /// Whether `name` is hidden from non-elevated callers.
    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden.iter().any(|h| h == name)
    }

    /// Whether `name` is guarded against direct assignment.
    pub fn is_guarded(&self, name: &str) -> bool {
        self.guarded.iter().any(|g| g == name)
    }

    pub(crate) fn register_key(&mut self, key: KeyManager) -> Result<(), Error> {
        self.ensure_unregistered(key.name())?;
        self.keys.push(key);
        Ok(())
    }

    pub(crate) fn register_relation(&mut self, relation: RelationDefinition) -> Result<(), Error> {
        self.ensure_unregistered(&relation.field)?;
        self.relations.push(relation);
        Ok(())
    }

    pub(crate) fn register_trigger(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    pub(crate) fn mark_hidden(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.hidden.contains(&field) {
            self.hidden.push(field);
        }
    }

    pub(crate) fn mark_guarded(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.guarded.contains(&field) {
            self.guarded.push(field);
        }
    }

    // First registration wins; a second registration of the same field name
    // is a configuration error.
    fn ensure_unregistered(&self, name: &str) -> Result<(), Error> {
        if name == IDENTIFIER_KEY || name == SOFT_DELETE_KEY {
            return Err(Error::MissingConfiguration(format!(
                "field {name} is reserved on class {}",
                self.name
            )));
        }
        if self.key_manager(name).is_some()
            || self.timestamps.iter().any(|t| t == name)
            || self.relation(name).is_some()
        {
            return Err(Error::MissingConfiguration(format!(
                "field {name} is already registered on class {}",
                self.name
            )));
        }
        Ok(())
    }
}
