//! Relation definitions between classes.
//!
//! A `RelationDefinition` is the lazy descriptor recorded at declaration
//! time; it resolves on demand into a concrete `Relation` carrying the
//! actual source key and the secondary flag. A relation is *secondary* when
//! its source key is reached through another relation of the same class
//! instead of living on the owning row.

use crate::catalog::definition::ClassDefinition;
use crate::catalog::registry::ClassRegistry;
use crate::error::Error;

/// Marker naming the owning class on the source side of a relation.
pub const OWNER_MARKER: &str = "*";

/// Lazy descriptor of a foreign-key edge, recorded at declaration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDefinition {
    /// Field name declaring the relation; doubles as the default join alias.
    pub field: String,
    /// Name of the referenced (parent) class.
    pub target_class: String,
    /// Source-side class part: the owner marker, or the sibling relation the
    /// key is reached through.
    pub source_class: String,
    /// Source-side key column.
    pub source_key: String,
    /// Parent-side alias used in the join condition.
    pub parent_class: String,
    /// Parent-side key column.
    pub parent_key: String,
}

impl RelationDefinition {
    /// Create a relation with inferred defaults:
    /// `source = "*.<field>_id"`, `parent = "<field>.id"`.
    pub fn new(field: impl Into<String>, target_class: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            source_key: format!("{field}_id"),
            parent_class: field.clone(),
            parent_key: "id".to_string(),
            source_class: OWNER_MARKER.to_string(),
            target_class: target_class.into(),
            field,
        }
    }

    /// Override the source side with a `"class.key"` path.
    pub fn with_from(mut self, from: &str) -> Result<Self, Error> {
        let (class, key) = split_key_path(from)?;
        self.source_class = class;
        self.source_key = key;
        Ok(self)
    }

    /// Override the parent side with a `"class.key"` path.
    pub fn with_to(mut self, to: &str) -> Result<Self, Error> {
        let (class, key) = split_key_path(to)?;
        self.parent_class = class;
        self.parent_key = key;
        Ok(self)
    }

    /// Whether the source key lives directly on the owning row.
    pub fn is_primary(&self) -> bool {
        self.source_class == OWNER_MARKER
    }

    /// Resolve into a concrete relation against the owning class definition.
    ///
    /// A secondary relation requires its parent relation (registered under
    /// the source-class name in the same definition) to exist; absence is a
    /// configuration error, not a runtime-data error. The target class must
    /// be declared so the join knows its table.
    pub fn resolve(
        &self,
        owner: &ClassDefinition,
        registry: &ClassRegistry,
    ) -> Result<Relation, Error> {
        let secondary = !self.is_primary();
        if secondary && owner.relation(&self.source_class).is_none() {
            return Err(Error::ForbiddenOperation(format!(
                "secondary relation {}.{} requires relation {} to be registered first",
                owner.name(),
                self.field,
                self.source_class
            )));
        }
        let target = registry.definition_by_name(&self.target_class)?;
        Ok(Relation {
            field: self.field.clone(),
            target_class: self.target_class.clone(),
            target_source: target.source().to_string(),
            source_class: self.source_class.clone(),
            source_key: self.source_key.clone(),
            parent_class: self.parent_class.clone(),
            parent_key: self.parent_key.clone(),
            secondary,
        })
    }
}

/// A resolved foreign-key edge, ready for join rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Declaring field name.
    pub field: String,
    /// Name of the referenced class.
    pub target_class: String,
    /// Table of the referenced class.
    pub target_source: String,
    /// Source-side class part (owner marker or parent relation name).
    pub source_class: String,
    /// Source-side key column.
    pub source_key: String,
    /// Parent-side alias.
    pub parent_class: String,
    /// Parent-side key column.
    pub parent_key: String,
    /// Whether the source key is reached through another relation.
    pub secondary: bool,
}

impl Relation {
    /// The source side of the join condition.
    ///
    /// Primary relations qualify the key with the owner's alias; secondary
    /// relations qualify it with their parent relation's alias, since the
    /// key lives on the joined row rather than the owning one.
    pub fn source_class_key(&self, owner_alias: Option<&str>) -> String {
        if self.secondary {
            format!("{}.{}", self.source_class, self.source_key)
        } else {
            let alias = owner_alias.unwrap_or(&self.source_class);
            format!("{alias}.{}", self.source_key)
        }
    }

    /// The parent side of the join condition.
    pub fn parent_class_key(&self) -> String {
        format!("{}.{}", self.parent_class, self.parent_key)
    }

    /// The alias this relation joins under.
    pub fn alias(&self) -> &str {
        &self.parent_class
    }
}

fn split_key_path(path: &str) -> Result<(String, String), Error> {
    match path.split_once('.') {
        Some((class, key)) if !class.is_empty() && !key.is_empty() => {
            Ok((class.to_string(), key.to_string()))
        }
        _ => Err(Error::MissingConfiguration(format!(
            "relation key path {path:?} must be of the form \"class.key\""
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inferred_defaults() {
        let def = RelationDefinition::new("author", "User");
        assert_eq!(def.source_class, OWNER_MARKER);
        assert_eq!(def.source_key, "author_id");
        assert_eq!(def.parent_class, "author");
        assert_eq!(def.parent_key, "id");
        assert!(def.is_primary());
    }

    #[test]
    fn test_from_override_marks_secondary() {
        let def = RelationDefinition::new("company", "Company")
            .with_from("author.company_id")
            .unwrap();
        assert_eq!(def.source_class, "author");
        assert_eq!(def.source_key, "company_id");
        assert!(!def.is_primary());
    }

    #[test]
    fn test_malformed_key_path() {
        assert!(RelationDefinition::new("a", "B").with_from("no_dot").is_err());
        assert!(RelationDefinition::new("a", "B").with_to(".id").is_err());
        assert!(RelationDefinition::new("a", "B").with_from("x.").is_err());
    }

    #[test]
    fn test_join_condition_sides() {
        let relation = Relation {
            field: "author".into(),
            target_class: "User".into(),
            target_source: "user".into(),
            source_class: OWNER_MARKER.into(),
            source_key: "author_id".into(),
            parent_class: "author".into(),
            parent_key: "id".into(),
            secondary: false,
        };
        assert_eq!(relation.source_class_key(Some("post")), "post.author_id");
        assert_eq!(relation.source_class_key(None), "*.author_id");
        assert_eq!(relation.parent_class_key(), "author.id");

        let secondary = Relation {
            field: "company".into(),
            target_class: "Company".into(),
            target_source: "company".into(),
            source_class: "author".into(),
            source_key: "company_id".into(),
            parent_class: "company".into(),
            parent_key: "id".into(),
            secondary: true,
        };
        // A secondary key is qualified by its parent relation's alias, never
        // by the owner alias.
        assert_eq!(secondary.source_class_key(Some("post")), "author.company_id");
        assert_eq!(secondary.parent_class_key(), "company.id");
    }
}
