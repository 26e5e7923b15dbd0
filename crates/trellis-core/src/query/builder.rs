//! Fluent query builder over a declared class.
//!
//! A `Query` accumulates constraints, a projection, includes, sort keys and
//! pagination, validating every field against the class definition as it
//! goes. `to_query_options` compiles the accumulated state into
//! class-agnostic [`QueryOptions`] for the SQL compiler.

use std::sync::Arc;

use trellis_proto::Value;

use crate::catalog::{ClassDefinition, ClassId, ClassRegistry, Relation, IDENTIFIER_KEY};
use crate::error::Error;
use crate::query::constraint::{ConstraintMap, ConstraintValue, Operator};
use crate::query::options::{QueryOptions, Source};

/// A fluent constraint/selection/sort/pagination accumulator over a class.
#[derive(Debug, Clone)]
pub struct Query {
    class: ClassId,
    registry: Arc<ClassRegistry>,
    constraints: ConstraintMap,
    selection: Vec<String>,
    includes: Vec<String>,
    sorting: Vec<String>,
    skipped: u64,
    limitation: Option<u64>,
}

impl Query {
    /// Start a query over a declared class.
    pub fn new(registry: Arc<ClassRegistry>, class: ClassId) -> Self {
        Self {
            class,
            registry,
            constraints: ConstraintMap::new(),
            selection: Vec::new(),
            includes: Vec::new(),
            sorting: Vec::new(),
            skipped: 0,
            limitation: None,
        }
    }

    /// The class this query targets.
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// The registry this query validates against.
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    // Comparison constraints

    /// Require `key = value`.
    pub fn equal_to(self, key: &str, value: impl Into<Value>) -> Result<Self, Error> {
        self.constrain(key, Operator::Equal, ConstraintValue::Value(value.into()))
    }

    /// Require `key <> value`.
    pub fn not_equal_to(self, key: &str, value: impl Into<Value>) -> Result<Self, Error> {
        self.constrain(key, Operator::NotEqual, ConstraintValue::Value(value.into()))
    }

    /// Require `key > value`.
    pub fn greater_than(self, key: &str, value: impl Into<Value>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::GreaterThan,
            ConstraintValue::Value(value.into()),
        )
    }

    /// Require `key >= value`.
    pub fn greater_than_or_equal_to(
        self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::GreaterThanOrEqual,
            ConstraintValue::Value(value.into()),
        )
    }

    /// Require `key < value`.
    pub fn less_than(self, key: &str, value: impl Into<Value>) -> Result<Self, Error> {
        self.constrain(key, Operator::LessThan, ConstraintValue::Value(value.into()))
    }

    /// Require `key <= value`.
    pub fn less_than_or_equal_to(self, key: &str, value: impl Into<Value>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::LessThanOrEqual,
            ConstraintValue::Value(value.into()),
        )
    }

    /// Require `key IS NOT NULL`.
    pub fn exists(self, key: &str) -> Result<Self, Error> {
        self.constrain(key, Operator::Exists, ConstraintValue::Value(Value::Bool(true)))
    }

    /// Require `key IS NULL`.
    pub fn does_not_exist(self, key: &str) -> Result<Self, Error> {
        self.constrain(key, Operator::Exists, ConstraintValue::Value(Value::Bool(false)))
    }

    // Membership constraints

    /// Require `key IN (values)`.
    pub fn contained_in(self, key: &str, values: Vec<Value>) -> Result<Self, Error> {
        self.constrain(key, Operator::ContainedIn, ConstraintValue::Values(values))
    }

    /// Require `key NOT IN (values)`.
    pub fn not_contained_in(self, key: &str, values: Vec<Value>) -> Result<Self, Error> {
        self.constrain(key, Operator::NotContainedIn, ConstraintValue::Values(values))
    }

    /// Require `key IS NULL OR key IN (values)`.
    pub fn contained_in_or_null(self, key: &str, values: Vec<Value>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::ContainedInOrNull,
            ConstraintValue::Values(values),
        )
    }

    // String matching constraints

    /// Require `key` to start with `prefix`.
    pub fn starts_with(self, key: &str, prefix: &str) -> Result<Self, Error> {
        self.constrain(key, Operator::StartsWith, ConstraintValue::Value(prefix.into()))
    }

    /// Require `key` to end with `suffix`.
    pub fn ends_with(self, key: &str, suffix: &str) -> Result<Self, Error> {
        self.constrain(key, Operator::EndsWith, ConstraintValue::Value(suffix.into()))
    }

    /// Require `key` to contain `substring`.
    pub fn contains(self, key: &str, substring: &str) -> Result<Self, Error> {
        self.constrain(key, Operator::Contains, ConstraintValue::Value(substring.into()))
    }

    /// Require `key` to start with at least one of `prefixes`.
    pub fn starts_with_either(self, key: &str, prefixes: Vec<String>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::StartsWithEither,
            ConstraintValue::Values(prefixes.into_iter().map(Value::String).collect()),
        )
    }

    /// Require `key` to end with at least one of `suffixes`.
    pub fn ends_with_either(self, key: &str, suffixes: Vec<String>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::EndsWithEither,
            ConstraintValue::Values(suffixes.into_iter().map(Value::String).collect()),
        )
    }

    /// Require `key` to contain at least one of `substrings`.
    pub fn contains_either(self, key: &str, substrings: Vec<String>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::ContainsEither,
            ConstraintValue::Values(substrings.into_iter().map(Value::String).collect()),
        )
    }

    /// Require `key` to start with every one of `prefixes`.
    pub fn starts_with_all(self, key: &str, prefixes: Vec<String>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::StartsWithAll,
            ConstraintValue::Values(prefixes.into_iter().map(Value::String).collect()),
        )
    }

    /// Require `key` to end with every one of `suffixes`.
    pub fn ends_with_all(self, key: &str, suffixes: Vec<String>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::EndsWithAll,
            ConstraintValue::Values(suffixes.into_iter().map(Value::String).collect()),
        )
    }

    /// Require `key` to contain every one of `substrings`.
    pub fn contains_all(self, key: &str, substrings: Vec<String>) -> Result<Self, Error> {
        self.constrain(
            key,
            Operator::ContainsAll,
            ConstraintValue::Values(substrings.into_iter().map(Value::String).collect()),
        )
    }

    // Subquery constraints

    /// Require `key` to appear in the subquery's projection.
    pub fn found_in(self, key: &str, query: Query) -> Result<Self, Error> {
        let subquery = query.to_subquery()?;
        self.constrain(key, Operator::FoundIn, ConstraintValue::Subquery(Box::new(subquery)))
    }

    /// Require `key` to appear in at least one subquery's projection.
    pub fn found_in_either(self, key: &str, queries: Vec<Query>) -> Result<Self, Error> {
        let subqueries = Self::subqueries(queries)?;
        self.constrain(key, Operator::FoundInEither, ConstraintValue::Subqueries(subqueries))
    }

    /// Require `key` to appear in every subquery's projection.
    pub fn found_in_all(self, key: &str, queries: Vec<Query>) -> Result<Self, Error> {
        let subqueries = Self::subqueries(queries)?;
        self.constrain(key, Operator::FoundInAll, ConstraintValue::Subqueries(subqueries))
    }

    /// Require `key` to be absent from the subquery's projection.
    pub fn not_found_in(self, key: &str, query: Query) -> Result<Self, Error> {
        let subquery = query.to_subquery()?;
        self.constrain(key, Operator::NotFoundIn, ConstraintValue::Subquery(Box::new(subquery)))
    }

    /// Require `key` to be absent from at least one subquery's projection.
    pub fn not_found_in_either(self, key: &str, queries: Vec<Query>) -> Result<Self, Error> {
        let subqueries = Self::subqueries(queries)?;
        self.constrain(
            key,
            Operator::NotFoundInEither,
            ConstraintValue::Subqueries(subqueries),
        )
    }

    /// Require `key` to be absent from every subquery's projection.
    pub fn not_found_in_all(self, key: &str, queries: Vec<Query>) -> Result<Self, Error> {
        let subqueries = Self::subqueries(queries)?;
        self.constrain(key, Operator::NotFoundInAll, ConstraintValue::Subqueries(subqueries))
    }

    // Projection, includes, sort, pagination

    /// Select specific fields, in order.
    pub fn select(mut self, keys: &[&str]) -> Result<Self, Error> {
        for key in keys {
            self.validate_key(key)?;
            if !self.selection.iter().any(|k| k == key) {
                self.selection.push((*key).to_string());
            }
        }
        Ok(self)
    }

    /// Include a relation's full record in the result.
    pub fn include(mut self, field: &str) -> Result<Self, Error> {
        let definition = self.definition()?;
        if definition.relation(field).is_none() {
            return Err(Error::ForbiddenOperation(format!(
                "cannot include {field:?}: not a relation on class {}",
                definition.name()
            )));
        }
        if !self.includes.iter().any(|f| f == field) {
            self.includes.push(field.to_string());
        }
        Ok(self)
    }

    /// Sort ascending by `key`.
    pub fn sort_by(mut self, key: &str) -> Result<Self, Error> {
        self.validate_key(key)?;
        self.sorting.push(key.to_string());
        Ok(self)
    }

    /// Sort descending by `key`.
    pub fn sort_by_descending(mut self, key: &str) -> Result<Self, Error> {
        self.validate_key(key)?;
        self.sorting.push(format!("-{key}"));
        Ok(self)
    }

    /// Skip the first `count` rows.
    pub fn skip(mut self, count: u64) -> Self {
        self.skipped = count;
        self
    }

    /// Return at most `count` rows.
    pub fn limit(mut self, count: u64) -> Self {
        self.limitation = Some(count);
        self
    }

    /// Compile into class-agnostic query options.
    ///
    /// `master` lifts the hidden-field restriction for elevated callers.
    pub fn to_query_options(&self, master: bool) -> Result<QueryOptions, Error> {
        let definition = self.definition()?;
        let alias = definition.source().to_string();
        let mut options = QueryOptions {
            source: Source {
                table: definition.source().to_string(),
                alias: alias.clone(),
            },
            ..QueryOptions::default()
        };

        self.derive_columns(&definition, &alias, master, &mut options)?;
        self.derive_includes(&definition, master, &mut options)?;
        self.derive_constraints(&definition, &alias, &mut options)?;
        self.derive_sorting(&definition, &alias, &mut options)?;

        options.skipped = self.skipped;
        options.limitation = self.limitation;
        Ok(options)
    }

    /// Compile into a restricted single-column projection for use as a
    /// subquery value: first selected column only, no sort, no pagination.
    pub fn to_subquery(&self) -> Result<QueryOptions, Error> {
        let mut options = self.to_query_options(false)?;
        options.columns.truncate(1);
        options.sorting.clear();
        options.skipped = 0;
        options.limitation = None;
        Ok(options)
    }

    // Internals

    fn definition(&self) -> Result<Arc<ClassDefinition>, Error> {
        self.registry.definition(self.class)
    }

    fn subqueries(queries: Vec<Query>) -> Result<Vec<QueryOptions>, Error> {
        queries.into_iter().map(|q| q.to_subquery()).collect()
    }

    fn constrain(
        mut self,
        key: &str,
        operator: Operator,
        value: ConstraintValue,
    ) -> Result<Self, Error> {
        self.validate_key(key)?;
        self.constraints.add(key, operator, value);
        Ok(self)
    }

    /// Check that `key` is addressable on this class: a declared field, the
    /// identifier, or a `relation.field` path through a declared relation.
    fn validate_key(&self, key: &str) -> Result<(), Error> {
        let definition = self.definition()?;
        match key.split_once('.') {
            Some((alias, field)) => {
                let Some(relation) = definition.relation(alias) else {
                    return Err(Error::ForbiddenOperation(format!(
                        "{alias:?} is not a relation on class {}",
                        definition.name()
                    )));
                };
                let target = self.registry.definition_by_name(&relation.target_class)?;
                if !target.has_field(field) {
                    return Err(Error::InvalidObjectKey(format!(
                        "unknown field {field:?} on class {}",
                        target.name()
                    )));
                }
                Ok(())
            }
            None => {
                if definition.has_field(key) {
                    Ok(())
                } else {
                    Err(Error::InvalidObjectKey(format!(
                        "unknown field {key:?} on class {}",
                        definition.name()
                    )))
                }
            }
        }
    }

    /// Resolve a relation field and register its join, adding the parent
    /// join first for secondary relations so the graph stays transitively
    /// complete.
    fn ensure_join(
        &self,
        definition: &ClassDefinition,
        field: &str,
        options: &mut QueryOptions,
    ) -> Result<Relation, Error> {
        let Some(relation_def) = definition.relation(field) else {
            return Err(Error::MissingConfiguration(format!(
                "unresolvable relation alias {field:?} on class {}",
                definition.name()
            )));
        };
        let relation = relation_def.resolve(definition, &self.registry)?;
        if relation.secondary {
            self.ensure_join(definition, &relation.source_class, options)?;
        }
        options.add_relation(relation.alias().to_string(), relation.clone());
        Ok(relation)
    }

    fn derive_columns(
        &self,
        definition: &ClassDefinition,
        alias: &str,
        master: bool,
        options: &mut QueryOptions,
    ) -> Result<(), Error> {
        let effective: Vec<String> = if self.selection.is_empty() {
            let mut fields = vec![IDENTIFIER_KEY.to_string()];
            fields.extend(
                definition
                    .keys()
                    .map(|k| k.name().to_string())
                    .filter(|name| master || !definition.is_hidden(name)),
            );
            fields.extend(
                definition
                    .relations()
                    .map(|r| r.field.clone())
                    .filter(|name| master || !definition.is_hidden(name)),
            );
            fields.extend(definition.timestamps().iter().cloned());
            fields
        } else {
            for name in &self.selection {
                if !master && definition.is_hidden(name) {
                    return Err(Error::ForbiddenOperation(format!(
                        "field {name:?} is hidden on class {}",
                        definition.name()
                    )));
                }
            }
            self.selection.clone()
        };

        for name in &effective {
            if definition.relation(name).is_some() {
                let relation = self.ensure_join(definition, name, options)?;
                options.add_column(relation.source_class_key(Some(alias)), name.clone());
            } else if let Some((qualifier, _)) = name.split_once('.') {
                if qualifier != alias {
                    self.ensure_join(definition, qualifier, options)?;
                }
                options.add_column(name.clone(), name.clone());
            } else {
                options.add_column(format!("{alias}.{name}"), name.clone());
            }
        }
        Ok(())
    }

    fn derive_includes(
        &self,
        definition: &ClassDefinition,
        master: bool,
        options: &mut QueryOptions,
    ) -> Result<(), Error> {
        for field in &self.includes {
            let relation = self.ensure_join(definition, field, options)?;
            let target = self.registry.definition_by_name(&relation.target_class)?;
            let join_alias = relation.alias();

            options.add_column(
                format!("{join_alias}.{IDENTIFIER_KEY}"),
                format!("{field}.{IDENTIFIER_KEY}"),
            );
            for key in target.keys() {
                if !master && target.is_hidden(key.name()) {
                    continue;
                }
                options.add_column(
                    format!("{join_alias}.{}", key.name()),
                    format!("{field}.{}", key.name()),
                );
            }
            for timestamp in target.timestamps() {
                options.add_column(
                    format!("{join_alias}.{timestamp}"),
                    format!("{field}.{timestamp}"),
                );
            }
        }
        Ok(())
    }

    fn derive_constraints(
        &self,
        definition: &ClassDefinition,
        alias: &str,
        options: &mut QueryOptions,
    ) -> Result<(), Error> {
        let mut constraints = self.constraints.clone();
        let keys: Vec<String> = constraints.iter().map(|e| e.key().to_string()).collect();
        for key in keys {
            if let Some((qualifier, _)) = key.split_once('.') {
                if qualifier != alias {
                    self.ensure_join(definition, qualifier, options)?;
                }
            } else if definition.relation(&key).is_some() {
                // A bare relation key constrains the foreign-key column.
                let relation = self.ensure_join(definition, &key, options)?;
                constraints.change_key(&key, relation.source_class_key(Some(alias)))?;
            } else {
                constraints.change_key(&key, format!("{alias}.{key}"))?;
            }
        }
        options.constraints = constraints;
        Ok(())
    }

    fn derive_sorting(
        &self,
        definition: &ClassDefinition,
        alias: &str,
        options: &mut QueryOptions,
    ) -> Result<(), Error> {
        for entry in &self.sorting {
            let (descending, key) = match entry.strip_prefix('-') {
                Some(key) => (true, key),
                None => (false, entry.as_str()),
            };
            let qualified = if let Some((qualifier, _)) = key.split_once('.') {
                if qualifier != alias {
                    self.ensure_join(definition, qualifier, options)?;
                }
                key.to_string()
            } else {
                format!("{alias}.{key}")
            };
            options
                .sorting
                .push(if descending { format!("-{qualified}") } else { qualified });
        }
        Ok(())
    }
}
