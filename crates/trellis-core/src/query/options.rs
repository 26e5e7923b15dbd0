//! Class-agnostic query options.
//!
//! `QueryOptions` is the single seam between the query builder and the SQL
//! compiler: everything the compiler needs, with every class-specific rule
//! already applied.

use crate::catalog::Relation;
use crate::query::constraint::ConstraintMap;

/// Compiled query options: projection, relation graph, constraints, sort and
/// pagination, all in deterministic order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOptions {
    /// Backing table and its alias.
    pub source: Source,
    /// Ordered projection: source expression → output alias.
    pub columns: Vec<(String, String)>,
    /// Ordered joins: alias → resolved relation.
    pub relations: Vec<(String, Relation)>,
    /// Constraint map, alias-qualified.
    pub constraints: ConstraintMap,
    /// Sort keys; a minus prefix means descending.
    pub sorting: Vec<String>,
    /// Rows to skip.
    pub skipped: u64,
    /// Maximum rows to return; `None` renders no LIMIT clause.
    pub limitation: Option<u64>,
}

/// The FROM side of a query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Source {
    /// Table name.
    pub table: String,
    /// Alias the table is addressed by.
    pub alias: String,
}

impl QueryOptions {
    /// Look up a relation by alias.
    pub fn relation(&self, alias: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, r)| r)
    }

    /// Whether a join is already registered under `alias`.
    pub fn has_relation(&self, alias: &str) -> bool {
        self.relations.iter().any(|(a, _)| a == alias)
    }

    /// Register a join unless its alias is already present.
    pub fn add_relation(&mut self, alias: impl Into<String>, relation: Relation) {
        let alias = alias.into();
        if !self.has_relation(&alias) {
            self.relations.push((alias, relation));
        }
    }

    /// Register a projected column unless the source expression is already
    /// present.
    pub fn add_column(&mut self, source: impl Into<String>, alias: impl Into<String>) {
        let source = source.into();
        if !self.columns.iter().any(|(s, _)| *s == source) {
            self.columns.push((source, alias.into()));
        }
    }
}
