//! Query-options → SQL compilation.
//!
//! The compiler renders class-agnostic [`QueryOptions`] into one
//! parameter-escaped SQL statement. Rendering order is fixed: SELECT list,
//! FROM, joins, WHERE (soft-delete filter first, then user constraints in
//! map order), ORDER BY, LIMIT. Subqueries recurse through the same steps
//! without the ORDER BY/LIMIT suffix. Every identifier and literal goes
//! through the driver-supplied escaper.

use chrono::{DateTime, Utc};
use trellis_proto::{JsonPatch, Value};

use crate::catalog::{IDENTIFIER_KEY, SOFT_DELETE_KEY};
use crate::error::Error;
use crate::keymap::KeyMap;
use crate::query::{ConstraintValue, Operator, QueryOptions};

/// Escaping primitives supplied by the storage driver.
///
/// `escape_literal` must guarantee injection safety: any literal renders to
/// a value, never to executable SQL syntax.
pub trait SqlEscaper: Send + Sync {
    /// Escape a single identifier token (table, alias, or column name).
    fn escape_identifier(&self, name: &str) -> String;

    /// Escape a literal value.
    fn escape_literal(&self, value: &Value) -> String;
}

/// Renders query options and row mutations into SQL text.
pub struct SqlCompiler<'a> {
    escaper: &'a dyn SqlEscaper,
}

impl<'a> SqlCompiler<'a> {
    /// Create a compiler over the driver's escaping primitives.
    pub fn new(escaper: &'a dyn SqlEscaper) -> Self {
        Self { escaper }
    }

    /// Compile a read query.
    pub fn compile(&self, options: &QueryOptions) -> Result<String, Error> {
        self.compile_inner(options, true)
    }

    /// Compile an INSERT for a new row.
    pub fn compile_insert(&self, table: &str, row: &KeyMap) -> Result<String, Error> {
        let columns: Vec<String> = row
            .keys()
            .map(|k| self.escaper.escape_identifier(k))
            .collect();
        let values: Vec<String> = row
            .iter()
            .map(|(key, value)| self.render_write_value(key, value, true))
            .collect::<Result<_, _>>()?;
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.escaper.escape_identifier(table),
            columns.join(", "),
            values.join(", ")
        ))
    }

    /// Compile an UPDATE of an existing row by identifier.
    pub fn compile_update(&self, table: &str, id: i64, row: &KeyMap) -> Result<String, Error> {
        let assignments: Vec<String> = row
            .iter()
            .map(|(key, value)| {
                let expr = self.render_write_value(key, value, false)?;
                Ok(format!("{} = {expr}", self.escaper.escape_identifier(key)))
            })
            .collect::<Result<_, Error>>()?;
        Ok(format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.escaper.escape_identifier(table),
            assignments.join(", "),
            self.escaper.escape_identifier(IDENTIFIER_KEY),
            self.escaper.escape_literal(&Value::Int(id))
        ))
    }

    /// Compile the soft-delete statement for a row.
    pub fn compile_destroy(
        &self,
        table: &str,
        id: i64,
        deleted_at: DateTime<Utc>,
    ) -> Result<String, Error> {
        Ok(format!(
            "UPDATE {} SET {} = {} WHERE {} = {}",
            self.escaper.escape_identifier(table),
            self.escaper.escape_identifier(SOFT_DELETE_KEY),
            self.escaper.escape_literal(&Value::Date(deleted_at)),
            self.escaper.escape_identifier(IDENTIFIER_KEY),
            self.escaper.escape_literal(&Value::Int(id))
        ))
    }

    fn compile_inner(&self, options: &QueryOptions, with_suffix: bool) -> Result<String, Error> {
        let mut sql = String::from("SELECT ");

        if options.columns.is_empty() {
            sql.push('*');
        } else {
            let columns: Vec<String> = options
                .columns
                .iter()
                .map(|(source, alias)| {
                    format!(
                        "{} AS {}",
                        self.escape_key(source),
                        self.escaper.escape_identifier(alias)
                    )
                })
                .collect();
            sql.push_str(&columns.join(", "));
        }

        sql.push_str(&format!(
            " FROM {} AS {}",
            self.escaper.escape_identifier(&options.source.table),
            self.escaper.escape_identifier(&options.source.alias)
        ));

        for (alias, relation) in &options.relations {
            sql.push_str(&format!(
                " LEFT OUTER JOIN {} AS {} ON {} = {}",
                self.escaper.escape_identifier(&relation.target_source),
                self.escaper.escape_identifier(alias),
                self.escape_key(&relation.parent_class_key()),
                self.escape_key(&relation.source_class_key(Some(&options.source.alias)))
            ));
        }

        // The soft-delete filter goes in front of every user constraint.
        let mut clauses = vec![format!(
            "{}.{} IS NULL",
            self.escaper.escape_identifier(&options.source.alias),
            self.escaper.escape_identifier(SOFT_DELETE_KEY)
        )];
        for entry in options.constraints.iter() {
            for (operator, value) in entry.iter() {
                clauses.push(self.render_constraint(entry.key(), *operator, value)?);
            }
        }
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));

        if with_suffix {
            if !options.sorting.is_empty() {
                let keys: Vec<String> = options
                    .sorting
                    .iter()
                    .map(|entry| match entry.strip_prefix('-') {
                        Some(key) => format!("{} DESC", self.escape_key(key)),
                        None => format!("{} ASC", self.escape_key(entry)),
                    })
                    .collect();
                sql.push_str(" ORDER BY ");
                sql.push_str(&keys.join(", "));
            }
            if let Some(limit) = options.limitation {
                sql.push_str(&format!(" LIMIT {}, {}", options.skipped, limit));
            }
        }

        Ok(sql)
    }

    fn render_constraint(
        &self,
        key: &str,
        operator: Operator,
        value: &ConstraintValue,
    ) -> Result<String, Error> {
        let k = self.escape_key(key);
        match operator {
            Operator::Equal => Ok(format!("{k} = {}", self.literal(key, value)?)),
            Operator::NotEqual => Ok(format!("{k} <> {}", self.literal(key, value)?)),
            Operator::GreaterThan => Ok(format!("{k} > {}", self.literal(key, value)?)),
            Operator::GreaterThanOrEqual => Ok(format!("{k} >= {}", self.literal(key, value)?)),
            Operator::LessThan => Ok(format!("{k} < {}", self.literal(key, value)?)),
            Operator::LessThanOrEqual => Ok(format!("{k} <= {}", self.literal(key, value)?)),
            Operator::Exists => match value {
                ConstraintValue::Value(Value::Bool(true)) => Ok(format!("{k} IS NOT NULL")),
                ConstraintValue::Value(Value::Bool(false)) => Ok(format!("{k} IS NULL")),
                _ => Err(self.bad_shape(key, "exists", "a boolean")),
            },
            Operator::ContainedIn => {
                let list = self.literal_list(key, value)?;
                if list.is_empty() {
                    Ok("1 = 0".to_string())
                } else {
                    Ok(format!("{k} IN ({})", list.join(", ")))
                }
            }
            Operator::NotContainedIn => {
                let list = self.literal_list(key, value)?;
                if list.is_empty() {
                    Ok("1 = 1".to_string())
                } else {
                    Ok(format!("{k} NOT IN ({})", list.join(", ")))
                }
            }
            Operator::ContainedInOrNull => {
                let list = self.literal_list(key, value)?;
                if list.is_empty() {
                    Ok(format!("{k} IS NULL"))
                } else {
                    Ok(format!("({k} IS NULL OR {k} IN ({}))", list.join(", ")))
                }
            }
            Operator::StartsWith => self.render_like(key, &k, value, false, true),
            Operator::EndsWith => self.render_like(key, &k, value, true, false),
            Operator::Contains => self.render_like(key, &k, value, true, true),
            Operator::StartsWithEither => self.render_like_list(key, &k, value, false, true, "OR"),
            Operator::EndsWithEither => self.render_like_list(key, &k, value, true, false, "OR"),
            Operator::ContainsEither => self.render_like_list(key, &k, value, true, true, "OR"),
            Operator::StartsWithAll => self.render_like_list(key, &k, value, false, true, "AND"),
            Operator::EndsWithAll => self.render_like_list(key, &k, value, true, false, "AND"),
            Operator::ContainsAll => self.render_like_list(key, &k, value, true, true, "AND"),
            Operator::FoundIn => {
                let subquery = self.subquery(key, value)?;
                Ok(format!("{k} IN ({subquery})"))
            }
            Operator::NotFoundIn => {
                let subquery = self.subquery(key, value)?;
                Ok(format!("{k} NOT IN ({subquery})"))
            }
            Operator::FoundInEither => self.render_subquery_list(key, &k, value, false, "OR"),
            Operator::FoundInAll => self.render_subquery_list(key, &k, value, false, "AND"),
            Operator::NotFoundInEither => self.render_subquery_list(key, &k, value, true, "OR"),
            Operator::NotFoundInAll => self.render_subquery_list(key, &k, value, true, "AND"),
        }
    }

    fn render_like(
        &self,
        key: &str,
        k: &str,
        value: &ConstraintValue,
        leading: bool,
        trailing: bool,
    ) -> Result<String, Error> {
        let ConstraintValue::Value(Value::String(text)) = value else {
            return Err(self.bad_shape(key, "string match", "a string"));
        };
        Ok(format!("{k} LIKE {}", self.like_literal(text, leading, trailing)))
    }

    fn render_like_list(
        &self,
        key: &str,
        k: &str,
        value: &ConstraintValue,
        leading: bool,
        trailing: bool,
        joiner: &str,
    ) -> Result<String, Error> {
        let ConstraintValue::Values(values) = value else {
            return Err(self.bad_shape(key, "string match", "a string list"));
        };
        if values.is_empty() {
            return Ok(if joiner == "AND" { "1 = 1" } else { "1 = 0" }.to_string());
        }
        let clauses: Vec<String> = values
            .iter()
            .map(|v| match v {
                Value::String(text) => {
                    Ok(format!("{k} LIKE {}", self.like_literal(text, leading, trailing)))
                }
                _ => Err(self.bad_shape(key, "string match", "a string list")),
            })
            .collect::<Result<_, _>>()?;
        Ok(format!("({})", clauses.join(&format!(" {joiner} "))))
    }

    fn render_subquery_list(
        &self,
        key: &str,
        k: &str,
        value: &ConstraintValue,
        negated: bool,
        joiner: &str,
    ) -> Result<String, Error> {
        let ConstraintValue::Subqueries(subqueries) = value else {
            return Err(self.bad_shape(key, "subquery match", "a subquery list"));
        };
        if subqueries.is_empty() {
            return Ok(if joiner == "AND" { "1 = 1" } else { "1 = 0" }.to_string());
        }
        let membership = if negated { "NOT IN" } else { "IN" };
        let clauses: Vec<String> = subqueries
            .iter()
            .map(|options| {
                let sql = self.compile_inner(options, false)?;
                Ok(format!("{k} {membership} ({sql})"))
            })
            .collect::<Result<_, Error>>()?;
        Ok(format!("({})", clauses.join(&format!(" {joiner} "))))
    }

    fn render_write_value(&self, key: &str, value: &Value, new_row: bool) -> Result<String, Error> {
        let column = self.escaper.escape_identifier(key);
        match value {
            Value::Increment(inc) => {
                let base = if new_row {
                    "0".to_string()
                } else {
                    format!("IFNULL({column}, 0)")
                };
                let mut expr = format!("GREATEST({base} + ({}), {})", inc.amount, inc.min);
                if let Some(max) = inc.max {
                    expr = format!("LEAST({expr}, {max})");
                }
                Ok(expr)
            }
            Value::Patch(patch) => {
                let path = self
                    .escaper
                    .escape_literal(&Value::String(patch.path().to_string()));
                match patch {
                    JsonPatch::Set { value, .. } => {
                        let root = if new_row {
                            "JSON_OBJECT()".to_string()
                        } else {
                            format!("IFNULL({column}, JSON_OBJECT())")
                        };
                        Ok(format!(
                            "JSON_SET({root}, {path}, {})",
                            self.json_argument(value)?
                        ))
                    }
                    JsonPatch::Append { value, .. } => {
                        let root = if new_row {
                            "JSON_ARRAY()".to_string()
                        } else {
                            format!("IFNULL({column}, JSON_ARRAY())")
                        };
                        Ok(format!(
                            "JSON_ARRAY_APPEND({root}, {path}, {})",
                            self.json_argument(value)?
                        ))
                    }
                }
            }
            literal => Ok(self.escaper.escape_literal(literal)),
        }
    }

    // Scalars pass as plain literals; compound values are cast so the JSON
    // functions see a document instead of a string.
    fn json_argument(&self, value: &serde_json::Value) -> Result<String, Error> {
        match value {
            serde_json::Value::Null => Ok("NULL".to_string()),
            serde_json::Value::Bool(b) => Ok(self.escaper.escape_literal(&Value::Bool(*b))),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::String(s) => {
                Ok(self.escaper.escape_literal(&Value::String(s.clone())))
            }
            compound => {
                let text = serde_json::to_string(compound)
                    .map_err(|e| Error::InvalidObjectKey(format!("unserializable patch value: {e}")))?;
                Ok(format!(
                    "CAST({} AS JSON)",
                    self.escaper.escape_literal(&Value::String(text))
                ))
            }
        }
    }

    fn literal(&self, key: &str, value: &ConstraintValue) -> Result<String, Error> {
        match value {
            ConstraintValue::Value(v) => Ok(self.escaper.escape_literal(v)),
            _ => Err(self.bad_shape(key, "comparison", "a single value")),
        }
    }

    fn literal_list(&self, key: &str, value: &ConstraintValue) -> Result<Vec<String>, Error> {
        match value {
            ConstraintValue::Values(values) => Ok(values
                .iter()
                .map(|v| self.escaper.escape_literal(v))
                .collect()),
            _ => Err(self.bad_shape(key, "membership", "a value list")),
        }
    }

    fn subquery(&self, key: &str, value: &ConstraintValue) -> Result<String, Error> {
        match value {
            ConstraintValue::Subquery(options) => self.compile_inner(options, false),
            _ => Err(self.bad_shape(key, "subquery match", "a subquery")),
        }
    }

    fn like_literal(&self, text: &str, leading: bool, trailing: bool) -> String {
        let escaped = text
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!(
            "{}{escaped}{}",
            if leading { "%" } else { "" },
            if trailing { "%" } else { "" }
        );
        self.escaper.escape_literal(&Value::String(pattern))
    }

    /// Escape a possibly-qualified key, token by token.
    fn escape_key(&self, key: &str) -> String {
        key.split('.')
            .map(|token| self.escaper.escape_identifier(token))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn bad_shape(&self, key: &str, operation: &str, expected: &str) -> Error {
        Error::ForbiddenOperation(format!("{operation} on {key:?} requires {expected}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use crate::query::{ConstraintMap, Source};
    use trellis_proto::Increment;

    fn options_for(table: &str) -> QueryOptions {
        QueryOptions {
            source: Source {
                table: table.to_string(),
                alias: table.to_string(),
            },
            columns: vec![(format!("{table}.id"), "id".to_string())],
            ..QueryOptions::default()
        }
    }

    fn compile(options: &QueryOptions) -> String {
        let driver = MemoryDriver::new();
        SqlCompiler::new(&driver).compile(options).unwrap()
    }

    #[test]
    fn test_soft_delete_filter_always_present() {
        let sql = compile(&options_for("post"));
        assert_eq!(
            sql,
            "SELECT `post`.`id` AS `id` FROM `post` AS `post` WHERE `post`.`deleted_at` IS NULL"
        );
    }

    #[test]
    fn test_operator_rendering() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let cases: Vec<(Operator, ConstraintValue, &str)> = vec![
            (
                Operator::Equal,
                ConstraintValue::Value(Value::Int(7)),
                "`post`.`views` = 7",
            ),
            (
                Operator::NotEqual,
                ConstraintValue::Value(Value::Int(7)),
                "`post`.`views` <> 7",
            ),
            (
                Operator::GreaterThanOrEqual,
                ConstraintValue::Value(Value::Int(2)),
                "`post`.`views` >= 2",
            ),
            (
                Operator::Exists,
                ConstraintValue::Value(Value::Bool(true)),
                "`post`.`views` IS NOT NULL",
            ),
            (
                Operator::Exists,
                ConstraintValue::Value(Value::Bool(false)),
                "`post`.`views` IS NULL",
            ),
            (
                Operator::ContainedIn,
                ConstraintValue::Values(vec![Value::Int(1), Value::Int(2)]),
                "`post`.`views` IN (1, 2)",
            ),
            (
                Operator::NotContainedIn,
                ConstraintValue::Values(vec![Value::Int(1)]),
                "`post`.`views` NOT IN (1)",
            ),
            (
                Operator::ContainedInOrNull,
                ConstraintValue::Values(vec![Value::Int(1)]),
                "(`post`.`views` IS NULL OR `post`.`views` IN (1))",
            ),
        ];
        for (operator, value, expected) in cases {
            let clause = compiler
                .render_constraint("post.views", operator, &value)
                .unwrap();
            assert_eq!(clause, expected);
        }
    }

    #[test]
    fn test_like_rendering() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let clause = compiler
            .render_constraint(
                "post.title",
                Operator::StartsWith,
                &ConstraintValue::Value(Value::from("intro")),
            )
            .unwrap();
        assert_eq!(clause, "`post`.`title` LIKE 'intro%'");

        let clause = compiler
            .render_constraint(
                "post.title",
                Operator::Contains,
                &ConstraintValue::Value(Value::from("50%_off")),
            )
            .unwrap();
        // User wildcards are neutralized before ours are added.
        assert_eq!(clause, "`post`.`title` LIKE '%50\\\\%\\\\_off%'");

        let clause = compiler
            .render_constraint(
                "post.title",
                Operator::ContainsEither,
                &ConstraintValue::Values(vec![Value::from("a"), Value::from("b")]),
            )
            .unwrap();
        assert_eq!(
            clause,
            "(`post`.`title` LIKE '%a%' OR `post`.`title` LIKE '%b%')"
        );

        let clause = compiler
            .render_constraint(
                "post.title",
                Operator::EndsWithAll,
                &ConstraintValue::Values(vec![Value::from("x"), Value::from("y")]),
            )
            .unwrap();
        assert_eq!(
            clause,
            "(`post`.`title` LIKE '%x' AND `post`.`title` LIKE '%y')"
        );
    }

    #[test]
    fn test_empty_membership_lists() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let clause = compiler
            .render_constraint(
                "post.id",
                Operator::ContainedIn,
                &ConstraintValue::Values(vec![]),
            )
            .unwrap();
        assert_eq!(clause, "1 = 0");

        let clause = compiler
            .render_constraint(
                "post.id",
                Operator::NotContainedIn,
                &ConstraintValue::Values(vec![]),
            )
            .unwrap();
        assert_eq!(clause, "1 = 1");
    }

    #[test]
    fn test_subquery_rendering_drops_suffix() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let mut inner = options_for("user");
        inner.sorting.push("user.name".to_string());
        inner.limitation = Some(5);

        let clause = compiler
            .render_constraint(
                "post.author_id",
                Operator::FoundIn,
                &ConstraintValue::Subquery(Box::new(inner)),
            )
            .unwrap();
        assert_eq!(
            clause,
            "`post`.`author_id` IN (SELECT `user`.`id` AS `id` FROM `user` AS `user` \
             WHERE `user`.`deleted_at` IS NULL)"
        );
    }

    #[test]
    fn test_mismatched_value_shape_is_forbidden() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let err = compiler.render_constraint(
            "post.id",
            Operator::Equal,
            &ConstraintValue::Values(vec![Value::Int(1)]),
        );
        assert!(matches!(err, Err(Error::ForbiddenOperation(_))));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let mut options = options_for("post");
        options.constraints = {
            let mut map = ConstraintMap::new();
            map.add(
                "post.views",
                Operator::GreaterThan,
                ConstraintValue::Value(Value::Int(10)),
            );
            map.add(
                "post.title",
                Operator::StartsWith,
                ConstraintValue::Value(Value::from("a")),
            );
            map
        };
        options.sorting.push("-post.created_at".to_string());
        options.limitation = Some(10);

        assert_eq!(compile(&options), compile(&options));
        assert!(compile(&options).ends_with("ORDER BY `post`.`created_at` DESC LIMIT 0, 10"));
    }

    #[test]
    fn test_increment_rendering() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let mut row = KeyMap::new();
        row.set("views", Value::Increment(Increment::by(1.0))).unwrap();

        let sql = compiler.compile_update("post", 5, &row).unwrap();
        assert_eq!(
            sql,
            "UPDATE `post` SET `views` = GREATEST(IFNULL(`views`, 0) + (1), 0) WHERE `id` = 5"
        );

        let mut clamped = KeyMap::new();
        clamped
            .set(
                "stock",
                Value::Increment(Increment::by(-2.0).with_max(100.0)),
            )
            .unwrap();
        let sql = compiler.compile_update("item", 1, &clamped).unwrap();
        assert!(sql.contains("LEAST(GREATEST(IFNULL(`stock`, 0) + (-2), 0), 100)"));
    }

    #[test]
    fn test_increment_on_new_row_uses_literal_base() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let mut row = KeyMap::new();
        row.set("views", Value::Increment(Increment::by(1.0))).unwrap();
        let sql = compiler.compile_insert("post", &row).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO `post` (`views`) VALUES (GREATEST(0 + (1), 0))"
        );
    }

    #[test]
    fn test_json_patch_rendering() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let mut row = KeyMap::new();
        row.set(
            "meta",
            Value::Patch(JsonPatch::set("$.theme", serde_json::json!("dark"))),
        )
        .unwrap();
        let sql = compiler.compile_update("user", 3, &row).unwrap();
        assert_eq!(
            sql,
            "UPDATE `user` SET `meta` = JSON_SET(IFNULL(`meta`, JSON_OBJECT()), '$.theme', 'dark') \
             WHERE `id` = 3"
        );

        // A new row substitutes the literal JSON root.
        let sql = compiler.compile_insert("user", &row).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO `user` (`meta`) VALUES (JSON_SET(JSON_OBJECT(), '$.theme', 'dark'))"
        );

        let mut append = KeyMap::new();
        append
            .set(
                "tags",
                Value::Patch(JsonPatch::append("$", serde_json::json!({"k": 1}))),
            )
            .unwrap();
        let sql = compiler.compile_update("post", 9, &append).unwrap();
        assert_eq!(
            sql,
            "UPDATE `post` SET `tags` = JSON_ARRAY_APPEND(IFNULL(`tags`, JSON_ARRAY()), '$', \
             CAST('{\"k\":1}' AS JSON)) WHERE `id` = 9"
        );
    }

    #[test]
    fn test_destroy_is_a_soft_delete() {
        let driver = MemoryDriver::new();
        let compiler = SqlCompiler::new(&driver);

        let now = Utc::now();
        let sql = compiler.compile_destroy("post", 4, now).unwrap();
        assert!(sql.starts_with("UPDATE `post` SET `deleted_at` = '"));
        assert!(sql.ends_with("WHERE `id` = 4"));
    }
}
