//! Storage driver contract.
//!
//! The SQL network driver lives outside this crate; the core talks to it
//! through `StorageDriver`, one statement per call. The driver also owns the
//! escaping primitives the compiler uses for every rendered token, and the
//! read/write connection split.

use async_trait::async_trait;
use chrono::SecondsFormat;
use parking_lot::Mutex;
use std::collections::VecDeque;
use trellis_proto::Value;

use crate::error::Error;
use crate::keymap::KeyMap;
use crate::sql::SqlEscaper;

/// Which half of the connection pool a statement should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Read statement; may run on a replica.
    Read,
    /// Write statement; must run on the primary.
    Write,
}

/// The result of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    /// Rows returned by a read statement.
    Rows(Vec<KeyMap>),
    /// Identifier assigned by an insert.
    Inserted {
        /// The new row's identifier.
        id: i64,
    },
    /// A write that returned no identifier.
    Done {
        /// Number of affected rows.
        affected: u64,
    },
}

/// An asynchronous SQL driver.
///
/// Implementations own pooling and never hand a connection across calls;
/// each `execute` acquires, runs one statement, and releases.
#[async_trait]
pub trait StorageDriver: SqlEscaper + Send + Sync {
    /// Prepare the driver for use (open pools, ping the server).
    async fn initialize(&self) -> Result<(), Error>;

    /// Execute one statement.
    async fn execute(&self, sql: &str, intent: Intent) -> Result<ExecuteResult, Error>;
}

/// Scripted in-memory driver for tests and examples.
///
/// Results are queued up front with the `push_*` methods and handed back in
/// order; every executed statement is recorded for inspection. Escaping
/// follows MySQL conventions (backtick identifiers, backslash-escaped
/// string literals).
#[derive(Debug, Default)]
pub struct MemoryDriver {
    script: Mutex<VecDeque<Result<ExecuteResult, String>>>,
    executed: Mutex<Vec<(String, Intent)>>,
}

impl MemoryDriver {
    /// Create a driver with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a row-set result.
    pub fn push_rows(&self, rows: Vec<KeyMap>) {
        self.script.lock().push_back(Ok(ExecuteResult::Rows(rows)));
    }

    /// Queue an insert result.
    pub fn push_inserted(&self, id: i64) {
        self.script.lock().push_back(Ok(ExecuteResult::Inserted { id }));
    }

    /// Queue a write result.
    pub fn push_done(&self, affected: u64) {
        self.script.lock().push_back(Ok(ExecuteResult::Done { affected }));
    }

    /// Queue a failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().push_back(Err(message.into()));
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<(String, Intent)> {
        self.executed.lock().clone()
    }

    /// The last executed statement, if any.
    pub fn last_statement(&self) -> Option<String> {
        self.executed.lock().last().map(|(sql, _)| sql.clone())
    }
}

impl SqlEscaper for MemoryDriver {
    fn escape_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn escape_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => quote(s),
            Value::Date(d) => format!(
                "'{}'",
                d.to_rfc3339_opts(SecondsFormat::Millis, true)
                    .replace('T', " ")
                    .trim_end_matches('Z')
            ),
            Value::Json(j) => quote(&j.to_string()),
            Value::Pointer(p) => match p.id {
                Some(id) => id.to_string(),
                None => "NULL".to_string(),
            },
            Value::Increment(_) | Value::Patch(_) => "NULL".to_string(),
        }
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn initialize(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn execute(&self, sql: &str, intent: Intent) -> Result<ExecuteResult, Error> {
        self.executed.lock().push((sql.to_string(), intent));
        match self.script.lock().pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(Error::database(message, sql)),
            None => match intent {
                Intent::Read => Ok(ExecuteResult::Rows(Vec::new())),
                Intent::Write => Ok(ExecuteResult::Done { affected: 0 }),
            },
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_escaping() {
        let driver = MemoryDriver::new();
        assert_eq!(driver.escape_identifier("post"), "`post`");
        assert_eq!(driver.escape_identifier("weird`name"), "`weird``name`");
    }

    #[test]
    fn test_literal_escaping_is_injection_safe() {
        let driver = MemoryDriver::new();
        assert_eq!(driver.escape_literal(&Value::Null), "NULL");
        assert_eq!(driver.escape_literal(&Value::Int(7)), "7");
        assert_eq!(
            driver.escape_literal(&Value::String("it's; DROP TABLE x".into())),
            "'it\\'s; DROP TABLE x'"
        );
        assert_eq!(
            driver.escape_literal(&Value::String("back\\slash".into())),
            "'back\\\\slash'"
        );
    }

    #[test]
    fn test_pointer_literal_collapses_to_id() {
        let driver = MemoryDriver::new();
        let ptr = trellis_proto::Pointer::new("User", 7);
        assert_eq!(driver.escape_literal(&Value::Pointer(ptr)), "7");
    }

    #[tokio::test]
    async fn test_scripted_execution() {
        let driver = MemoryDriver::new();
        driver.push_inserted(42);
        driver.push_failure("connection reset");

        let result = driver.execute("INSERT ...", Intent::Write).await.unwrap();
        assert_eq!(result, ExecuteResult::Inserted { id: 42 });

        let err = driver.execute("SELECT ...", Intent::Read).await;
        assert!(matches!(err, Err(Error::Database { .. })));

        // Exhausted script falls back to empty results.
        let result = driver.execute("SELECT ...", Intent::Read).await.unwrap();
        assert_eq!(result, ExecuteResult::Rows(Vec::new()));

        assert_eq!(driver.executed().len(), 3);
    }
}
