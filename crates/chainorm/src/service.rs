//! The database execution service consumed by the ORM.
//!
//! Connection pooling and network I/O live behind these traits. The core only ever calls
//! `execute(sql, values)`; transactional flows additionally acquire a dedicated connection,
//! which goes back to the pool when the boxed handle is dropped.

use crate::dialect::Dialect;
use crate::error::OrmResult;
use crate::value::{Row, Value};

/// Raw outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbResult {
    /// Result rows, in driver order.
    pub rows: Vec<Row>,
    /// Column names of the result set.
    pub fields: Vec<String>,
    /// Generated id reported for an insert.
    pub insert_id: Option<i64>,
    /// Rows matched by a write.
    pub affected_rows: u64,
    /// Rows actually changed by a write (equal to `affected_rows` where the driver cannot tell).
    pub changed_rows: u64,
}

impl DbResult {
    /// Result of a row-returning statement.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let fields = rows
            .first()
            .map(|r| r.keys().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            rows,
            fields,
            ..Self::default()
        }
    }

    /// Result of a write.
    pub fn written(affected_rows: u64, insert_id: Option<i64>) -> Self {
        Self {
            insert_id,
            affected_rows,
            changed_rows: affected_rows,
            ..Self::default()
        }
    }

    /// The `count` column of the first row, as produced by counting statements.
    pub fn count(&self) -> Option<i64> {
        self.rows.first()?.get("count")?.as_i64()
    }

    /// Serialize the write metadata (and rows, if any) for callers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "insertId": self.insert_id,
            "affectedRows": self.affected_rows,
            "changedRows": self.changed_rows,
            "rows": self.rows.iter().map(Row::to_json).collect::<Vec<_>>(),
        })
    }
}

/// A dedicated connection checked out of the pool.
///
/// Dropping the handle releases it.
#[async_trait::async_trait]
pub trait DbConnection: Send {
    /// Execute one statement on this connection.
    async fn execute(&mut self, sql: &str, values: &[Value]) -> OrmResult<DbResult>;
}

/// A pooled database execution service.
#[async_trait::async_trait]
pub trait DbService: Send + Sync {
    /// Execute one statement on any pooled connection.
    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<DbResult>;

    /// Check out a dedicated connection.
    ///
    /// Pool exhaustion or network failure surfaces as `OrmError::Connection`.
    async fn acquire(&self) -> OrmResult<Box<dyn DbConnection>>;

    /// Whether `?` placeholders with bound values are accepted. When `false`, statements are
    /// sent with every value inlined as a literal.
    fn supports_placeholders(&self) -> bool {
        true
    }

    /// Dialect used to build statements for this service.
    fn dialect(&self) -> Dialect;
}
