//! Statement timing and `tracing` output.
//!
//! Every statement dispatched through the executor is timed and reported on the
//! `chainorm.sql` target: at `DEBUG` for all statements, at `WARN` when the duration crosses
//! the slow-query threshold. The library never installs a subscriber.

use crate::error::OrmError;
use crate::placeholder::{starts_with_keyword, strip_sql_prefix};
use crate::service::DbResult;
use std::time::Duration;

/// Target used for statement logging.
pub const SQL_TARGET: &str = "chainorm.sql";

/// The type of SQL operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    /// Transaction control, DDL, catalog queries
    Other,
}

impl QueryType {
    /// Detect the statement kind from its leading keyword.
    ///
    /// Leading comments and parentheses are skipped; `WITH ...` is treated as a select unless
    /// the final statement after the CTE list is a write.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") {
            QueryType::Select
        } else if starts_with_keyword(trimmed, "INSERT") {
            QueryType::Insert
        } else if starts_with_keyword(trimmed, "UPDATE") {
            QueryType::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            QueryType::Delete
        } else if starts_with_keyword(trimmed, "WITH") {
            Self::after_cte(trimmed)
        } else {
            QueryType::Other
        }
    }

    fn after_cte(sql: &str) -> Self {
        let mut depth = 0i32;
        let mut last_top_level = 0;
        for (i, b) in sql.bytes().enumerate() {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        last_top_level = i + 1;
                    }
                }
                _ => {}
            }
        }
        let rest = sql[last_top_level..].trim_start();
        if starts_with_keyword(rest, "INSERT") {
            QueryType::Insert
        } else if starts_with_keyword(rest, "UPDATE") {
            QueryType::Update
        } else if starts_with_keyword(rest, "DELETE") {
            QueryType::Delete
        } else {
            QueryType::Select
        }
    }

    /// Whether the statement produces a row set.
    pub fn returns_rows(self) -> bool {
        matches!(self, QueryType::Select)
    }
}

/// What is known about a statement when it is logged.
#[derive(Debug, Clone)]
pub struct QueryContext<'a> {
    pub sql: &'a str,
    pub param_count: usize,
    pub query_type: QueryType,
    pub table: Option<&'a str>,
}

impl<'a> QueryContext<'a> {
    pub fn new(sql: &'a str, param_count: usize) -> Self {
        Self {
            sql,
            param_count,
            query_type: QueryType::from_sql(sql),
            table: None,
        }
    }

    pub fn with_table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }
}

/// Statement logger.
#[derive(Debug, Clone)]
pub struct SqlLogger {
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Statements slower than this are reported at `WARN`.
    pub slow_query_threshold: Option<Duration>,
}

impl Default for SqlLogger {
    fn default() -> Self {
        Self {
            max_sql_length: Some(400),
            slow_query_threshold: None,
        }
    }
}

impl SqlLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn display_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql(sql, max)),
            _ => sql.to_string(),
        }
    }

    /// Whether `duration` crosses the slow-query threshold.
    pub fn is_slow(&self, duration: Duration) -> bool {
        self.slow_query_threshold.is_some_and(|t| duration >= t)
    }

    /// Report a finished statement.
    pub fn finish(
        &self,
        ctx: &QueryContext<'_>,
        duration: Duration,
        result: Result<&DbResult, &OrmError>,
    ) {
        let sql = self.display_sql(ctx.sql);
        let table = ctx.table.unwrap_or("-");
        let duration_ms = duration.as_secs_f64() * 1000.0;
        match result {
            Ok(res) => tracing::debug!(
                target: SQL_TARGET,
                query_type = ?ctx.query_type,
                table,
                param_count = ctx.param_count,
                rows = res.rows.len(),
                affected_rows = res.affected_rows,
                duration_ms,
                sql = %sql,
            ),
            Err(err) => tracing::debug!(
                target: SQL_TARGET,
                query_type = ?ctx.query_type,
                table,
                param_count = ctx.param_count,
                duration_ms,
                error = %err,
                sql = %sql,
            ),
        }
        if self.is_slow(duration) {
            tracing::warn!(
                target: SQL_TARGET,
                query_type = ?ctx.query_type,
                table,
                duration_ms,
                sql = %sql,
                "slow query"
            );
        }
    }
}

/// Truncate to at most `max_bytes`, backing off to a UTF-8 boundary.
pub fn truncate_sql(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_statement_kind() {
        assert_eq!(QueryType::from_sql("select 1"), QueryType::Select);
        assert_eq!(
            QueryType::from_sql("/* tag */ INSERT INTO `t` (a) VALUES (?)"),
            QueryType::Insert
        );
        assert_eq!(QueryType::from_sql("  update t set a = 1"), QueryType::Update);
        assert_eq!(QueryType::from_sql("DELETE FROM t"), QueryType::Delete);
        assert_eq!(QueryType::from_sql("BEGIN"), QueryType::Other);
        assert_eq!(
            QueryType::from_sql("WITH x AS (SELECT 1) DELETE FROM t USING x"),
            QueryType::Delete
        );
        assert_eq!(
            QueryType::from_sql("WITH x AS (SELECT 1) SELECT * FROM x"),
            QueryType::Select
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_sql("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_sql("héllo", 2), "h");
    }

    #[test]
    fn slow_threshold() {
        let log = SqlLogger::new().slow_query_threshold(Duration::from_millis(50));
        assert!(log.is_slow(Duration::from_millis(50)));
        assert!(!log.is_slow(Duration::from_millis(49)));
        assert!(!SqlLogger::new().is_slow(Duration::from_secs(60)));
    }
}
