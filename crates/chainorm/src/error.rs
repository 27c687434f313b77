//! Error types for chainorm

use crate::value::Value;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for chainorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query building and execution.
///
/// Build-time errors (`InvalidModeOperation`, `MissingTableName`, `MismatchedInsertKeys`,
/// `PlaceholderMismatch`, `UnsupportedValueType`) are returned synchronously and never
/// reach the database.
#[derive(Debug, Error)]
pub enum OrmError {
    /// A builder method was called in a mode that does not support it.
    #[error("cant run [{method}] in :{mode} mode")]
    InvalidModeOperation { method: &'static str, mode: String },

    /// The statement has no target table.
    #[error("Missing table name: {0}")]
    MissingTableName(String),

    /// Rows of a multi-row insert do not share the same key set.
    #[error("Mismatched insert keys in row {row}: expected [{expected}], found [{found}]")]
    MismatchedInsertKeys {
        row: usize,
        expected: String,
        found: String,
    },

    /// Number of `?` placeholders differs from the number of bound values.
    #[error("Placeholder mismatch: {placeholders} placeholders, {values} values")]
    PlaceholderMismatch { placeholders: usize, values: usize },

    /// A value cannot be encoded as a SQL literal.
    #[error("Unsupported value type: {0}")]
    UnsupportedValueType(String),

    /// Access to a field the record does not carry.
    #[error("Field '{field}' not found on {table} record")]
    NotFoundField { table: String, field: String },

    /// Database-reported failure, with the attempted statement attached.
    #[error("Execution error: {message} (sql: {sql})")]
    Execution {
        message: String,
        sql: String,
        values: Vec<Value>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection acquisition failure (pool exhaustion, network).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(Duration),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create an invalid-mode error for `method` called while in `mode`.
    pub fn invalid_mode(method: &'static str, mode: impl Into<String>) -> Self {
        Self::InvalidModeOperation {
            method,
            mode: mode.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an unsupported-value error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedValueType(message.into())
    }

    /// Create an execution error without an underlying driver error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql: String::new(),
            values: Vec::new(),
            source: None,
        }
    }

    /// Attach the attempted statement to an execution error.
    ///
    /// Other variants are returned unchanged.
    pub fn with_statement(self, sql: &str, values: &[Value]) -> Self {
        match self {
            Self::Execution {
                message,
                sql: old_sql,
                values: old_values,
                source,
            } if old_sql.is_empty() => Self::Execution {
                message,
                sql: sql.to_string(),
                values: if old_values.is_empty() {
                    values.to_vec()
                } else {
                    old_values
                },
                source,
            },
            other => other,
        }
    }

    /// Programmer errors detected while building a statement.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::InvalidModeOperation { .. }
                | Self::MissingTableName(_)
                | Self::MismatchedInsertKeys { .. }
                | Self::PlaceholderMismatch { .. }
        )
    }

    /// Check if this is an invalid-mode error
    pub fn is_invalid_mode(&self) -> bool {
        matches!(self, Self::InvalidModeOperation { .. })
    }

    /// Check if this is an unknown-field error
    pub fn is_not_found_field(&self) -> bool {
        matches!(self, Self::NotFoundField { .. })
    }

    /// Check if this error came from connection acquisition.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Pool(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The SQL text attached to an execution error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execution { sql, .. } if !sql.is_empty() => Some(sql),
            _ => None,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(feature = "pool")]
impl From<tokio_postgres::Error> for OrmError {
    fn from(err: tokio_postgres::Error) -> Self {
        let message = match err.as_db_error() {
            Some(db_err) => format!("{}: {}", db_err.code().code(), db_err.message()),
            None => err.to_string(),
        };
        Self::Execution {
            message,
            sql: String::new(),
            values: Vec::new(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_mode_message_names_method_and_mode() {
        let err = OrmError::invalid_mode("where", "insert");
        assert_eq!(err.to_string(), "cant run [where] in :insert mode");
        assert!(err.is_usage());
    }

    #[test]
    fn with_statement_fills_execution_context_once() {
        let err = OrmError::execution("syntax error")
            .with_statement("SELECT ?", &[Value::Int(1)])
            .with_statement("SELECT 2", &[]);
        assert_eq!(err.sql(), Some("SELECT ?"));
        match err {
            OrmError::Execution { values, .. } => assert_eq!(values, vec![Value::Int(1)]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn with_statement_leaves_other_variants() {
        let err = OrmError::Connection("refused".into()).with_statement("SELECT 1", &[]);
        assert!(err.is_connection());
        assert_eq!(err.sql(), None);
    }
}
