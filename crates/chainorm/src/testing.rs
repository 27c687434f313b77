//! Scripted in-memory [`DbService`] for tests.
//!
//! Every statement is recorded. Results are served from a FIFO script; an empty script
//! answers with an empty result. Transaction control statements (`BEGIN`, `COMMIT`,
//! `ROLLBACK`) are recorded but never consume scripted results.

use crate::config::{DatabaseConfig, OrmConfig};
use crate::context::Orm;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::service::{DbConnection, DbResult, DbService};
use crate::value::{Row, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub sql: String,
    pub values: Vec<Value>,
    /// Ran on a connection from `acquire` rather than the pool.
    pub on_connection: bool,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Call>,
    script: VecDeque<OrmResult<DbResult>>,
    fail_acquire: bool,
}

/// Cloning shares the script and the call log.
#[derive(Debug, Clone)]
pub struct MockService {
    dialect: Dialect,
    placeholders: bool,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    pub fn new() -> Self {
        Self {
            dialect: Dialect::Mysql,
            placeholders: true,
            state: Arc::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Report no placeholder support, so statements arrive fully inlined.
    pub fn without_placeholders(mut self) -> Self {
        self.placeholders = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_result(&self, result: DbResult) -> &Self {
        self.state().script.push_back(Ok(result));
        self
    }

    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.push_result(DbResult::from_rows(rows))
    }

    pub fn push_error(&self, err: OrmError) -> &Self {
        self.state().script.push_back(Err(err));
        self
    }

    /// Make every later `acquire` fail with a connection error.
    pub fn fail_acquire(&self) {
        self.state().fail_acquire = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.state().calls.iter().map(|c| c.sql.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn answer(&self, sql: &str, values: &[Value], on_connection: bool) -> OrmResult<DbResult> {
        let mut state = self.state();
        state.calls.push(Call {
            sql: sql.to_string(),
            values: values.to_vec(),
            on_connection,
        });
        if is_transaction_control(sql) {
            return Ok(DbResult::default());
        }
        state.script.pop_front().unwrap_or_else(|| Ok(DbResult::default()))
    }
}

fn is_transaction_control(sql: &str) -> bool {
    ["BEGIN", "COMMIT", "ROLLBACK"]
        .iter()
        .any(|kw| sql.trim().eq_ignore_ascii_case(kw))
}

#[async_trait::async_trait]
impl DbService for MockService {
    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<DbResult> {
        self.answer(sql, values, false)
    }

    async fn acquire(&self) -> OrmResult<Box<dyn DbConnection>> {
        if self.state().fail_acquire {
            return Err(OrmError::Connection("mock pool exhausted".into()));
        }
        Ok(Box::new(MockConnection {
            service: self.clone(),
        }))
    }

    fn supports_placeholders(&self) -> bool {
        self.placeholders
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}

struct MockConnection {
    service: MockService,
}

#[async_trait::async_trait]
impl DbConnection for MockConnection {
    async fn execute(&mut self, sql: &str, values: &[Value]) -> OrmResult<DbResult> {
        self.service.answer(sql, values, true)
    }
}

/// An [`Orm`] whose single database `main` is served by `mock`.
pub fn mock_orm(mock: &MockService) -> OrmResult<Arc<Orm>> {
    mock_orm_with(mock, OrmConfig::single(DatabaseConfig::new("main", "mock://main")))
}

/// Like [`mock_orm`] with a caller-supplied config; every configured database is served by
/// `mock`.
pub fn mock_orm_with(mock: &MockService, config: OrmConfig) -> OrmResult<Arc<Orm>> {
    let mock = mock.clone();
    Orm::builder(config)
        .service_factory(
            move |_: &DatabaseConfig| -> OrmResult<Arc<dyn DbService>> {
                Ok(Arc::new(mock.clone()))
            },
        )
        .build()
}
