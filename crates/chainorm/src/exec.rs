//! Statement execution against a [`DbService`].
//!
//! The executor turns a builder into a statement (placeholder form when the service supports
//! it, fully inlined otherwise), runs it with timing and an optional timeout, and reports it
//! through the [`SqlLogger`]. Transactions and pagination are built on top of `run_built`.

use crate::builder::{Built, QueryBuilder};
use crate::codec::ValueCodec;
use crate::config::OrmConfig;
use crate::error::{OrmError, OrmResult};
use crate::monitor::{QueryContext, SqlLogger};
use crate::placeholder;
use crate::service::{DbConnection, DbResult, DbService};
use crate::value::Row;
use std::future::Future;
use std::time::{Duration, Instant};

/// One page of a paginated find.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Always `true`; lets serialized pages be told apart from plain lists.
    pub paginate: bool,
    /// Total rows matching the filter, ignoring limit/offset.
    pub count: u64,
    /// `ceil(count / limit)`.
    pub pages: u64,
    /// 1-based page number.
    pub page: u64,
    pub limit: u64,
    pub offset: u64,
    pub rows: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            paginate: self.paginate,
            count: self.count,
            pages: self.pages,
            page: self.page,
            limit: self.limit,
            offset: self.offset,
            rows: self.rows.into_iter().map(f).collect(),
        }
    }
}

/// Resolved paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u64,
    pub limit: u64,
    pub offset: u64,
}

impl Paging {
    /// Window for a 1-based `page` of `size` rows. Pages below 1 are treated as 1; an
    /// explicit `offset` wins over the computed one. A page whose offset does not fit in
    /// a `u64` is rejected.
    pub fn new(page: u64, size: u64, offset: Option<u64>) -> OrmResult<Self> {
        let page = page.max(1);
        let offset = match offset {
            Some(offset) => offset,
            None => (page - 1).checked_mul(size).ok_or_else(|| {
                OrmError::validation(format!("page {page} of size {size} is out of range"))
            })?,
        };
        Ok(Self {
            page,
            limit: size,
            offset,
        })
    }

    /// Window from an explicit offset/limit pair; the page number is derived by rounding.
    pub fn from_offset(offset: u64, limit: u64) -> Self {
        let page = if limit == 0 {
            1
        } else {
            (offset as f64 / limit as f64).round() as u64 + 1
        };
        Self {
            page,
            limit,
            offset,
        }
    }

    pub fn pages_for(&self, count: u64) -> u64 {
        if self.limit == 0 {
            0
        } else {
            count.div_ceil(self.limit)
        }
    }
}

/// Runs statements with logging and an optional per-statement timeout.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    logger: SqlLogger,
    timeout: Option<Duration>,
}

impl Executor {
    pub fn new(logger: SqlLogger, timeout: Option<Duration>) -> Self {
        Self { logger, timeout }
    }

    pub fn from_config(config: &OrmConfig) -> Self {
        let mut logger = SqlLogger::new();
        if let Some(threshold) = config.slow_query_threshold() {
            logger = logger.slow_query_threshold(threshold);
        }
        Self::new(logger, config.query_timeout())
    }

    pub fn logger(&self) -> &SqlLogger {
        &self.logger
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Assemble `builder` for `service`: `?` placeholders with values, or everything
    /// inlined when the service cannot bind.
    pub fn statement(&self, service: &dyn DbService, builder: &QueryBuilder) -> OrmResult<Built> {
        let built = builder.to_param()?;
        self.prepare(service, built)
    }

    /// Adapt an assembled statement to `service`, inlining values when it cannot bind.
    pub fn prepare(&self, service: &dyn DbService, built: Built) -> OrmResult<Built> {
        if service.supports_placeholders() {
            return Ok(built);
        }
        let codec = ValueCodec::new(service.dialect());
        Ok(Built {
            text: placeholder::inline_all(&built.text, &built.values, &codec)?,
            values: Vec::new(),
        })
    }

    /// Build and run `builder` on any pooled connection.
    pub async fn run(
        &self,
        service: &dyn DbService,
        builder: &QueryBuilder,
        table: Option<&str>,
    ) -> OrmResult<(Built, DbResult)> {
        let built = self.statement(service, builder)?;
        let result = self.run_built(service, &built, table).await?;
        Ok((built, result))
    }

    /// Run an assembled statement on any pooled connection.
    pub async fn run_built(
        &self,
        service: &dyn DbService,
        built: &Built,
        table: Option<&str>,
    ) -> OrmResult<DbResult> {
        self.observe(built, table, service.execute(&built.text, &built.values))
            .await
    }

    /// Run an assembled statement inside `BEGIN` / `COMMIT` on a dedicated connection.
    ///
    /// Any failure rolls back and returns the original error. The connection is released
    /// when this returns.
    pub async fn run_in_transaction(
        &self,
        service: &dyn DbService,
        built: &Built,
        table: Option<&str>,
    ) -> OrmResult<DbResult> {
        let mut conn = service.acquire().await?;
        self.control(conn.as_mut(), "BEGIN").await?;

        let outcome = self
            .observe(built, table, conn.execute(&built.text, &built.values))
            .await;
        match outcome {
            Ok(result) => match self.control(conn.as_mut(), "COMMIT").await {
                Ok(()) => Ok(result),
                Err(e) => {
                    self.rollback(conn.as_mut()).await;
                    Err(e)
                }
            },
            Err(e) => {
                self.rollback(conn.as_mut()).await;
                Err(e)
            }
        }
    }

    async fn control(&self, conn: &mut dyn DbConnection, sql: &str) -> OrmResult<()> {
        let built = Built {
            text: sql.to_string(),
            values: Vec::new(),
        };
        self.observe(&built, None, conn.execute(sql, &[]))
            .await
            .map(|_| ())
    }

    async fn rollback(&self, conn: &mut dyn DbConnection) {
        if let Err(e) = self.control(conn, "ROLLBACK").await {
            tracing::warn!(target: crate::monitor::SQL_TARGET, error = %e, "rollback failed");
        }
    }

    /// Count matching rows, then fetch the requested window. Returns the window statement
    /// with the page.
    pub async fn paginate(
        &self,
        service: &dyn DbService,
        builder: &QueryBuilder,
        paging: Paging,
        table: Option<&str>,
    ) -> OrmResult<(Built, Page<Row>)> {
        let counting = self.prepare(service, builder.count_query(None)?)?;
        let count = self
            .run_built(service, &counting, table)
            .await?
            .count()
            .unwrap_or(0)
            .max(0) as u64;

        let mut window = builder.clone();
        window.limit(paging.limit)?.offset(paging.offset)?;
        let (built, result) = self.run(service, &window, table).await?;

        let page = Page {
            paginate: true,
            count,
            pages: paging.pages_for(count),
            page: paging.page,
            limit: paging.limit,
            offset: paging.offset,
            rows: result.rows,
        };
        Ok((built, page))
    }

    async fn observe<F>(&self, built: &Built, table: Option<&str>, fut: F) -> OrmResult<DbResult>
    where
        F: Future<Output = OrmResult<DbResult>>,
    {
        let mut ctx = QueryContext::new(&built.text, built.values.len());
        if let Some(table) = table {
            ctx = ctx.with_table(table);
        }

        let start = Instant::now();
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(res) => res,
                Err(_) => Err(OrmError::Timeout(limit)),
            },
            None => fut.await,
        };
        let result = result.map_err(|e| e.with_statement(&built.text, &built.values));
        self.logger.finish(&ctx, start.elapsed(), result.as_ref());
        result
    }
}
