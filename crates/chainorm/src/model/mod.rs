//! Table-bound chains that execute and wrap results.
//!
//! A [`ModelChain`] pairs a [`QueryBuilder`] with a table, a database service and chain
//! options. Starters (`find`, `insert`, `update`, `delete`, `count`) begin a statement; any
//! other call made right after a reset implicitly begins a `find` of `<table>.*`. Executing
//! the chain (`end`, `all`, `first`, `execute`, ...) resets it.
//!
//! ```ignore
//! let mut items = orm.model("items")?;
//! let cheap = items
//!     .where_("items.price < ?", params![10])?
//!     .order("items.price", true)?
//!     .all()
//!     .await?;
//!
//! items.update(row! { "price" => 12 })?.where_("items.id = ?", params![3])?;
//! items.execute().await?;
//! ```

mod types;

pub use types::{ActionEntry, DoOptions, OpMode, Outcome, PageRequest};

use crate::builder::{Built, Direction, JoinKind, QueryBuilder};
use crate::config::ModelConfig;
use crate::context::Orm;
use crate::error::{OrmError, OrmResult};
use crate::events::ModelEvent;
use crate::exec::{Page, Paging};
use crate::record::Record;
use crate::service::{DbResult, DbService};
use crate::value::{Row, Value};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

const TARGET: &str = "chainorm.model";

/// `where_map` key holding raw SQL fragments.
const RAW_CONDITIONS: &str = "_sql";

const WRITE_MODES: &[OpMode] = &[OpMode::Insert, OpMode::Update, OpMode::Delete];

#[derive(Clone)]
pub struct ModelChain {
    orm: Arc<Orm>,
    service: Arc<dyn DbService>,
    table: String,
    db_name: String,
    config: ModelConfig,
    query: QueryBuilder,
    op: OpMode,
    paging: Option<Paging>,
    raw: bool,
    action_data: Vec<ActionEntry>,
}

impl fmt::Debug for ModelChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelChain")
            .field("table", &self.table)
            .field("db_name", &self.db_name)
            .field("op", &self.op)
            .field("query", &self.query)
            .field("paging", &self.paging)
            .finish()
    }
}

impl ModelChain {
    pub(crate) fn new(
        orm: Arc<Orm>,
        service: Arc<dyn DbService>,
        table: &str,
        db_name: &str,
        config: ModelConfig,
    ) -> OrmResult<Self> {
        if table.trim().is_empty() {
            return Err(OrmError::MissingTableName(
                "a model needs a table name".into(),
            ));
        }
        let query = QueryBuilder::with_dialect(service.dialect());
        Ok(Self {
            orm,
            service,
            table: table.to_string(),
            db_name: db_name.to_string(),
            config,
            query,
            op: OpMode::AfterReset,
            paging: None,
            raw: false,
            action_data: Vec::new(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn orm(&self) -> &Arc<Orm> {
        &self.orm
    }

    pub fn op_mode(&self) -> OpMode {
        self.op
    }

    /// Chain calls recorded since the last starter.
    pub fn action_data(&self) -> &[ActionEntry] {
        &self.action_data
    }

    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    /// Drop any pending statement.
    pub fn reset(&mut self) -> &mut Self {
        self.query.reset();
        self.op = OpMode::AfterReset;
        self.paging = None;
        self.raw = false;
        self.action_data.clear();
        self
    }

    fn start(&mut self, op: OpMode) {
        self.reset();
        self.op = op;
        tracing::trace!(target: TARGET, table = %self.table, mode = %op, "chain started");
    }

    fn ensure_started(&mut self) -> OrmResult<()> {
        if self.op == OpMode::AfterReset {
            self.find(&[])?;
        }
        Ok(())
    }

    /// Reject `method` unless the chain is in one of `modes`. Checked before any I/O.
    fn expect_mode(&self, method: &'static str, modes: &[OpMode]) -> OrmResult<()> {
        if modes.contains(&self.op) {
            Ok(())
        } else {
            Err(OrmError::invalid_mode(method, self.op.as_str()))
        }
    }

    fn log_action(&mut self, op: &'static str, detail: serde_json::Value) {
        self.action_data.push(ActionEntry::new(op, detail));
    }

    /// `field` → `<table>.field` for bare column names and `*`.
    fn qualify(&self, field: &str) -> String {
        let bare = field == "*"
            || (!field.is_empty()
                && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        if bare {
            format!("{}.{field}", self.table)
        } else {
            field.to_string()
        }
    }

    // ==================== starters ====================

    /// Begin a find. Bare field names are qualified with the table; no fields selects
    /// `<table>.*`.
    pub fn find(&mut self, fields: &[&str]) -> OrmResult<&mut Self> {
        self.start(OpMode::Find);
        let qualified = fields.iter().map(|f| self.qualify(f)).collect::<Vec<_>>();
        let refs = qualified.iter().map(String::as_str).collect::<Vec<_>>();
        self.query.select(&self.table, &refs)?;
        self.log_action("find", json!(fields));
        Ok(self)
    }

    /// Begin a find for rows whose `field` equals `value`, or is one of its elements when
    /// `value` is an array.
    pub fn find_by(&mut self, field: &str, value: impl Into<Value>) -> OrmResult<&mut Self> {
        let value = value.into();
        self.find(&[])?;
        let d = self.query.dialect();
        let op = if value.is_array() { "IN" } else { "=" };
        let fragment = format!("{}.{} {op} ?", d.wrap(&self.table), d.wrap(field));
        self.where_(&fragment, vec![value])
    }

    /// Begin an insert; `fields` may be empty and filled with `set_fields` later.
    pub fn insert(&mut self, fields: Row) -> OrmResult<&mut Self> {
        self.start(OpMode::Insert);
        self.query.insert(&self.table)?;
        self.log_action("insert", fields.to_json());
        if !fields.is_empty() {
            self.query.insert_fields(fields)?;
        }
        Ok(self)
    }

    /// Begin a multi-row insert. Every row must carry the same keys.
    pub fn insert_many(&mut self, rows: Vec<Row>) -> OrmResult<&mut Self> {
        self.start(OpMode::Insert);
        self.query.insert(&self.table)?;
        self.log_action(
            "insert",
            serde_json::Value::Array(rows.iter().map(Row::to_json).collect()),
        );
        self.query.insert_rows(rows)?;
        Ok(self)
    }

    pub fn update(&mut self, fields: Row) -> OrmResult<&mut Self> {
        self.start(OpMode::Update);
        self.query.update(&self.table)?;
        self.log_action("update", fields.to_json());
        if !fields.is_empty() {
            self.query.update_fields(fields)?;
        }
        Ok(self)
    }

    pub fn delete(&mut self) -> OrmResult<&mut Self> {
        self.start(OpMode::Delete);
        self.query.delete(&self.table)?;
        self.log_action("delete", serde_json::Value::Null);
        Ok(self)
    }

    /// Begin a count of `field` (`<table>.<field>`, or verbatim when it contains a dot).
    /// The result is the `count` column of the first row.
    pub fn count(&mut self, field: &str) -> OrmResult<&mut Self> {
        self.start(OpMode::Count);
        let target = if field.contains('.') {
            field.to_string()
        } else {
            format!("{}.{field}", self.table)
        };
        let projection = format!("COUNT({target}) AS count");
        self.query.select(&self.table, &[projection.as_str()])?;
        self.log_action("count", json!(field));
        Ok(self)
    }

    // ==================== modifiers ====================

    pub fn where_(&mut self, fragment: &str, values: Vec<Value>) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        let detail = json!({
            "sql": fragment,
            "values": values.iter().map(Value::to_json).collect::<Vec<_>>(),
        });
        self.query.where_(fragment, values)?;
        self.log_action("where", detail);
        Ok(self)
    }

    /// AND-joined equality conditions from a field map. Bare keys are qualified with the
    /// table; array values become `IN ?` and nulls `IS NULL`. The `_sql` key carries extra
    /// raw fragments (a string or an array of strings) appended after the equalities.
    pub fn where_map(&mut self, conditions: Row) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        if conditions.is_empty() {
            return Ok(self);
        }
        let mut parts = Vec::with_capacity(conditions.len());
        let mut values = Vec::with_capacity(conditions.len());
        let mut extras = Vec::new();
        for (field, value) in conditions {
            if field == RAW_CONDITIONS {
                extras.extend(raw_fragments(value)?);
                continue;
            }
            let column = if field.contains('.') {
                field
            } else {
                format!("{}.{field}", self.table)
            };
            if value.is_null() {
                parts.push(format!("{column} IS NULL"));
            } else if value.is_array() {
                parts.push(format!("{column} IN ?"));
                values.push(value);
            } else {
                parts.push(format!("{column} = ?"));
                values.push(value);
            }
        }
        parts.extend(extras);
        if parts.is_empty() {
            return Ok(self);
        }
        self.where_(&parts.join(" AND "), values)
    }

    fn join_as(
        &mut self,
        kind: JoinKind,
        table: &str,
        on: &str,
        alias: Option<&str>,
    ) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        self.query.join(table, on, kind, alias)?;
        self.log_action(kind.action_name(), json!([table, on, alias]));
        Ok(self)
    }

    pub fn join(&mut self, table: &str, on: &str, alias: Option<&str>) -> OrmResult<&mut Self> {
        self.join_as(JoinKind::Inner, table, on, alias)
    }

    pub fn left_join(&mut self, table: &str, on: &str, alias: Option<&str>) -> OrmResult<&mut Self> {
        self.join_as(JoinKind::Left, table, on, alias)
    }

    pub fn outer_join(&mut self, table: &str, on: &str, alias: Option<&str>) -> OrmResult<&mut Self> {
        self.join_as(JoinKind::Outer, table, on, alias)
    }

    pub fn left_outer_join(
        &mut self,
        table: &str,
        on: &str,
        alias: Option<&str>,
    ) -> OrmResult<&mut Self> {
        self.join_as(JoinKind::LeftOuter, table, on, alias)
    }

    pub fn order(&mut self, field: &str, dir: impl Into<Direction>) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        let dir = dir.into();
        self.query.order(field, dir)?;
        self.log_action("order", json!([field, dir.as_sql()]));
        Ok(self)
    }

    /// `"field DIR"`; a missing direction is ascending.
    pub fn order_by(&mut self, expr: &str) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        self.query.order_by(expr)?;
        self.log_action("order", json!(expr));
        Ok(self)
    }

    pub fn group(&mut self, expr: &str) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        self.query.group(expr)?;
        self.log_action("group", json!(expr));
        Ok(self)
    }

    pub fn having(&mut self, expr: &str) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        self.query.having(expr)?;
        self.log_action("having", json!(expr));
        Ok(self)
    }

    /// Append an output expression; bare column names are table-qualified.
    pub fn field(&mut self, expr: &str) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        let qualified = self.qualify(expr);
        self.query.field(&qualified)?;
        self.log_action("field", json!(expr));
        Ok(self)
    }

    /// Append several output expressions, qualified like [`ModelChain::field`].
    pub fn fields(&mut self, exprs: &[&str]) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        let qualified = exprs.iter().map(|f| self.qualify(f)).collect::<Vec<_>>();
        let refs = qualified.iter().map(String::as_str).collect::<Vec<_>>();
        self.query.fields(&refs)?;
        self.log_action("fields", json!(exprs));
        Ok(self)
    }

    pub fn distinct(&mut self, field: Option<&str>) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        self.query.distinct(field)?;
        self.log_action("distinct", json!(field));
        Ok(self)
    }

    pub fn limit(&mut self, n: u64) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        self.query.limit(n)?;
        self.log_action("limit", json!(n));
        Ok(self)
    }

    pub fn offset(&mut self, n: u64) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        self.query.offset(n)?;
        self.log_action("offset", json!(n));
        Ok(self)
    }

    /// Merge fields into the pending insert or update.
    pub fn set_fields(&mut self, fields: Row) -> OrmResult<&mut Self> {
        let detail = fields.to_json();
        self.query.set_fields(fields)?;
        self.log_action("setFields", detail);
        Ok(self)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> OrmResult<&mut Self> {
        self.set_fields(Row::new().with(field, value))
    }

    /// Paginate the pending find: page `page` (1-based, values below 1 mean 1) of `size`
    /// rows, defaulting to the table's page size, then the global one.
    pub fn page(&mut self, page: u64, size: Option<u64>) -> OrmResult<&mut Self> {
        self.page_with(PageRequest {
            page: Some(page),
            limit: size,
            offset: None,
        })
    }

    /// Paginate with explicit arguments. An offset + limit pair derives the page number;
    /// otherwise the offset (if any) overrides the computed one.
    pub fn page_with(&mut self, req: PageRequest) -> OrmResult<&mut Self> {
        self.ensure_started()?;
        if self.op != OpMode::Find {
            return Err(OrmError::invalid_mode("page", self.op.as_str()));
        }
        let paging = match (req.offset, req.limit) {
            (Some(offset), Some(limit)) if req.page.is_none() => Paging::from_offset(offset, limit),
            _ => {
                let size = req
                    .limit
                    .or(self.config.page_size)
                    .unwrap_or(self.orm.config().page_size);
                Paging::new(req.page.unwrap_or(1), size, req.offset)?
            }
        };
        self.paging = Some(paging);
        self.log_action("page", json!([paging.page, paging.limit, paging.offset]));
        Ok(self)
    }

    /// Return plain rows from the next execution.
    pub fn raw(&mut self) -> &mut Self {
        self.raw = true;
        self
    }

    /// Apply the named scope registered for this table. Unknown scopes are a no-op.
    pub fn scope(&mut self, name: &str, args: &[Value]) -> OrmResult<&mut Self> {
        let table = self.table.clone();
        self.scope_from(&table, name, args)
    }

    /// Apply a scope registered for another table to this chain.
    pub fn scope_from(&mut self, table: &str, name: &str, args: &[Value]) -> OrmResult<&mut Self> {
        match self.orm.scope(table, name) {
            Some(scope) => scope(self, args)?,
            None => tracing::debug!(target: TARGET, table, scope = name, "unknown scope ignored"),
        }
        Ok(self)
    }

    // ==================== output ====================

    pub fn to_param(&self) -> OrmResult<Built> {
        self.query.to_param()
    }

    pub fn to_sql_string(&self) -> OrmResult<String> {
        self.query.to_sql_string()
    }

    /// Log the inlined statement at `DEBUG` and return it.
    pub fn debug_sql(&self) -> OrmResult<String> {
        let sql = self.query.to_sql_string()?;
        tracing::debug!(target: TARGET, table = %self.table, mode = %self.op, sql = %sql);
        Ok(sql)
    }

    // ==================== execution ====================

    /// Execute the pending statement and reset the chain.
    ///
    /// Finds return records (or rows when raw), a single one with `first`/`last`, or a
    /// page when paginated. Counts return the count. Inserts that report a generated id
    /// return the freshly fetched row; other writes return the driver result.
    pub async fn end(&mut self, opts: DoOptions) -> OrmResult<Outcome> {
        self.run(opts, None, true).await
    }

    /// [`ModelChain::end`] wrapped in `BEGIN`/`COMMIT` on a dedicated connection.
    pub async fn end_in_transaction(&mut self, opts: DoOptions) -> OrmResult<Outcome> {
        self.run(opts.transaction(), None, true).await
    }

    /// Execute a find and return records, regardless of the raw setting.
    pub async fn all(&mut self) -> OrmResult<Vec<Record>> {
        self.ensure_started()?;
        self.expect_mode("all", &[OpMode::Find])?;
        self.run(DoOptions::default(), Some(false), true)
            .await?
            .into_records()
    }

    /// Execute a find and return plain rows.
    pub async fn rows(&mut self) -> OrmResult<Vec<Row>> {
        self.ensure_started()?;
        self.expect_mode("rows", &[OpMode::Find])?;
        self.run(DoOptions::default(), Some(true), true)
            .await?
            .into_rows()
    }

    /// `LIMIT 1` and return the first record, if any.
    pub async fn first(&mut self) -> OrmResult<Option<Record>> {
        self.ensure_started()?;
        self.expect_mode("first", &[OpMode::Find])?;
        self.paging = None;
        self.query.limit(1)?;
        self.run(DoOptions::first(), Some(false), true)
            .await?
            .into_record()
    }

    /// Add a condition and return the first matching record.
    pub async fn one(&mut self, fragment: &str, values: Vec<Value>) -> OrmResult<Option<Record>> {
        self.where_(fragment, values)?;
        self.first().await
    }

    /// Return the last record of the result set.
    pub async fn last(&mut self) -> OrmResult<Option<Record>> {
        self.ensure_started()?;
        self.expect_mode("last", &[OpMode::Find])?;
        self.run(DoOptions::last(), Some(false), true)
            .await?
            .into_record()
    }

    /// Execute a write and return the driver result, without refetching inserted rows.
    pub async fn execute(&mut self) -> OrmResult<DbResult> {
        self.expect_mode("execute", WRITE_MODES)?;
        self.run(DoOptions::default(), None, false)
            .await?
            .into_written()
    }

    /// Execute a write inside a transaction on a dedicated connection.
    pub async fn execute_in_transaction(&mut self) -> OrmResult<DbResult> {
        self.expect_mode("execute", WRITE_MODES)?;
        self.run(DoOptions::default().transaction(), None, false)
            .await?
            .into_written()
    }

    /// Execute a pending `count`.
    pub async fn fetch_count(&mut self) -> OrmResult<i64> {
        self.expect_mode("count", &[OpMode::Count])?;
        self.run(DoOptions::default(), None, true)
            .await?
            .into_count()
    }

    /// Paginate the pending find (or `<table>.*`) and execute it.
    pub async fn do_page(&mut self, req: PageRequest) -> OrmResult<Page<Record>> {
        self.page_with(req)?;
        self.run(DoOptions::default(), Some(false), true)
            .await?
            .into_page()
    }

    /// Update the rows matching the condition if one exists, otherwise insert `fields`.
    ///
    /// The existence check and the write are separate statements; concurrent callers can
    /// both take the insert path.
    pub async fn upsert(
        &mut self,
        fields: Row,
        fragment: &str,
        values: Vec<Value>,
    ) -> OrmResult<Outcome> {
        self.find(&[])?;
        let existing = self.one(fragment, values.clone()).await?;
        if existing.is_some() {
            self.update(fields)?.where_(fragment, values)?;
        } else {
            self.insert(fields)?;
        }
        self.end(DoOptions::default()).await
    }

    /// Whether the table exists in the connected database.
    pub async fn exists(&self) -> OrmResult<bool> {
        let executor = self.orm.executor();
        let built = executor.prepare(
            &*self.service,
            Built {
                text: self.query.dialect().table_exists_sql().to_string(),
                values: vec![Value::from(self.table.as_str())],
            },
        )?;
        let result = executor
            .run_built(&*self.service, &built, Some(&self.table))
            .await?;
        Ok(result.count().unwrap_or(0) > 0)
    }

    async fn run(
        &mut self,
        opts: DoOptions,
        raw: Option<bool>,
        refetch: bool,
    ) -> OrmResult<Outcome> {
        if self.op == OpMode::AfterReset {
            return Err(OrmError::invalid_mode("end", OpMode::AfterReset.as_str()));
        }
        let raw = raw.unwrap_or(opts.raw || self.raw || self.config.raw);
        let outcome = self.run_pending(opts, raw, refetch).await;
        self.reset();
        outcome
    }

    async fn run_pending(&self, opts: DoOptions, raw: bool, refetch: bool) -> OrmResult<Outcome> {
        if opts.debug || self.config.debug {
            self.debug_sql()?;
        }
        let op = self.op;
        let executor = self.orm.executor();

        if let Some(paging) = self.paging {
            let (built, page) = executor
                .paginate(&*self.service, &self.query, paging, Some(&self.table))
                .await?;
            if !opts.bypass_events && self.has_listeners(op) {
                self.emit(op, &built, &DbResult::from_rows(page.rows.clone()));
            }
            return Ok(if raw {
                Outcome::RowPage(page)
            } else {
                Outcome::Page(page.map(|row| self.wrap(row)))
            });
        }

        let built = executor.statement(&*self.service, &self.query)?;
        let result = if opts.transaction {
            executor
                .run_in_transaction(&*self.service, &built, Some(&self.table))
                .await?
        } else {
            executor
                .run_built(&*self.service, &built, Some(&self.table))
                .await?
        };
        if !opts.bypass_events {
            self.emit(op, &built, &result);
        }

        match op {
            OpMode::Count => Ok(Outcome::Count(result.count().unwrap_or(0))),
            OpMode::Find => Ok(self.shape(result.rows, raw, opts)),
            OpMode::Insert => match result.insert_id {
                Some(id) if refetch => self.refetch(id, raw).await,
                _ => Ok(Outcome::Written(result)),
            },
            OpMode::Update | OpMode::Delete => Ok(Outcome::Written(result)),
            OpMode::AfterReset => Err(OrmError::invalid_mode("end", op.as_str())),
        }
    }

    fn shape(&self, mut rows: Vec<Row>, raw: bool, opts: DoOptions) -> Outcome {
        let single = if opts.last {
            rows.pop()
        } else if opts.first {
            rows.into_iter().next()
        } else if raw {
            return Outcome::Rows(rows);
        } else {
            return Outcome::Records(rows.into_iter().map(|r| self.wrap(r)).collect());
        };
        if raw {
            Outcome::Row(single)
        } else {
            Outcome::Record(single.map(|r| self.wrap(r)))
        }
    }

    /// Fetch a freshly inserted row by id.
    async fn refetch(&self, id: i64, raw: bool) -> OrmResult<Outcome> {
        let mut q = QueryBuilder::with_dialect(self.query.dialect());
        q.select(&self.table, &[])?
            .where_(&format!("{}.id = ?", self.table), vec![Value::Int(id)])?
            .limit(1)?;
        let (_, result) = self
            .orm
            .executor()
            .run(&*self.service, &q, Some(&self.table))
            .await?;
        let row = result.rows.into_iter().next();
        Ok(if raw {
            Outcome::Row(row)
        } else {
            Outcome::Record(row.map(|r| self.wrap(r)))
        })
    }

    fn wrap(&self, row: Row) -> Record {
        Record::loaded(&self.orm, &self.table, &self.db_name, row, self.config.strict)
    }

    fn has_listeners(&self, op: OpMode) -> bool {
        op.event_kind()
            .is_some_and(|kind| self.orm.events().listener_count(&self.table, kind) > 0)
    }

    fn emit(&self, op: OpMode, params: &Built, result: &DbResult) {
        let Some(kind) = op.event_kind() else {
            return;
        };
        self.orm.events().emit(&ModelEvent {
            table: &self.table,
            db_name: &self.db_name,
            kind,
            action_data: &self.action_data,
            params,
            result,
        });
    }
}

fn raw_fragments(value: Value) -> OrmResult<Vec<String>> {
    match value {
        Value::Text(s) | Value::Raw(s) => Ok(vec![s]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Text(s) | Value::Raw(s) => Ok(s),
                other => Err(OrmError::validation(format!(
                    "{RAW_CONDITIONS} entries must be strings, got {other}"
                ))),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(OrmError::validation(format!(
            "{RAW_CONDITIONS} must be a string or a list of strings, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests;
