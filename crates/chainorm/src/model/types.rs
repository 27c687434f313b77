use crate::error::{OrmError, OrmResult};
use crate::events::EventKind;
use crate::exec::Page;
use crate::record::Record;
use crate::service::DbResult;
use crate::value::Row;
use std::fmt;

/// State of a [`ModelChain`](super::ModelChain) between executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpMode {
    /// Fresh or just executed; the next non-starter call implicitly begins a find.
    #[default]
    AfterReset,
    Find,
    Insert,
    Update,
    Delete,
    Count,
}

impl OpMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            OpMode::AfterReset => "afterReset",
            OpMode::Find => "find",
            OpMode::Insert => "insert",
            OpMode::Update => "update",
            OpMode::Delete => "delete",
            OpMode::Count => "count",
        }
    }

    pub const fn event_kind(self) -> Option<EventKind> {
        match self {
            OpMode::AfterReset => None,
            OpMode::Find => Some(EventKind::Find),
            OpMode::Insert => Some(EventKind::Insert),
            OpMode::Update => Some(EventKind::Update),
            OpMode::Delete => Some(EventKind::Delete),
            OpMode::Count => Some(EventKind::Count),
        }
    }
}

impl fmt::Display for OpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-execution options for [`ModelChain::end`](super::ModelChain::end).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoOptions {
    /// Return only the first row.
    pub first: bool,
    /// Return only the last row.
    pub last: bool,
    /// Return plain rows instead of records.
    pub raw: bool,
    /// Log the inlined statement before running it.
    pub debug: bool,
    /// Skip event emission.
    pub bypass_events: bool,
    /// Run inside `BEGIN` / `COMMIT` on a dedicated connection.
    pub transaction: bool,
}

impl DoOptions {
    pub fn first() -> Self {
        Self {
            first: true,
            ..Self::default()
        }
    }

    pub fn last() -> Self {
        Self {
            last: true,
            ..Self::default()
        }
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    pub fn bypass_events(mut self) -> Self {
        self.bypass_events = true;
        self
    }

    pub fn transaction(mut self) -> Self {
        self.transaction = true;
        self
    }
}

/// Explicit paging arguments. `offset` + `limit` together take precedence over `page`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl PageRequest {
    pub fn page(page: u64) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    pub fn window(offset: u64, limit: u64) -> Self {
        Self {
            page: None,
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One chain call recorded for event listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEntry {
    pub op: &'static str,
    pub detail: serde_json::Value,
}

impl ActionEntry {
    pub fn new(op: &'static str, detail: serde_json::Value) -> Self {
        Self { op, detail }
    }
}

/// Result of executing a chain; the variant depends on the op mode and options.
#[derive(Debug, Clone)]
pub enum Outcome {
    Records(Vec<Record>),
    Rows(Vec<Row>),
    Record(Option<Record>),
    Row(Option<Row>),
    Page(Page<Record>),
    RowPage(Page<Row>),
    Written(DbResult),
    Count(i64),
}

impl Outcome {
    fn kind(&self) -> &'static str {
        match self {
            Outcome::Records(_) => "records",
            Outcome::Rows(_) => "rows",
            Outcome::Record(_) => "record",
            Outcome::Row(_) => "row",
            Outcome::Page(_) => "page",
            Outcome::RowPage(_) => "row page",
            Outcome::Written(_) => "write result",
            Outcome::Count(_) => "count",
        }
    }

    fn mismatch(&self, wanted: &str) -> OrmError {
        OrmError::validation(format!("expected {wanted}, chain returned {}", self.kind()))
    }

    pub fn into_records(self) -> OrmResult<Vec<Record>> {
        match self {
            Outcome::Records(records) => Ok(records),
            Outcome::Record(record) => Ok(record.into_iter().collect()),
            other => Err(other.mismatch("records")),
        }
    }

    pub fn into_record(self) -> OrmResult<Option<Record>> {
        match self {
            Outcome::Record(record) => Ok(record),
            Outcome::Records(records) => Ok(records.into_iter().next()),
            other => Err(other.mismatch("a record")),
        }
    }

    /// Plain rows; records are unwrapped to their data.
    pub fn into_rows(self) -> OrmResult<Vec<Row>> {
        match self {
            Outcome::Rows(rows) => Ok(rows),
            Outcome::Row(row) => Ok(row.into_iter().collect()),
            Outcome::Records(records) => Ok(records.into_iter().map(Record::into_row).collect()),
            Outcome::Record(record) => Ok(record.into_iter().map(Record::into_row).collect()),
            other => Err(other.mismatch("rows")),
        }
    }

    pub fn into_row(self) -> OrmResult<Option<Row>> {
        Ok(self.into_rows()?.into_iter().next())
    }

    pub fn into_page(self) -> OrmResult<Page<Record>> {
        match self {
            Outcome::Page(page) => Ok(page),
            other => Err(other.mismatch("a page")),
        }
    }

    pub fn into_row_page(self) -> OrmResult<Page<Row>> {
        match self {
            Outcome::RowPage(page) => Ok(page),
            Outcome::Page(page) => Ok(page.map(Record::into_row)),
            other => Err(other.mismatch("a page")),
        }
    }

    pub fn into_written(self) -> OrmResult<DbResult> {
        match self {
            Outcome::Written(result) => Ok(result),
            other => Err(other.mismatch("a write result")),
        }
    }

    pub fn into_count(self) -> OrmResult<i64> {
        match self {
            Outcome::Count(n) => Ok(n),
            other => Err(other.mismatch("a count")),
        }
    }
}
