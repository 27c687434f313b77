//! Mode-aware SQL chain builder.
//!
//! A [`QueryBuilder`] holds exactly one statement mode at a time. Starters (`select`,
//! `insert`, `update`, `delete`) reset the chain; modifiers are checked against the current
//! mode and fail with [`OrmError::InvalidModeOperation`] instead of being ignored.
//!
//! ```ignore
//! use chainorm::{params, QueryBuilder};
//!
//! let mut q = QueryBuilder::new();
//! q.select("items", &["id", "name"])?
//!     .where_("proto_id = ?", params![7])?
//!     .order("name", true)?
//!     .limit(10)?;
//! assert_eq!(
//!     q.to_sql_string()?,
//!     "SELECT id,name FROM items WHERE proto_id = 7 ORDER BY name ASC LIMIT 10"
//! );
//! ```
//!
//! Output always uses `?` placeholders. An array bound to `IN ?` is inlined as a literal
//! list when the statement is assembled.

mod render;
mod state;

pub use state::{
    Chain, DeleteState, Direction, InsertState, Join, JoinKind, Mode, SelectState, UpdateState,
    WhereClause,
};

use crate::codec::ValueCodec;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::placeholder;
use crate::value::{Row, Value};

/// Assembled statement text with its ordered bound values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Built {
    pub text: String,
    pub values: Vec<Value>,
}

/// Fluent, clonable SQL chain.
///
/// `clone()` is a deep copy: the clone shares no state with the original.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryBuilder {
    dialect: Dialect,
    chain: Chain,
}

impl QueryBuilder {
    /// Create an empty builder for the default (MySQL) dialect.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            chain: Chain::Empty,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Current statement mode.
    pub fn mode(&self) -> Mode {
        self.chain.mode()
    }

    /// Target table of the current chain.
    pub fn table(&self) -> Option<&str> {
        self.chain.table()
    }

    /// Read-only view of the chain state.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Clear all state.
    pub fn reset(&mut self) -> &mut Self {
        self.chain = Chain::Empty;
        self
    }

    fn invalid(&self, method: &'static str) -> OrmError {
        OrmError::invalid_mode(method, self.chain.mode().as_str())
    }

    fn require_table(method: &'static str, table: &str) -> OrmResult<String> {
        let table = table.trim();
        if table.is_empty() {
            return Err(OrmError::MissingTableName(method.to_string()));
        }
        Ok(table.to_string())
    }

    // ==================== starters ====================

    /// Start a SELECT. Empty `fields` selects `<table>.*`.
    ///
    /// Fails while the chain is in insert or update mode.
    pub fn select(&mut self, table: &str, fields: &[&str]) -> OrmResult<&mut Self> {
        if matches!(self.chain, Chain::Insert(_) | Chain::Update(_)) {
            return Err(self.invalid("select"));
        }
        let table = Self::require_table("select", table)?;
        let fields = if fields.is_empty() {
            vec![format!("{table}.*")]
        } else {
            fields.iter().map(|f| f.to_string()).collect()
        };
        self.chain = Chain::Select(SelectState {
            table,
            fields,
            ..SelectState::default()
        });
        Ok(self)
    }

    /// Start an UPDATE.
    pub fn update(&mut self, table: &str) -> OrmResult<&mut Self> {
        let table = Self::require_table("update", table)?;
        self.chain = Chain::Update(UpdateState {
            table,
            ..UpdateState::default()
        });
        Ok(self)
    }

    /// Start an INSERT.
    pub fn insert(&mut self, table: &str) -> OrmResult<&mut Self> {
        let table = Self::require_table("insert", table)?;
        self.chain = Chain::Insert(InsertState {
            table,
            rows: Vec::new(),
        });
        Ok(self)
    }

    /// Start a DELETE.
    pub fn delete(&mut self, table: &str) -> OrmResult<&mut Self> {
        let table = Self::require_table("delete", table)?;
        self.chain = Chain::Delete(DeleteState {
            table,
            ..DeleteState::default()
        });
        Ok(self)
    }

    // ==================== modifiers ====================

    /// Replace the table of a select or delete chain.
    pub fn from(&mut self, table: &str) -> OrmResult<&mut Self> {
        let table = Self::require_table("from", table)?;
        match &mut self.chain {
            Chain::Select(s) => s.table = table,
            Chain::Delete(s) => s.table = table,
            _ => return Err(self.invalid("from")),
        }
        Ok(self)
    }

    /// Add extra comma-joined FROM tables.
    pub fn extra_from(&mut self, tables: &[&str]) -> OrmResult<&mut Self> {
        let s = self.select_state("extra_from")?;
        s.extra_tables
            .extend(tables.iter().filter(|t| !t.is_empty()).map(|t| t.to_string()));
        Ok(self)
    }

    /// Append one output expression.
    pub fn field(&mut self, expr: &str) -> OrmResult<&mut Self> {
        let s = self.select_state("field")?;
        s.fields.push(expr.to_string());
        Ok(self)
    }

    /// Append several output expressions.
    pub fn fields(&mut self, exprs: &[&str]) -> OrmResult<&mut Self> {
        let s = self.select_state("fields")?;
        s.fields.extend(exprs.iter().map(|f| f.to_string()));
        Ok(self)
    }

    /// Append a join. Valid for select and update.
    pub fn join(
        &mut self,
        table: &str,
        on: &str,
        kind: JoinKind,
        alias: Option<&str>,
    ) -> OrmResult<&mut Self> {
        let join = Join {
            table: table.to_string(),
            alias: alias.filter(|a| !a.is_empty()).map(str::to_string),
            on: on.to_string(),
            kind,
        };
        match &mut self.chain {
            Chain::Select(s) => s.joins.push(join),
            Chain::Update(s) => s.joins.push(join),
            _ => return Err(self.invalid(kind.action_name())),
        }
        Ok(self)
    }

    /// Append one AND-joined WHERE fragment with its bound values.
    pub fn where_(&mut self, fragment: &str, values: Vec<Value>) -> OrmResult<&mut Self> {
        let clause = WhereClause {
            fragment: fragment.to_string(),
            values,
        };
        match &mut self.chain {
            Chain::Select(s) => s.wheres.push(clause),
            Chain::Update(s) => s.wheres.push(clause),
            Chain::Delete(s) => s.wheres.push(clause),
            _ => return Err(self.invalid("where")),
        }
        Ok(self)
    }

    /// `SELECT DISTINCT <field>`; defaults to `<table>.id`.
    pub fn distinct(&mut self, field: Option<&str>) -> OrmResult<&mut Self> {
        let s = self.select_state("distinct")?;
        s.distinct = Some(match field {
            Some(f) if !f.is_empty() => f.to_string(),
            _ => format!("{}.id", s.table),
        });
        Ok(self)
    }

    pub fn limit(&mut self, n: u64) -> OrmResult<&mut Self> {
        match &mut self.chain {
            Chain::Select(s) => s.limit = Some(n),
            Chain::Delete(s) => s.limit = Some(n),
            _ => return Err(self.invalid("limit")),
        }
        Ok(self)
    }

    pub fn offset(&mut self, n: u64) -> OrmResult<&mut Self> {
        self.select_state("offset")?.offset = Some(n);
        Ok(self)
    }

    /// Append an ORDER BY entry.
    ///
    /// `dir` accepts a [`Direction`], a bool (`true` = ascending) or `"asc"`/`"desc"` in any case.
    pub fn order(&mut self, field: &str, dir: impl Into<Direction>) -> OrmResult<&mut Self> {
        let entry = (field.trim().to_string(), dir.into());
        match &mut self.chain {
            Chain::Select(s) => s.order.push(entry),
            Chain::Delete(s) => s.order.push(entry),
            _ => return Err(self.invalid("order")),
        }
        Ok(self)
    }

    /// Append an ORDER BY entry from a combined `"field DIR"` string (ascending when no
    /// direction is given).
    pub fn order_by(&mut self, expr: &str) -> OrmResult<&mut Self> {
        let (field, dir) = split_order(expr);
        self.order(field, dir)
    }

    pub fn group(&mut self, expr: &str) -> OrmResult<&mut Self> {
        self.select_state("group")?.group = Some(expr.to_string());
        Ok(self)
    }

    pub fn having(&mut self, expr: &str) -> OrmResult<&mut Self> {
        self.select_state("having")?.having = Some(expr.to_string());
        Ok(self)
    }

    // ==================== write payloads ====================

    /// Set a single-row insert payload.
    pub fn insert_fields(&mut self, row: Row) -> OrmResult<&mut Self> {
        self.insert_rows(vec![row])
    }

    /// Set a multi-row insert payload. Every row must carry the same keys as the first.
    pub fn insert_rows(&mut self, rows: Vec<Row>) -> OrmResult<&mut Self> {
        let Chain::Insert(s) = &mut self.chain else {
            return Err(self.invalid("insert_fields"));
        };
        if let Some(first) = rows.first() {
            for (idx, row) in rows.iter().enumerate().skip(1) {
                if !row.same_keys(first) {
                    return Err(OrmError::MismatchedInsertKeys {
                        row: idx,
                        expected: first.keys().collect::<Vec<_>>().join(", "),
                        found: row.keys().collect::<Vec<_>>().join(", "),
                    });
                }
            }
        }
        s.rows = rows;
        Ok(self)
    }

    /// Merge fields into the update payload.
    pub fn update_fields(&mut self, fields: Row) -> OrmResult<&mut Self> {
        let Chain::Update(s) = &mut self.chain else {
            return Err(self.invalid("update_fields"));
        };
        for (k, v) in fields {
            s.set.insert(k, v);
        }
        Ok(self)
    }

    /// Merge fields into the write payload of an insert or update chain.
    ///
    /// For a multi-row insert the fields are applied to every row.
    pub fn set_fields(&mut self, fields: Row) -> OrmResult<&mut Self> {
        match &mut self.chain {
            Chain::Update(s) => {
                for (k, v) in fields {
                    s.set.insert(k, v);
                }
            }
            Chain::Insert(s) => {
                if s.rows.is_empty() {
                    s.rows.push(Row::new());
                }
                for row in &mut s.rows {
                    for (k, v) in fields.iter() {
                        row.insert(k, v.clone());
                    }
                }
            }
            _ => return Err(self.invalid("set_fields")),
        }
        Ok(self)
    }

    /// Set one field of the write payload.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> OrmResult<&mut Self> {
        if !matches!(self.chain, Chain::Insert(_) | Chain::Update(_)) {
            return Err(self.invalid("set"));
        }
        self.set_fields(Row::new().with(field, value))
    }

    // ==================== read access ====================

    pub fn limit_value(&self) -> Option<u64> {
        match &self.chain {
            Chain::Select(s) => s.limit,
            Chain::Delete(s) => s.limit,
            _ => None,
        }
    }

    pub fn offset_value(&self) -> Option<u64> {
        match &self.chain {
            Chain::Select(s) => s.offset,
            _ => None,
        }
    }

    fn select_state(&mut self, method: &'static str) -> OrmResult<&mut SelectState> {
        let mode = self.chain.mode();
        match &mut self.chain {
            Chain::Select(s) => Ok(s),
            _ => Err(OrmError::invalid_mode(method, mode.as_str())),
        }
    }

    // ==================== output ====================

    /// Assemble the statement with `?` placeholders and its ordered bound values.
    pub fn to_param(&self) -> OrmResult<Built> {
        render::build(&self.chain, &ValueCodec::new(self.dialect))
    }

    /// Assemble the statement with every value inlined as a literal.
    pub fn to_sql_string(&self) -> OrmResult<String> {
        let codec = ValueCodec::new(self.dialect);
        let built = render::build(&self.chain, &codec)?;
        placeholder::inline_all(&built.text, &built.values, &codec)
    }

    /// Counting statement for the current select chain.
    ///
    /// The projection becomes `COUNT(<expr>) AS count` (default `<table>.id`, or the distinct
    /// field when set) and ORDER/LIMIT/OFFSET are dropped. Grouped chains are wrapped as
    /// `SELECT COUNT(*) AS count FROM (<inner>) sq`.
    pub fn count_query(&self, expr: Option<&str>) -> OrmResult<Built> {
        let Chain::Select(s) = &self.chain else {
            return Err(self.invalid("count"));
        };
        render::count(s, expr, &ValueCodec::new(self.dialect))
    }
}

/// Split `"field DIR"` into its parts; a missing direction is ascending.
fn split_order(expr: &str) -> (&str, Direction) {
    let expr = expr.trim();
    match expr.rsplit_once(char::is_whitespace) {
        Some((field, dir))
            if dir.eq_ignore_ascii_case("asc") || dir.eq_ignore_ascii_case("desc") =>
        {
            (field.trim_end(), Direction::from(dir))
        }
        _ => (expr, Direction::Asc),
    }
}
