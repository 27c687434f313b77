//! Per-mode chain state.

use crate::value::{Row, Value};
use std::fmt;

/// Statement mode of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No starter has been called yet.
    None,
    Select,
    Insert,
    Update,
    Delete,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Mode::None => "none",
            Mode::Select => "select",
            Mode::Insert => "insert",
            Mode::Update => "update",
            Mode::Delete => "delete",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join keyword variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    /// Plain `JOIN`
    #[default]
    Inner,
    Left,
    Outer,
    LeftOuter,
}

impl JoinKind {
    /// Keyword prefix rendered before `JOIN`, including the trailing space.
    pub const fn prefix(self) -> &'static str {
        match self {
            JoinKind::Inner => "",
            JoinKind::Left => "LEFT ",
            JoinKind::Outer => "OUTER ",
            JoinKind::LeftOuter => "LEFT OUTER ",
        }
    }

    /// Name used in action logs (`join`, `left_join`, ...).
    pub const fn action_name(self) -> &'static str {
        match self {
            JoinKind::Inner => "join",
            JoinKind::Left => "left_join",
            JoinKind::Outer => "outer_join",
            JoinKind::LeftOuter => "left_outer_join",
        }
    }
}

/// One join descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: Option<String>,
    pub on: String,
    pub kind: JoinKind,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl From<bool> for Direction {
    /// `true` is ascending.
    fn from(asc: bool) -> Self {
        if asc { Direction::Asc } else { Direction::Desc }
    }
}

impl From<&str> for Direction {
    /// `"asc"` in any case is ascending, everything else descending.
    fn from(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            Direction::Asc
        } else {
            Direction::Desc
        }
    }
}

/// One AND-joined WHERE fragment with its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub fragment: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectState {
    pub table: String,
    pub extra_tables: Vec<String>,
    pub fields: Vec<String>,
    pub joins: Vec<Join>,
    pub wheres: Vec<WhereClause>,
    pub group: Option<String>,
    pub having: Option<String>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertState {
    pub table: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateState {
    pub table: String,
    pub joins: Vec<Join>,
    pub set: Row,
    pub wheres: Vec<WhereClause>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteState {
    pub table: String,
    pub wheres: Vec<WhereClause>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<u64>,
}

/// The chain: exactly one mode's state at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Chain {
    #[default]
    Empty,
    Select(SelectState),
    Insert(InsertState),
    Update(UpdateState),
    Delete(DeleteState),
}

impl Chain {
    pub fn mode(&self) -> Mode {
        match self {
            Chain::Empty => Mode::None,
            Chain::Select(_) => Mode::Select,
            Chain::Insert(_) => Mode::Insert,
            Chain::Update(_) => Mode::Update,
            Chain::Delete(_) => Mode::Delete,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Chain::Empty => None,
            Chain::Select(s) => Some(&s.table),
            Chain::Insert(s) => Some(&s.table),
            Chain::Update(s) => Some(&s.table),
            Chain::Delete(s) => Some(&s.table),
        }
    }
}
