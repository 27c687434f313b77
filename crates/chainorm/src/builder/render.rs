//! Statement assembly per mode.

use super::Built;
use super::state::{
    Chain, DeleteState, Direction, InsertState, Join, SelectState, UpdateState, WhereClause,
};
use crate::codec::ValueCodec;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::placeholder;
use crate::value::Value;

pub(super) fn build(chain: &Chain, codec: &ValueCodec) -> OrmResult<Built> {
    match chain {
        Chain::Empty => Err(OrmError::invalid_mode("to_param", "none")),
        Chain::Select(s) => select(s, codec),
        Chain::Insert(s) => insert(s, codec.dialect()),
        Chain::Update(s) => update(s, codec),
        Chain::Delete(s) => delete(s, codec),
    }
}

pub(super) fn count(s: &SelectState, expr: Option<&str>, codec: &ValueCodec) -> OrmResult<Built> {
    let mut inner = s.clone();
    inner.order.clear();
    inner.limit = None;
    inner.offset = None;

    if inner.group.is_some() {
        let built = select(&inner, codec)?;
        return Ok(Built {
            text: format!("SELECT COUNT(*) AS count FROM ({}) sq", built.text),
            values: built.values,
        });
    }

    let target = match (expr, inner.distinct.take()) {
        (Some(e), _) => e.to_string(),
        (None, Some(d)) => format!("DISTINCT {d}"),
        (None, None) => format!("{}.id", inner.table),
    };
    inner.fields = vec![format!("COUNT({target}) AS count")];
    select(&inner, codec)
}

fn select(s: &SelectState, codec: &ValueCodec) -> OrmResult<Built> {
    let d = codec.dialect();
    let mut parts = Vec::with_capacity(10);

    let fields = s
        .fields
        .iter()
        .map(|f| render_field(d, f))
        .collect::<Vec<_>>()
        .join(",");
    match &s.distinct {
        Some(dist) => parts.push(format!("SELECT DISTINCT {},{fields}", ident(d, dist))),
        None => parts.push(format!("SELECT {fields}")),
    }

    let mut from = format!("FROM {}", ident(d, &s.table));
    for extra in &s.extra_tables {
        from.push_str(", ");
        from.push_str(&ident(d, extra));
    }
    parts.push(from);

    if !s.joins.is_empty() {
        parts.push(joins(&s.joins));
    }

    let mut values = Vec::new();
    if let Some(w) = where_clause(&s.wheres, codec, &mut values)? {
        parts.push(w);
    }
    if let Some(g) = &s.group {
        parts.push(format!("GROUP BY {g}"));
    }
    if let Some(h) = &s.having {
        parts.push(format!("HAVING {h}"));
    }
    if !s.order.is_empty() {
        parts.push(order(d, &s.order));
    }
    if let Some(n) = s.limit {
        parts.push(format!("LIMIT {n}"));
    }
    if let Some(n) = s.offset {
        parts.push(format!("OFFSET {n}"));
    }

    Ok(Built {
        text: parts.join(" "),
        values,
    })
}

fn insert(s: &InsertState, d: Dialect) -> OrmResult<Built> {
    let Some(first) = s.rows.first().filter(|r| !r.is_empty()) else {
        return Err(OrmError::validation(format!(
            "INSERT INTO {} requires at least one field",
            s.table
        )));
    };
    let keys = first.keys().collect::<Vec<_>>();
    let mut values = Vec::with_capacity(keys.len() * s.rows.len());
    let mut tuples = Vec::with_capacity(s.rows.len());

    for (idx, row) in s.rows.iter().enumerate() {
        if !row.same_keys(first) {
            return Err(OrmError::MismatchedInsertKeys {
                row: idx,
                expected: keys.join(", "),
                found: row.keys().collect::<Vec<_>>().join(", "),
            });
        }
        let slots = keys
            .iter()
            .map(|k| match row.get(k) {
                Some(Value::Raw(sql)) => sql.clone(),
                Some(v) => {
                    values.push(v.clone());
                    "?".to_string()
                }
                None => "NULL".to_string(),
            })
            .collect::<Vec<_>>();
        tuples.push(format!("({})", slots.join(", ")));
    }

    let columns = keys.iter().map(|k| ident(d, k)).collect::<Vec<_>>();
    Ok(Built {
        text: format!(
            "INSERT INTO {} ({}) VALUES {}",
            d.wrap(&s.table),
            columns.join(", "),
            tuples.join(", ")
        ),
        values,
    })
}

fn update(s: &UpdateState, codec: &ValueCodec) -> OrmResult<Built> {
    let d = codec.dialect();
    if s.set.is_empty() {
        return Err(OrmError::validation(format!(
            "UPDATE {} requires at least one field",
            s.table
        )));
    }

    let mut values = Vec::with_capacity(s.set.len());
    let assignments = s
        .set
        .iter()
        .map(|(k, v)| match v {
            Value::Raw(sql) => format!("{} = {sql}", ident(d, k)),
            v => {
                values.push(v.clone());
                format!("{} = ?", ident(d, k))
            }
        })
        .collect::<Vec<_>>();

    let mut parts = vec![format!("UPDATE {}", d.wrap(&s.table))];
    if !s.joins.is_empty() {
        parts.push(joins(&s.joins));
    }
    parts.push(format!("SET {}", assignments.join(", ")));
    if let Some(w) = where_clause(&s.wheres, codec, &mut values)? {
        parts.push(w);
    }

    Ok(Built {
        text: parts.join(" "),
        values,
    })
}

fn delete(s: &DeleteState, codec: &ValueCodec) -> OrmResult<Built> {
    let d = codec.dialect();
    let mut parts = vec![format!("DELETE FROM {}", d.wrap(&s.table))];
    let mut values = Vec::new();
    if let Some(w) = where_clause(&s.wheres, codec, &mut values)? {
        parts.push(w);
    }
    if !s.order.is_empty() {
        parts.push(order(d, &s.order));
    }
    if let Some(n) = s.limit {
        parts.push(format!("LIMIT {n}"));
    }
    Ok(Built {
        text: parts.join(" "),
        values,
    })
}

fn joins(joins: &[Join]) -> String {
    joins
        .iter()
        .map(|j| {
            let table = match &j.alias {
                Some(alias) => format!("{} AS {alias}", j.table),
                None => j.table.clone(),
            };
            format!("{}JOIN {table} ON {}", j.kind.prefix(), j.on)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn order(d: Dialect, entries: &[(String, Direction)]) -> String {
    let list = entries
        .iter()
        .map(|(field, dir)| format!("{} {}", ident(d, field), dir.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("ORDER BY {list}")
}

/// AND-join the WHERE fragments, inlining `IN ?` arrays and appending the remaining values.
fn where_clause(
    clauses: &[WhereClause],
    codec: &ValueCodec,
    values: &mut Vec<Value>,
) -> OrmResult<Option<String>> {
    if clauses.is_empty() {
        return Ok(None);
    }
    let several = clauses.len() > 1;
    let mut fragments = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let (text, kept) =
            placeholder::expand_in_lists(&clause.fragment, clause.values.clone(), codec)?;
        values.extend(kept);
        if several && has_top_level_or(&text) {
            fragments.push(format!("({text})"));
        } else {
            fragments.push(text);
        }
    }
    Ok(Some(format!("WHERE {}", fragments.join(" AND "))))
}

fn has_top_level_or(fragment: &str) -> bool {
    let mut depth = 0i32;
    let lower = fragment.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match *b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b' ' if depth == 0 && bytes[i..].starts_with(b" or ") => return true,
            _ => {}
        }
    }
    false
}

/// Render one projection entry.
///
/// `a AS b` quotes the left side and keeps the alias; entries containing a comma are
/// caller-assembled and pass through.
fn render_field(d: Dialect, expr: &str) -> String {
    if expr.contains(',') {
        return expr.to_string();
    }
    for sep in [" as ", " AS "] {
        if let Some((left, alias)) = expr.split_once(sep) {
            return format!("{} AS {}", ident(d, left.trim()), alias.trim());
        }
    }
    ident(d, expr)
}

/// Quote an identifier path where needed; anything that is not a plain dotted path (function
/// calls, arithmetic, literals) is treated as an expression and left alone.
pub(crate) fn ident(d: Dialect, expr: &str) -> String {
    let expr = expr.trim();
    if is_ident_path(expr) {
        d.quote_ident(expr)
    } else {
        expr.to_string()
    }
}

fn is_ident_path(expr: &str) -> bool {
    !expr.is_empty()
        && expr.split('.').all(|seg| {
            seg == "*"
                || seg.chars().next().is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
                    && seg.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
        })
}
