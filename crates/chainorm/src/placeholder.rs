//! `?` placeholder scanning and substitution.
//!
//! Fragments are free-form SQL. A `?` counts as a placeholder only outside quoted text
//! (`'..'`, `".."` and `` `..` ``), so `name = 'who?'` binds nothing.

use crate::codec::{EncodeStyle, ValueCodec};
use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// A placeholder occurrence in a SQL string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte offset of the `?`.
    pub pos: usize,
    /// Whether the placeholder directly follows the keyword `IN`.
    pub after_in: bool,
}

/// Find every placeholder outside quoted text.
pub fn scan(sql: &str) -> Vec<Placeholder> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\\' && q == b'\'' {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == q {
                        // doubled quote is an escaped quote
                        if i + 1 < bytes.len() && bytes[i + 1] == q {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'?' => out.push(Placeholder {
                pos: i,
                after_in: follows_in(&sql[..i]),
            }),
            _ => {}
        }
        i += 1;
    }
    out
}

/// Count placeholders outside quoted text.
pub fn count(sql: &str) -> usize {
    scan(sql).len()
}

fn follows_in(prefix: &str) -> bool {
    let trimmed = prefix.trim_end();
    let bytes = trimmed.as_bytes();
    if bytes.len() < 2 || !bytes[bytes.len() - 2..].eq_ignore_ascii_case(b"in") {
        return false;
    }
    match bytes.len().checked_sub(3).map(|i| bytes[i]) {
        None => true,
        Some(c) => !(c == b'_' || c.is_ascii_alphanumeric()),
    }
}

fn check_count(found: usize, values: &[Value]) -> OrmResult<()> {
    if found != values.len() {
        return Err(OrmError::PlaceholderMismatch {
            placeholders: found,
            values: values.len(),
        });
    }
    Ok(())
}

/// Inline array values bound to `IN ?` as literal lists; every other value stays bound.
///
/// Returns the rewritten text and the remaining values, in order.
pub fn expand_in_lists(
    sql: &str,
    values: Vec<Value>,
    codec: &ValueCodec,
) -> OrmResult<(String, Vec<Value>)> {
    let marks = scan(sql);
    check_count(marks.len(), &values)?;
    if !marks
        .iter()
        .zip(&values)
        .any(|(m, v)| m.after_in && v.is_array())
    {
        return Ok((sql.to_string(), values));
    }

    let mut text = String::with_capacity(sql.len() + 16);
    let mut kept = Vec::with_capacity(values.len());
    let mut last = 0;
    for (mark, value) in marks.into_iter().zip(values) {
        if mark.after_in && value.is_array() {
            text.push_str(&sql[last..mark.pos]);
            text.push_str(&codec.encode(&value, EncodeStyle::Literal)?);
            last = mark.pos + 1;
        } else {
            kept.push(value);
        }
    }
    text.push_str(&sql[last..]);
    Ok((text, kept))
}

/// Replace every placeholder with the literal rendering of its value.
pub fn inline_all(sql: &str, values: &[Value], codec: &ValueCodec) -> OrmResult<String> {
    let marks = scan(sql);
    check_count(marks.len(), values)?;
    let mut text = String::with_capacity(sql.len() + values.len() * 8);
    let mut last = 0;
    for (mark, value) in marks.iter().zip(values) {
        text.push_str(&sql[last..mark.pos]);
        text.push_str(&codec.encode(value, EncodeStyle::Literal)?);
        last = mark.pos + 1;
    }
    text.push_str(&sql[last..]);
    Ok(text)
}

/// Rewrite `?` placeholders as numbered `$1, $2, ...` placeholders.
pub fn renumber(sql: &str) -> String {
    let marks = scan(sql);
    if marks.is_empty() {
        return sql.to_string();
    }
    let mut text = String::with_capacity(sql.len() + marks.len() * 2);
    let mut last = 0;
    for (i, mark) in marks.iter().enumerate() {
        text.push_str(&sql[last..mark.pos]);
        text.push('$');
        text.push_str(&(i + 1).to_string());
        last = mark.pos + 1;
    }
    text.push_str(&sql[last..]);
    text
}

/// Strip leading whitespace, comments and opening parentheses.
pub(crate) fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

pub(crate) fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    match s.get(0..keyword.len()) {
        Some(prefix) => {
            prefix.eq_ignore_ascii_case(keyword)
                && s[keyword.len()..]
                    .chars()
                    .next()
                    .is_none_or(|c| !(c == '_' || c.is_ascii_alphanumeric()))
        }
        None => false,
    }
}
