//! Value → SQL literal text.
//!
//! Used whenever a value is rendered into the statement text instead of being bound:
//! `QueryBuilder::to_sql_string()`, the `IN ?` list rewrite, and services that cannot bind
//! parameters.

use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use chrono::{DateTime, Timelike, Utc};
use std::fmt::Write;

/// How a value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeStyle {
    /// Self-contained SQL text: quoted strings, `TRUE`/`FALSE`, `X'..'` blobs (`'\x..'::bytea`
    /// on Postgres).
    #[default]
    Literal,
    /// Text handed to a driver that applies its own quoting: escaped but unquoted strings,
    /// `1`/`0` booleans, plain hex blobs.
    Bare,
}

/// Encodes [`Value`]s for a given dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCodec {
    dialect: Dialect,
}

impl ValueCodec {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Encode one value.
    pub fn encode(&self, value: &Value, style: EncodeStyle) -> OrmResult<String> {
        match value {
            Value::Raw(sql) => Ok(sql.clone()),
            Value::Array(items) => self.encode_array(items, style),
            other => self.encode_scalar(other, style),
        }
    }

    /// Encode a list as `(v1,v2,...)`, recursing into nested arrays.
    ///
    /// An empty list renders `(NULL)` so `IN (NULL)` stays valid SQL and matches nothing.
    pub fn encode_array(&self, values: &[Value], style: EncodeStyle) -> OrmResult<String> {
        if values.is_empty() {
            return Ok("(NULL)".to_string());
        }
        let mut out = String::from("(");
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match v {
                Value::Array(nested) => out.push_str(&self.encode_array(nested, style)?),
                Value::Raw(sql) => {
                    return Err(OrmError::unsupported(format!(
                        "raw fragment '{sql}' inside an array"
                    )));
                }
                scalar => out.push_str(&self.encode_scalar(scalar, style)?),
            }
        }
        out.push(')');
        Ok(out)
    }

    fn encode_scalar(&self, value: &Value, style: EncodeStyle) -> OrmResult<String> {
        let literal = style == EncodeStyle::Literal;
        let text = match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match (literal, *b) {
                (true, true) => "TRUE".to_string(),
                (true, false) => "FALSE".to_string(),
                (false, b) => if b { "1" } else { "0" }.to_string(),
            },
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(OrmError::unsupported(format!("non-finite float {f}")));
                }
                f.to_string()
            }
            Value::Text(s) => self.string(s, literal),
            Value::Bytes(b) => {
                if literal {
                    match self.dialect {
                        Dialect::Mysql => format!("X'{}'", hex(b)),
                        Dialect::Postgres => format!("'\\x{}'::bytea", hex(b)),
                    }
                } else {
                    hex(b)
                }
            }
            Value::Timestamp(t) => self.string(&timestamp(t), literal),
            Value::Json(j) => {
                let s = serde_json::to_string(j)
                    .map_err(|e| OrmError::unsupported(format!("json: {e}")))?;
                self.string(&s, literal)
            }
            Value::Raw(_) | Value::Array(_) => {
                return Err(OrmError::unsupported(value.type_name()));
            }
        };
        Ok(text)
    }

    fn string(&self, s: &str, literal: bool) -> String {
        if literal {
            self.dialect.quote_literal(s)
        } else {
            self.dialect.escape_string(s)
        }
    }
}

/// Encode with the default (MySQL) codec.
pub fn encode(value: &Value, style: EncodeStyle) -> OrmResult<String> {
    ValueCodec::default().encode(value, style)
}

/// Encode a list with the default (MySQL) codec.
pub fn encode_array(values: &[Value], style: EncodeStyle) -> OrmResult<String> {
    ValueCodec::default().encode_array(values, style)
}

/// UTC timestamp text accepted by both MySQL and Postgres timestamp literals.
fn timestamp(t: &DateTime<Utc>) -> String {
    if t.nanosecond() == 0 {
        t.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        t.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Lowercase hex of a byte slice.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lit(v: impl Into<Value>) -> String {
        encode(&v.into(), EncodeStyle::Literal).unwrap()
    }

    fn bare(v: impl Into<Value>) -> String {
        encode(&v.into(), EncodeStyle::Bare).unwrap()
    }

    #[test]
    fn booleans_follow_style() {
        assert_eq!(lit(true), "TRUE");
        assert_eq!(lit(false), "FALSE");
        assert_eq!(bare(true), "1");
        assert_eq!(bare(false), "0");
    }

    #[test]
    fn strings_are_escaped_and_optionally_quoted() {
        assert_eq!(lit("it's"), "'it\\'s'");
        assert_eq!(bare("it's"), "it\\'s");
        assert_eq!(lit("line\nbreak"), "'line\\nbreak'");
    }

    #[test]
    fn numbers_and_null_render_as_is() {
        assert_eq!(lit(42), "42");
        assert_eq!(lit(-1.5), "-1.5");
        assert_eq!(lit(Value::Null), "NULL");
        assert_eq!(lit(None::<i32>), "NULL");
    }

    #[test]
    fn timestamps_render_in_utc() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(lit(t), "'2024-03-09 07:05:01'");
        assert_eq!(bare(t), "2024-03-09 07:05:01");
    }

    #[test]
    fn bytes_render_as_hex() {
        assert_eq!(lit(Value::bytes(vec![0x0a, 0xff])), "X'0aff'");
        assert_eq!(bare(Value::bytes(vec![0x0a, 0xff])), "0aff");
    }

    #[test]
    fn postgres_bytes_render_as_bytea() {
        let pg = ValueCodec::new(Dialect::Postgres);
        let v = Value::bytes(vec![0x0a, 0xff]);
        assert_eq!(pg.encode(&v, EncodeStyle::Literal).unwrap(), "'\\x0aff'::bytea");
        assert_eq!(pg.encode(&v, EncodeStyle::Bare).unwrap(), "0aff");
    }

    #[test]
    fn nested_arrays_recurse() {
        let v = Value::array(vec![Value::array([1, 2]), Value::array([3, 4])]);
        assert_eq!(lit(v), "((1,2),(3,4))");
        assert_eq!(lit(Value::array(["a", "b"])), "('a','b')");
        assert_eq!(lit(Value::Array(vec![])), "(NULL)");
    }

    #[test]
    fn objects_serialize_to_json() {
        let v = Value::from(serde_json::json!({"k": "v"}));
        assert_eq!(lit(v.clone()), "'{\\\"k\\\":\\\"v\\\"}'");
        assert_eq!(
            ValueCodec::new(Dialect::Postgres)
                .encode(&v, EncodeStyle::Literal)
                .unwrap(),
            "'{\"k\":\"v\"}'"
        );
    }

    #[test]
    fn unsupported_values_fail() {
        let err = encode(&Value::Float(f64::NAN), EncodeStyle::Literal).unwrap_err();
        assert!(matches!(err, OrmError::UnsupportedValueType(_)));
        let err = encode(&Value::array([Value::raw("NOW()")]), EncodeStyle::Literal).unwrap_err();
        assert!(matches!(err, OrmError::UnsupportedValueType(_)));
    }

    #[test]
    fn raw_renders_verbatim() {
        assert_eq!(lit(Value::raw("NOW()")), "NOW()");
    }
}
