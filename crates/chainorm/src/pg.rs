//! PostgreSQL service backed by `deadpool-postgres`.
//!
//! Statements arrive with `?` placeholders and are renumbered to `$n`. Inserts get a
//! `RETURNING <id>` suffix so the generated id can be reported like other drivers do.

use crate::config::DatabaseConfig;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::monitor::QueryType;
use crate::placeholder;
use crate::service::{DbConnection, DbResult, DbService};
use crate::value::{Row, Value};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use std::error::Error;
use tokio_postgres::NoTls;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

/// Create a connection pool from a database URL.
///
/// Connections are opened lazily on first checkout.
pub fn create_pool(database_url: &str, max_size: usize) -> OrmResult<Pool> {
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| OrmError::Connection(e.to_string()))?;
    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(mgr)
        .max_size(max_size)
        .build()
        .map_err(|e| OrmError::Pool(e.to_string()))
}

/// [`DbService`] over a `deadpool_postgres::Pool`.
#[derive(Clone)]
pub struct PgService {
    pool: Pool,
    id_column: Option<String>,
}

impl std::fmt::Debug for PgService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgService")
            .field("status", &self.pool.status())
            .field("id_column", &self.id_column)
            .finish()
    }
}

impl PgService {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            id_column: Some("id".to_string()),
        }
    }

    /// Build the pool for one configured database.
    pub fn from_config(config: &DatabaseConfig) -> OrmResult<Self> {
        Ok(Self::new(create_pool(&config.url, config.max_connections)?))
    }

    /// Column returned from inserts as the generated id; `None` disables `RETURNING`.
    pub fn id_column(mut self, column: Option<&str>) -> Self {
        self.id_column = column.map(str::to_string);
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn checkout(&self) -> OrmResult<Object> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait::async_trait]
impl DbService for PgService {
    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<DbResult> {
        let client = self.checkout().await?;
        run(&client, sql, values, self.id_column.as_deref()).await
    }

    async fn acquire(&self) -> OrmResult<Box<dyn DbConnection>> {
        let client = self.checkout().await?;
        Ok(Box::new(PgConnection {
            client,
            id_column: self.id_column.clone(),
        }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

/// A checked-out pool connection; returned to the pool on drop.
pub struct PgConnection {
    client: Object,
    id_column: Option<String>,
}

#[async_trait::async_trait]
impl DbConnection for PgConnection {
    async fn execute(&mut self, sql: &str, values: &[Value]) -> OrmResult<DbResult> {
        run(&self.client, sql, values, self.id_column.as_deref()).await
    }
}

async fn run(
    client: &tokio_postgres::Client,
    sql: &str,
    values: &[Value],
    id_column: Option<&str>,
) -> OrmResult<DbResult> {
    let mut text = placeholder::renumber(sql);
    let params: Vec<&(dyn ToSql + Sync)> =
        values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

    let kind = QueryType::from_sql(sql);
    let has_returning = contains_keyword(sql, "RETURNING");
    let returning_id = match (kind, id_column) {
        (QueryType::Insert, Some(col)) if !has_returning => {
            text.push_str(" RETURNING ");
            text.push_str(col);
            Some(col)
        }
        _ => None,
    };

    if kind.returns_rows() || has_returning || returning_id.is_some() {
        let rows = client
            .query(text.as_str(), &params)
            .await
            .map_err(|e| OrmError::from(e).with_statement(sql, values))?;
        let rows = rows.iter().map(decode_row).collect::<OrmResult<Vec<_>>>()?;
        if let Some(col) = returning_id {
            let insert_id = rows.last().and_then(|r| r.get(col)).and_then(Value::as_i64);
            return Ok(DbResult::written(rows.len() as u64, insert_id));
        }
        if kind.returns_rows() {
            return Ok(DbResult::from_rows(rows));
        }
        let mut res = DbResult::from_rows(rows);
        res.affected_rows = res.rows.len() as u64;
        res.changed_rows = res.affected_rows;
        return Ok(res);
    }

    let affected = client
        .execute(text.as_str(), &params)
        .await
        .map_err(|e| OrmError::from(e).with_statement(sql, values))?;
    Ok(DbResult::written(affected, None))
}

fn contains_keyword(sql: &str, keyword: &str) -> bool {
    sql.split(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
        .any(|w| w.eq_ignore_ascii_case(keyword))
}

fn decode_row(row: &tokio_postgres::Row) -> OrmResult<Row> {
    let mut out = Row::with_capacity(row.len());
    for (idx, col) in row.columns().iter().enumerate() {
        let value: Value = row
            .try_get(idx)
            .map_err(|e| OrmError::decode(col.name(), e.to_string()))?;
        out.insert(col.name(), value);
    }
    Ok(out)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::OID => u32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => i.to_string().to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Text(s) => match *ty {
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                _ => s.as_str().to_sql(ty, out),
            },
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                Type::DATE => t.date_naive().to_sql(ty, out),
                _ => t.to_sql(ty, out),
            },
            Value::Array(items) => match ty.kind() {
                Kind::Array(_) => items.as_slice().to_sql(ty, out),
                _ => Err(format!("array bound to non-array parameter of type {ty}").into()),
            },
            Value::Json(j) => j.to_sql(ty, out),
            Value::Raw(sql) => Err(format!("raw fragment '{sql}' cannot be bound").into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::OID => Value::Int(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                Value::Text(String::from_sql(ty, raw)?)
            }
            Type::BYTEA => Value::Bytes(Vec::<u8>::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => Value::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc()),
            Type::DATE => Value::from(NaiveDate::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            _ => match ty.kind() {
                Kind::Array(_) => Value::Array(Vec::<Value>::from_sql(ty, raw)?),
                Kind::Enum(_) => Value::Text(String::from_utf8(raw.to_vec())?),
                _ => return Err(format!("unsupported column type {ty}").into()),
            },
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_match_is_whole_word() {
        assert!(contains_keyword("INSERT INTO t (a) VALUES (1) returning id", "RETURNING"));
        assert!(!contains_keyword("INSERT INTO returning_log (a) VALUES (1)", "RETURNING"));
    }

    #[test]
    fn values_bind_as_postgres_types() {
        let mut buf = BytesMut::new();
        let is_null = Value::Int(7).to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::No));
        assert_eq!(buf.as_ref(), &7i32.to_be_bytes());

        let mut buf = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::TEXT, &mut buf).unwrap(),
            IsNull::Yes
        ));
        assert!(Value::raw("NOW()").to_sql(&Type::TEXT, &mut buf).is_err());
        assert!(Value::Int(70_000).to_sql(&Type::INT2, &mut buf).is_err());
    }

    #[test]
    fn values_decode_from_postgres_types() {
        let v = Value::from_sql(&Type::INT8, &42i64.to_be_bytes()).unwrap();
        assert_eq!(v, Value::Int(42));
        let v = Value::from_sql(&Type::TEXT, b"abc").unwrap();
        assert_eq!(v, Value::Text("abc".into()));
        assert_eq!(Value::from_sql_null(&Type::TEXT).unwrap(), Value::Null);
    }

    /// Live test; skipped unless `DATABASE_URL` is set.
    #[tokio::test]
    async fn live_roundtrip() -> OrmResult<()> {
        let _ = dotenvy::dotenv();
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping");
            return Ok(());
        };
        let svc = PgService::new(create_pool(&url, 2)?);
        let res = svc
            .execute("SELECT ?::int8 AS n, ?::text AS s", &[Value::Int(5), Value::from("x")])
            .await?;
        assert_eq!(res.rows[0].get("n"), Some(&Value::Int(5)));
        assert_eq!(res.rows[0].get("s"), Some(&Value::from("x")));
        Ok(())
    }
}
