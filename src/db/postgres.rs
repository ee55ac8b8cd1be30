use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgRange, PgTimeTz};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::{Column, Either, Executor, Row, Statement, TypeInfo, ValueRef};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use crate::db::materialize::{materialize, TabularRow};
use crate::db::{Connector, DatabaseDriver, QualifiedTable};
use crate::error::DbError;
use crate::models::{ColumnDefinition, ConnectionConfig, IndexDefinition, QueryResult, RawValue};

/// Opens sqlx pools for [`ConnectionConfig`]s.
pub struct PostgresConnector {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PostgresConnector {
    pub fn new(max_connections: u32, acquire_timeout: Duration) -> Self {
        Self {
            max_connections,
            acquire_timeout,
        }
    }
}

impl Default for PostgresConnector {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(3))
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseDriver>, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(config.connect_options())
            .await?;

        Ok(Arc::new(PostgresDriver::new(pool)))
    }
}

pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Prepares `sql`, reads its column list once, then materializes the rows.
    async fn fetch_rows(&self, sql: &str, require_columns: bool) -> Result<QueryResult, DbError> {
        let statement = (&self.pool).prepare(sql).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        if require_columns && columns.is_empty() {
            return Err(DbError::NoResultSet);
        }

        let cursor = statement.query().fetch(&self.pool).map_err(DbError::from);
        materialize(columns, cursor).await
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    async fn ping(&self) -> Result<(), DbError> {
        if self.pool.is_closed() {
            return Err(DbError::Closed);
        }
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<QueryResult, DbError> {
        self.fetch_rows(sql, true).await
    }

    async fn execute(&self, sql: &str) -> Result<u64, DbError> {
        // Simple protocol, so several `;`-separated statements are accepted.
        // Statements that returned rows (e.g. `SELECT FROM t`) report how many
        // they selected; those counts are not affected rows.
        let mut results = (&self.pool).fetch_many(sqlx::raw_sql(sql));
        let mut affected = 0;
        let mut returned_rows = false;
        while let Some(item) = results.try_next().await? {
            match item {
                Either::Left(done) => {
                    if !returned_rows {
                        affected += done.rows_affected();
                    }
                    returned_rows = false;
                }
                Either::Right(_) => returned_rows = true,
            }
        }
        Ok(affected)
    }

    async fn get_schemas(&self) -> Result<Vec<String>, DbError> {
        let schemas = sqlx::query_scalar::<_, String>(
            r"SELECT nspname::text
              FROM pg_catalog.pg_namespace
              WHERE nspname NOT LIKE 'pg\_%'
                AND nspname <> 'information_schema'
              ORDER BY nspname",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(schemas)
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<String>, DbError> {
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT tablename::text FROM pg_catalog.pg_tables WHERE schemaname = $1 ORDER BY tablename",
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn get_views(&self, schema: &str) -> Result<Vec<String>, DbError> {
        let views = sqlx::query_scalar::<_, String>(
            "SELECT viewname::text FROM pg_catalog.pg_views WHERE schemaname = $1 ORDER BY viewname",
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await?;
        Ok(views)
    }

    async fn get_indexes(&self, schema: &str) -> Result<Vec<IndexDefinition>, DbError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT indexname::text, tablename::text FROM pg_catalog.pg_indexes WHERE schemaname = $1 ORDER BY indexname",
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(index, table)| IndexDefinition { index, table })
            .collect())
    }

    async fn get_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnDefinition>, DbError> {
        let sql = r#"
            SELECT
                c.column_name::text AS column_name,
                c.data_type::text AS data_type,
                COALESCE(
                    array_agg(tc.constraint_type::text ORDER BY k.ordinal_position, tc.constraint_type)
                        FILTER (WHERE tc.constraint_type IS NOT NULL),
                    ARRAY[]::text[]
                ) AS constraint_types
            FROM information_schema.columns c
            LEFT JOIN information_schema.key_column_usage k
              ON c.table_schema = k.table_schema
             AND c.table_name = k.table_name
             AND c.column_name = k.column_name
            LEFT JOIN information_schema.table_constraints tc
              ON k.constraint_schema = tc.constraint_schema
             AND k.constraint_name = tc.constraint_name
             AND k.table_name = tc.table_name
            WHERE c.table_schema = $1
              AND c.table_name = $2
            GROUP BY c.column_name, c.data_type, c.ordinal_position
            ORDER BY c.ordinal_position
        "#;

        let rows = sqlx::query_as::<_, (String, String, Vec<String>)>(sql)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, constraints)| ColumnDefinition {
                name,
                data_type,
                constraints: dedup_stable(constraints),
            })
            .collect())
    }

    async fn get_table_data(&self, table: &QualifiedTable) -> Result<QueryResult, DbError> {
        self.fetch_rows(&table.select_all_sql(), false).await
    }

    async fn close(&self) -> Result<(), DbError> {
        self.pool.close().await;
        Ok(())
    }
}

impl TabularRow for PgRow {
    fn width(&self) -> usize {
        self.len()
    }

    fn scan(&self, index: usize) -> Result<RawValue, DbError> {
        map_postgres_value(self, index)
    }
}

fn map_postgres_value(row: &PgRow, index: usize) -> Result<RawValue, DbError> {
    let value_ref = row
        .try_get_raw(index)
        .map_err(|e| DbError::Scan(format!("column {index}: {e}")))?;

    if value_ref.is_null() {
        return Ok(RawValue::Null);
    }

    let type_name = value_ref.type_info().name().to_string();
    let scan = |e: sqlx::Error| DbError::Scan(format!("column {index} ({type_name}): {e}"));

    let value = match type_name.as_str() {
        "BOOL" => RawValue::Bool(row.try_get(index).map_err(scan)?),
        "INT2" => RawValue::Int(row.try_get::<i16, _>(index).map_err(scan)?.into()),
        "INT4" => RawValue::Int(row.try_get::<i32, _>(index).map_err(scan)?.into()),
        "INT8" => RawValue::Int(row.try_get(index).map_err(scan)?),
        "OID" => RawValue::Int(row.try_get::<Oid, _>(index).map_err(scan)?.0.into()),
        "FLOAT4" => RawValue::Float(row.try_get::<f32, _>(index).map_err(scan)?.into()),
        "FLOAT8" => RawValue::Float(row.try_get(index).map_err(scan)?),
        // sqlx reports bpchar as CHAR and the single-byte "char" type quoted.
        "TEXT" | "VARCHAR" | "NAME" | "CHAR" | "BPCHAR" => RawValue::Text(row.try_get(index).map_err(scan)?),
        "\"CHAR\"" => {
            let byte = row.try_get::<i8, _>(index).map_err(scan)?;
            RawValue::Text(char::from(byte as u8).to_string())
        }
        "BYTEA" => RawValue::Bytes(row.try_get(index).map_err(scan)?),
        "UUID" => RawValue::Text(row.try_get::<uuid::Uuid, _>(index).map_err(scan)?.to_string()),
        "TIMESTAMPTZ" => RawValue::Timestamp(row.try_get::<DateTime<Utc>, _>(index).map_err(scan)?),
        "TIMESTAMP" => {
            let t = row.try_get::<NaiveDateTime, _>(index).map_err(scan)?;
            RawValue::Timestamp(t.and_utc())
        }
        "DATE" => {
            let d = row.try_get::<NaiveDate, _>(index).map_err(scan)?;
            RawValue::Timestamp(d.and_time(NaiveTime::MIN).and_utc())
        }
        "TIME" => RawValue::Text(row.try_get::<NaiveTime, _>(index).map_err(scan)?.to_string()),
        "NUMERIC" => RawValue::Text(
            row.try_get::<bigdecimal::BigDecimal, _>(index)
                .map_err(scan)?
                .to_string(),
        ),
        "MONEY" => RawValue::Text(
            row.try_get::<PgMoney, _>(index)
                .map_err(scan)?
                .to_bigdecimal(2)
                .to_string(),
        ),
        "INTERVAL" => RawValue::Text(interval_text(&row.try_get::<PgInterval, _>(index).map_err(scan)?)),
        "INET" | "CIDR" => RawValue::Text(
            row.try_get::<ipnetwork::IpNetwork, _>(index)
                .map_err(scan)?
                .to_string(),
        ),
        "MACADDR" => RawValue::Text(
            row.try_get::<mac_address::MacAddress, _>(index)
                .map_err(scan)?
                .to_string(),
        ),
        "JSON" | "JSONB" => RawValue::Text(
            row.try_get::<serde_json::Value, _>(index)
                .map_err(scan)?
                .to_string(),
        ),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" | "CHAR[]" | "BPCHAR[]" => {
            let v: Vec<Option<String>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, quote_array_element))
        }
        "INT2[]" => {
            let v: Vec<Option<i16>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |n| n.to_string()))
        }
        "INT4[]" => {
            let v: Vec<Option<i32>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |n| n.to_string()))
        }
        "INT8[]" => {
            let v: Vec<Option<i64>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |n| n.to_string()))
        }
        "FLOAT4[]" => {
            let v: Vec<Option<f32>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |n| n.to_string()))
        }
        "FLOAT8[]" => {
            let v: Vec<Option<f64>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |n| n.to_string()))
        }
        "BOOL[]" => {
            let v: Vec<Option<bool>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |b| if b { "t" } else { "f" }.to_string()))
        }
        "NUMERIC[]" => {
            let v: Vec<Option<bigdecimal::BigDecimal>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |n| n.to_string()))
        }
        "UUID[]" => {
            let v: Vec<Option<uuid::Uuid>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |u| u.to_string()))
        }
        "TIMESTAMPTZ[]" => {
            let v: Vec<Option<DateTime<Utc>>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |t| quote_array_element(t.to_rfc3339())))
        }
        "TIMESTAMP[]" => {
            let v: Vec<Option<NaiveDateTime>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |t| quote_array_element(t.to_string())))
        }
        "DATE[]" => {
            let v: Vec<Option<NaiveDate>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |d| d.to_string()))
        }
        "JSON[]" | "JSONB[]" => {
            let v: Vec<Option<serde_json::Value>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(array_literal(v, |j| quote_array_element(j.to_string())))
        }
        "INT4RANGE" => {
            let r: PgRange<i32> = row.try_get(index).map_err(scan)?;
            RawValue::Text(range_text(&r, |n| n.to_string()))
        }
        "INT8RANGE" => {
            let r: PgRange<i64> = row.try_get(index).map_err(scan)?;
            RawValue::Text(range_text(&r, |n| n.to_string()))
        }
        "NUMRANGE" => {
            let r: PgRange<bigdecimal::BigDecimal> = row.try_get(index).map_err(scan)?;
            RawValue::Text(range_text(&r, |n| n.to_string()))
        }
        "DATERANGE" => {
            let r: PgRange<NaiveDate> = row.try_get(index).map_err(scan)?;
            RawValue::Text(range_text(&r, |d| d.to_string()))
        }
        "TSRANGE" => {
            let r: PgRange<NaiveDateTime> = row.try_get(index).map_err(scan)?;
            RawValue::Text(range_text(&r, |t| t.to_string()))
        }
        "TSTZRANGE" => {
            let r: PgRange<DateTime<Utc>> = row.try_get(index).map_err(scan)?;
            RawValue::Text(range_text(&r, |t| t.to_rfc3339()))
        }
        "TIMETZ" => {
            let t: PgTimeTz<NaiveTime, chrono::FixedOffset> = row.try_get(index).map_err(scan)?;
            RawValue::Text(timetz_text(&t))
        }
        "POINT" => {
            let bytes = value_ref
                .as_bytes()
                .map_err(|e| DbError::Scan(format!("column {index} ({type_name}): {e}")))?;
            let text = point_text(bytes).ok_or_else(|| {
                DbError::Scan(format!("column {index} ({type_name}): malformed point"))
            })?;
            RawValue::Text(text)
        }
        _ => {
            if let Ok(s) = row.try_get::<String, _>(index) {
                return Ok(RawValue::Text(s));
            }
            // Enums and domains over text travel as their text form; any other
            // binary payload is not shown.
            if has_text_wire_format(&value_ref.type_info()) {
                let bytes = value_ref
                    .as_bytes()
                    .map_err(|e| DbError::Scan(format!("column {index} ({type_name}): {e}")))?;
                RawValue::Text(String::from_utf8_lossy(bytes).into_owned())
            } else {
                tracing::debug!(column = index, column_type = %type_name, "no decoder for column type");
                RawValue::Text(unsupported_placeholder(&type_name))
            }
        }
    };

    Ok(value)
}

/// Text shown for values of types this decoder does not understand.
pub fn unsupported_placeholder(type_name: &str) -> String {
    format!("<unsupported type {type_name}>")
}

fn has_text_wire_format(info: &PgTypeInfo) -> bool {
    match info.kind() {
        PgTypeKind::Enum(_) => true,
        PgTypeKind::Domain(base) => has_text_wire_format(base),
        _ => matches!(
            info.name().to_ascii_uppercase().as_str(),
            "TEXT" | "VARCHAR" | "NAME" | "CHAR" | "BPCHAR" | "CITEXT" | "UNKNOWN"
        ),
    }
}

/// Renders a range the way Postgres prints it: `[1,5)`, `(,10]`.
fn range_text<T, F>(range: &PgRange<T>, render: F) -> String
where
    F: Fn(&T) -> String,
{
    let bound = |b: &Bound<T>| match b {
        Bound::Included(v) | Bound::Excluded(v) => quote_range_bound(render(v)),
        Bound::Unbounded => String::new(),
    };
    let open = if matches!(range.start, Bound::Included(_)) { '[' } else { '(' };
    let close = if matches!(range.end, Bound::Included(_)) { ']' } else { ')' };
    format!("{open}{},{}{close}", bound(&range.start), bound(&range.end))
}

fn timetz_text(t: &PgTimeTz<NaiveTime, chrono::FixedOffset>) -> String {
    format!("{}{}", t.time, t.offset)
}

/// Binary `point`: two big-endian float8s.
fn point_text(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 16 {
        return None;
    }
    let x = f64::from_be_bytes(bytes[..8].try_into().ok()?);
    let y = f64::from_be_bytes(bytes[8..].try_into().ok()?);
    Some(format!("({x},{y})"))
}

/// Renders a one-dimensional array the way Postgres prints it: `{1,NULL,3}`.
fn array_literal<T, F>(items: Vec<Option<T>>, render: F) -> String
where
    F: Fn(T) -> String,
{
    let parts: Vec<String> = items
        .into_iter()
        .map(|item| item.map(&render).unwrap_or_else(|| "NULL".to_string()))
        .collect();
    format!("{{{}}}", parts.join(","))
}

fn quote_array_element(s: String) -> String {
    let needs_quotes = s.is_empty()
        || s.eq_ignore_ascii_case("null")
        || s
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        return s;
    }
    escape_quoted(&s)
}

fn quote_range_bound(s: String) -> String {
    let needs_quotes = s.is_empty()
        || s
            .chars()
            .any(|c| matches!(c, '(' | ')' | '[' | ']' | ',' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        return s;
    }
    escape_quoted(&s)
}

fn escape_quoted(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// ISO 8601 duration, e.g. `P1M2DT3.5S`.
fn interval_text(interval: &PgInterval) -> String {
    let seconds = interval.microseconds as f64 / 1_000_000.0;
    format!("P{}M{}DT{}S", interval.months, interval.days, seconds)
}

/// Drops repeated entries, keeping the first occurrence of each.
fn dedup_stable(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}
