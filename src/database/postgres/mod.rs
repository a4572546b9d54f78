use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgPoint, PgRange, PgTimeTz};
use sqlx::postgres::{PgHasArrayType, PgPoolOptions, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::types::Decimal;
use sqlx::types::ipnet::IpNet;
use sqlx::{
    Column, Decode, Either, Executor, Pool, Postgres, Row, Statement, Type, TypeInfo, ValueRef,
};
use tracing::debug;

use super::connection::Dialect;
use super::params::{BoundQuery, Params, bind_named};
use super::{Backend, CellValue, ColumnInfo, ForeignKey, QueryOutcome, display_type_name};

mod bind;


use bind::{PgParam, PgQuery, conversion_type_name};

pub type DbPool = Pool<Postgres>;

#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: DbPool,
}

impl PostgresBackend {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to create database connection pool")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn server_version(&self) -> Result<String> {
        let version: String = sqlx::query_scalar("SHOW server_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(short_version(&version))
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tables")?;
        Ok(names)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, bool, Option<String>, bool)> = sqlx::query_as(
            "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod), NOT a.attnotnull, \
                    pg_get_expr(d.adbin, d.adrelid), a.attidentity <> '' \
             FROM pg_attribute a \
             LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
             WHERE a.attrelid = quote_ident($1)::regclass AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read columns of {}", table))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, nullable, default, identity)| ColumnInfo {
                autoincrement: identity
                    || default
                        .as_deref()
                        .is_some_and(|d| d.starts_with("nextval(")),
                data_type: display_type_name(&data_type),
                nullable,
                default,
                name,
            })
            .collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT a.attname::text \
             FROM pg_index i \
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
             WHERE i.indrelid = quote_ident($1)::regclass AND i.indisprimary \
             ORDER BY array_position(i.indkey::int2[], a.attnum)",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read primary key of {}", table))?;
        Ok(names)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT con.conname::text, att.attname::text, ref.relname::text, ratt.attname::text \
             FROM pg_constraint con \
             CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord) \
             JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum \
             JOIN pg_class ref ON ref.oid = con.confrelid \
             JOIN pg_attribute ratt ON ratt.attrelid = con.confrelid AND ratt.attnum = k.refnum \
             WHERE con.contype = 'f' AND con.conrelid = quote_ident($1)::regclass \
             ORDER BY con.conname, k.ord",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read foreign keys of {}", table))?;

        Ok(super::group_foreign_keys(rows))
    }

    async fn execute(&self, query: &str, params: &Params) -> Result<QueryOutcome> {
        let bound = bind_named(query, params, self.dialect().placeholder_style())?;
        let statement = self.pool.prepare(&bound.sql).await?;
        let parameter_types = match statement.parameters() {
            Some(Either::Left(types)) => types.to_vec(),
            _ => Vec::new(),
        };
        let prepared = bind_inferred(sqlx::query(&bound.sql), &bound, params, &parameter_types)?;

        if statement.columns().is_empty() {
            let result = prepared.execute(&self.pool).await?;
            return Ok(QueryOutcome::Affected(result.rows_affected()));
        }

        let columns = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        let rows = prepared.fetch_all(&self.pool).await?;
        debug!("Fetched {} rows", rows.len());

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(QueryOutcome::Rows { columns, rows })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Bind each value as the type Postgres inferred for its placeholder
fn bind_inferred<'q>(
    mut query: PgQuery<'q>,
    bound: &BoundQuery,
    params: &Params,
    parameter_types: &[PgTypeInfo],
) -> Result<PgQuery<'q>> {
    if bound.names.len() != parameter_types.len() {
        bail!(
            "Statement expects {} parameters but {} were bound",
            parameter_types.len(),
            bound.names.len()
        );
    }

    for (name, type_info) in bound.names.iter().zip(parameter_types) {
        let value = params.get(name).unwrap_or(&serde_json::Value::Null);
        let param = PgParam::convert(value, conversion_type_name(type_info)).with_context(|| {
            format!(
                "Invalid value for bind parameter '{}' of type {}",
                name,
                type_info.name()
            )
        })?;
        query = param.bind(query, type_info);
    }

    Ok(query)
}

fn decode_row(row: &PgRow) -> Result<Vec<CellValue>> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

fn decode_cell(row: &PgRow, index: usize) -> Result<CellValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_info = raw.type_info().into_owned();

    // Enum labels travel as plain text
    if let PgTypeKind::Enum(_) = type_info.kind() {
        if let Ok(label) = raw.as_str() {
            return Ok(CellValue::Text(label.to_string()));
        }
    }

    let value = match type_info.name() {
        "BOOL" => get(row, index, CellValue::Bool),
        "INT2" => get(row, index, |v: i16| CellValue::Int(v.into())),
        "INT4" => get(row, index, |v: i32| CellValue::Int(v.into())),
        "INT8" => get(row, index, CellValue::Int),
        "OID" => get(row, index, |v: Oid| CellValue::UInt(v.0.into())),
        "FLOAT4" => get(row, index, |v: f32| CellValue::Float(v.into())),
        "FLOAT8" => get(row, index, CellValue::Float),
        "NUMERIC" => get(row, index, CellValue::Decimal),
        "MONEY" => get(row, index, |v: PgMoney| CellValue::Money(v.0)),
        "DATE" => get(row, index, CellValue::Date),
        "TIME" => get(row, index, CellValue::Time),
        "TIMETZ" => get(row, index, |v: PgTimeTz<NaiveTime, FixedOffset>| {
            CellValue::TimeTz(v.time, v.offset)
        }),
        "TIMESTAMP" => get(row, index, CellValue::DateTime),
        "TIMESTAMPTZ" => get(row, index, CellValue::DateTimeTz),
        "INTERVAL" => get(row, index, |v: PgInterval| CellValue::Interval {
            months: v.months,
            days: v.days,
            microseconds: v.microseconds,
        }),
        "UUID" => get(row, index, CellValue::Uuid),
        "JSON" | "JSONB" => get(row, index, CellValue::Json),
        "BYTEA" => get(row, index, CellValue::Bytes),
        "INET" => get(row, index, |v: IpNet| CellValue::Text(inet_text(v, false))),
        "CIDR" => get(row, index, |v: IpNet| CellValue::Text(inet_text(v, true))),
        "\"CHAR\"" => get(row, index, |v: i8| {
            CellValue::Text(char::from(v.to_ne_bytes()[0]).to_string())
        }),
        "POINT" => get(row, index, |v: PgPoint| {
            CellValue::Text(format!("({},{})", v.x, v.y))
        }),
        "INT4RANGE" => get(row, index, |v: PgRange<i32>| CellValue::Text(v.to_string())),
        "INT8RANGE" => get(row, index, |v: PgRange<i64>| CellValue::Text(v.to_string())),
        "NUMRANGE" => get(row, index, |v: PgRange<Decimal>| CellValue::Text(v.to_string())),
        "DATERANGE" => get(row, index, |v: PgRange<NaiveDate>| CellValue::Text(v.to_string())),
        "TSRANGE" => get(row, index, |v: PgRange<NaiveDateTime>| {
            CellValue::Text(v.to_string())
        }),
        "TSTZRANGE" => get(row, index, |v: PgRange<DateTime<Utc>>| {
            CellValue::Text(v.to_string())
        }),
        "BOOL[]" => list(row, index, CellValue::Bool),
        "INT2[]" => list(row, index, |v: i16| CellValue::Int(v.into())),
        "INT4[]" => list(row, index, |v: i32| CellValue::Int(v.into())),
        "INT8[]" => list(row, index, CellValue::Int),
        "FLOAT4[]" => list(row, index, |v: f32| CellValue::Float(v.into())),
        "FLOAT8[]" => list(row, index, CellValue::Float),
        "NUMERIC[]" => list(row, index, CellValue::Decimal),
        "DATE[]" => list(row, index, CellValue::Date),
        "TIME[]" => list(row, index, CellValue::Time),
        "TIMESTAMP[]" => list(row, index, CellValue::DateTime),
        "TIMESTAMPTZ[]" => list(row, index, CellValue::DateTimeTz),
        "UUID[]" => list(row, index, CellValue::Uuid),
        "INTERVAL[]" => list(row, index, |v: PgInterval| CellValue::Interval {
            months: v.months,
            days: v.days,
            microseconds: v.microseconds,
        }),
        "MONEY[]" => list(row, index, |v: PgMoney| CellValue::Money(v.0)),
        "INET[]" => list(row, index, |v: IpNet| CellValue::Text(inet_text(v, false))),
        "CIDR[]" => list(row, index, |v: IpNet| CellValue::Text(inet_text(v, true))),
        "JSON[]" | "JSONB[]" => list(row, index, CellValue::Json),
        "TEXT[]" | "VARCHAR[]" | "CHAR[]" | "NAME[]" => list(row, index, CellValue::Text),
        _ => None,
    };

    Ok(value
        .or_else(|| get(row, index, CellValue::Text))
        .unwrap_or_else(|| CellValue::Unsupported(type_info.name().to_string())))
}

fn get<'r, T, F>(row: &'r PgRow, index: usize, cell: F) -> Option<CellValue>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
    F: FnOnce(T) -> CellValue,
{
    row.try_get::<T, _>(index).ok().map(cell)
}

/// Decode a one-dimensional array, keeping null elements
fn list<T, F>(row: &PgRow, index: usize, cell: F) -> Option<CellValue>
where
    T: for<'a> Decode<'a, Postgres> + Type<Postgres> + PgHasArrayType,
    F: Fn(T) -> CellValue,
{
    let items = row.try_get::<Vec<Option<T>>, _>(index).ok()?;
    Some(CellValue::Array(
        items
            .into_iter()
            .map(|item| item.map_or(CellValue::Null, &cell))
            .collect(),
    ))
}

/// `INET` hides a full-length prefix, `CIDR` always shows it
fn inet_text(net: IpNet, cidr: bool) -> String {
    if !cidr && net.prefix_len() == net.max_prefix_len() {
        net.addr().to_string()
    } else {
        net.to_string()
    }
}

/// "16.2 (Debian 16.2-1.pgdg120+2)" -> "16.2"
fn short_version(version: &str) -> String {
    version
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}
