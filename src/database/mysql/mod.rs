use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::types::Decimal;
use sqlx::{Column, Executor, MySql, Pool, Row, Statement, TypeInfo, ValueRef};
use tracing::debug;

use super::connection::Dialect;
use super::params::{Params, bind_named, bind_values};
use super::{Backend, CellValue, ColumnInfo, ForeignKey, QueryOutcome, display_type_name};

#[cfg(test)]
mod tests;

pub type DbPool = Pool<MySql>;

#[derive(Debug, Clone)]
pub struct MySqlBackend {
    pool: DbPool,
}

impl MySqlBackend {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to create database connection pool")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn server_version(&self) -> Result<String> {
        let version: String = sqlx::query_scalar("SELECT CAST(VERSION() AS CHAR)")
            .fetch_one(&self.pool)
            .await?;
        Ok(trim_version(&version))
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tables")?;
        Ok(names)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT CAST(column_name AS CHAR), CAST(column_type AS CHAR), CAST(is_nullable AS CHAR), \
                    CAST(column_default AS CHAR), CAST(extra AS CHAR) \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read columns of {}", table))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default, extra)| ColumnInfo {
                data_type: display_type_name(&data_type),
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                default,
                autoincrement: extra.to_ascii_lowercase().contains("auto_increment"),
                name,
            })
            .collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT CAST(column_name AS CHAR) FROM information_schema.key_column_usage \
             WHERE table_schema = DATABASE() AND table_name = ? AND constraint_name = 'PRIMARY' \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read primary key of {}", table))?;
        Ok(names)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT CAST(constraint_name AS CHAR), CAST(column_name AS CHAR), \
                    CAST(referenced_table_name AS CHAR), CAST(referenced_column_name AS CHAR) \
             FROM information_schema.key_column_usage \
             WHERE table_schema = DATABASE() AND table_name = ? AND referenced_table_name IS NOT NULL \
             ORDER BY constraint_name, ordinal_position",
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

        if statement.columns().is_empty() {
            let result = bind_values(sqlx::query(&bound.sql), &bound.values)
                .execute(&self.pool)
                .await?;
            return Ok(QueryOutcome::Affected(result.rows_affected()));
        }

        let columns = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        let rows = bind_values(sqlx::query(&bound.sql), &bound.values)
            .fetch_all(&self.pool)
            .await?;
        debug!("Fetched {} rows", rows.len());

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(QueryOutcome::Rows { columns, rows })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_row(row: &MySqlRow) -> Result<Vec<CellValue>> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

/// How a column is decoded, chosen from the sqlx type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Binary,
    /// Text and anything else; decoded by trying the common Rust types in turn
    Other,
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOLEAN" => ColumnKind::Bool,
        "YEAR" | "BIT" => ColumnKind::Unsigned,
        name if name.ends_with(" UNSIGNED") => ColumnKind::Unsigned,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => ColumnKind::Signed,
        "FLOAT" => ColumnKind::Float,
        "DOUBLE" => ColumnKind::Double,
        "DECIMAL" => ColumnKind::Decimal,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "DATETIME" => ColumnKind::DateTime,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "JSON" => ColumnKind::Json,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            ColumnKind::Binary
        }
        _ => ColumnKind::Other,
    }
}

/// "8.0.36-0ubuntu0.22.04.1" or "10.11.6-MariaDB" -> leading dotted number
fn trim_version(version: &str) -> String {
    version
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .next()
        .unwrap_or_default()
        .to_string()
}

fn decode_cell(row: &MySqlRow, index: usize) -> Result<CellValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match column_kind(&type_name) {
        ColumnKind::Bool => row.try_get(index).ok().map(CellValue::Bool),
        ColumnKind::Unsigned => row.try_get(index).ok().map(CellValue::UInt),
        ColumnKind::Signed => row.try_get(index).ok().map(CellValue::Int),
        ColumnKind::Float => row.try_get::<f32, _>(index).ok().map(|v| CellValue::Float(v.into())),
        ColumnKind::Double => row.try_get(index).ok().map(CellValue::Float),
        ColumnKind::Decimal => row.try_get::<Decimal, _>(index).ok().map(CellValue::Decimal),
        ColumnKind::Date => row.try_get::<NaiveDate, _>(index).ok().map(CellValue::Date),
        ColumnKind::Time => row.try_get::<NaiveTime, _>(index).ok().map(CellValue::Time),
        ColumnKind::DateTime => row.try_get::<NaiveDateTime, _>(index).ok().map(CellValue::DateTime),
        ColumnKind::Timestamp => {
            row.try_get::<DateTime<Utc>, _>(index).ok().map(CellValue::DateTimeTz)
        }
        ColumnKind::Json => row.try_get(index).ok().map(CellValue::Json),
        ColumnKind::Binary => row.try_get(index).ok().map(CellValue::Bytes),
        ColumnKind::Other => None,
    };

    Ok(value
        .or_else(|| row.try_get(index).ok().map(CellValue::Text))
        .or_else(|| row.try_get(index).ok().map(CellValue::Int))
        .or_else(|| row.try_get(index).ok().map(CellValue::Float))
        .or_else(|| row.try_get(index).ok().map(CellValue::Bytes))
        .unwrap_or(CellValue::Unsupported(type_name)))
}
