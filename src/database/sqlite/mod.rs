use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Pool, Row, Sqlite, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::debug;

use super::connection::Dialect;
use super::params::{Params, bind_named, bind_values};
use super::{Backend, CellValue, ColumnInfo, ForeignKey, QueryOutcome, display_type_name};

#[cfg(test)]
mod tests;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: DbPool,
}

impl SqliteBackend {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid SQLite URL: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to :memory: is its own database, so keep exactly one alive
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(10)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn table_sql(&self, table: &str) -> Result<Option<String>> {
        let sql: Option<Option<String>> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read table definition")?;
        Ok(sql.flatten())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn server_version(&self) -> Result<String> {
        let version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tables")?;
        Ok(names)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read columns of {}", table))?;

        // AUTOINCREMENT only applies to an INTEGER PRIMARY KEY column
        let declares_autoincrement = self
            .table_sql(table)
            .await?
            .is_some_and(|sql| sql.to_uppercase().contains("AUTOINCREMENT"));
        let single_pk = rows.iter().filter(|row| row.4 > 0).count() == 1;

        Ok(rows
            .into_iter()
            .map(|(name, declared_type, notnull, default, pk)| ColumnInfo {
                autoincrement: declares_autoincrement
                    && single_pk
                    && pk > 0
                    && declared_type.eq_ignore_ascii_case("INTEGER"),
                data_type: display_type_name(&declared_type),
                nullable: notnull == 0,
                default,
                name,
            })
            .collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk")
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .with_context(|| format!("Failed to read primary key of {}", table))?;
        Ok(names)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read foreign keys of {}", table))?;

        let mut keys = super::group_foreign_keys(rows.into_iter().map(
            |(id, referred_table, from, to)| {
                (id.to_string(), from, referred_table, to.unwrap_or_default())
            },
        ));

        // A missing target column means the referred table's primary key
        for key in &mut keys {
            if key.referred_columns.iter().any(String::is_empty) {
                key.referred_columns = self.primary_key(&key.referred_table).await?;
            }
        }

        Ok(keys)
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

fn decode_row(row: &SqliteRow) -> Result<Vec<CellValue>> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

/// Decode by the value's storage class; declared column types are advisory in SQLite
fn decode_cell(row: &SqliteRow, index: usize) -> Result<CellValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" => row.try_get(index).ok().map(CellValue::Int),
        "REAL" => row.try_get(index).ok().map(CellValue::Float),
        "TEXT" => row.try_get(index).ok().map(CellValue::Text),
        "BLOB" => row.try_get(index).ok().map(CellValue::Bytes),
        _ => None,
    };

    Ok(value
        .or_else(|| row.try_get(index).ok().map(CellValue::Text))
        .or_else(|| row.try_get(index).ok().map(CellValue::Int))
        .or_else(|| row.try_get(index).ok().map(CellValue::Float))
        .unwrap_or(CellValue::Unsupported(storage)))
}
