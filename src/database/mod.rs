//! Database access layer
//!
//! A [`Backend`] wraps a sqlx connection pool for one SQL dialect and exposes
//! the introspection and query operations the MCP tools are built on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::Decimal;
use std::sync::Arc;
use tracing::info;

pub mod connection;
pub mod mysql;
pub mod params;
pub mod postgres;
pub mod sqlite;


pub use connection::{ConnectionInfo, DatabaseUrl, Dialect};
pub use mysql::MySqlBackend;
pub use params::{BindValue, BoundQuery, Params};
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

/// Column metadata as reported by the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub autoincrement: bool,
}

/// A foreign key constraint on a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

/// A single decoded value from a result row
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<Utc>),
    /// Postgres `INTERVAL` components
    Interval {
        months: i32,
        days: i32,
        microseconds: i64,
    },
    /// Postgres `MONEY` in cents
    Money(i64),
    Json(serde_json::Value),
    Uuid(uuid::Uuid),
    Array(Vec<CellValue>),
    /// A value whose type has no decoder; holds the database type name
    Unsupported(String),
}

/// Result of executing a statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Statement produced no result set
    Affected(u64),
    /// Statement produced a (possibly empty) result set
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    },
}

/// Operations every supported database must provide
#[async_trait]
pub trait Backend: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Server version, dotted (e.g. `16.2` or `3.45.1`)
    async fn server_version(&self) -> Result<String>;

    /// Names of user tables, sorted
    async fn table_names(&self) -> Result<Vec<String>>;

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Primary key columns in key order
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    async fn execute(&self, query: &str, params: &Params) -> Result<QueryOutcome>;

    async fn close(&self);
}

/// Open a connection pool for the given database URL
pub async fn connect(url: &DatabaseUrl) -> Result<Arc<dyn Backend>> {
    info!("Creating database engine (dialect={})", url.dialect.name());

    let backend: Arc<dyn Backend> = match url.dialect {
        Dialect::Sqlite => Arc::new(SqliteBackend::connect(&url.sqlx_url).await?),
        Dialect::Postgres => Arc::new(PostgresBackend::connect(&url.sqlx_url).await?),
        Dialect::MySql => Arc::new(MySqlBackend::connect(&url.sqlx_url).await?),
    };

    Ok(backend)
}

/// Build the one-line summary of the connected database
pub async fn db_info(backend: &dyn Backend, info: &ConnectionInfo) -> Result<String> {
    let version = backend
        .server_version()
        .await
        .context("Failed to query database server version")?;

    let summary = format!(
        "Connected to {} version {} database '{}' on {} as user '{}'",
        backend.dialect().name(),
        version,
        or_none(info.database.as_deref()),
        or_none(info.host.as_deref()),
        or_none(info.username.as_deref()),
    );
    info!("{}", summary);
    Ok(summary)
}

fn or_none(value: Option<&str>) -> &str {
    value.unwrap_or("None")
}

/// Group `(constraint, column, referred table, referred column)` rows into
/// foreign keys, keeping first-seen constraint order
pub fn group_foreign_keys<I>(rows: I) -> Vec<ForeignKey>
where
    I: IntoIterator<Item = (String, String, String, String)>,
{
    let mut names: Vec<String> = Vec::new();
    let mut keys: Vec<ForeignKey> = Vec::new();

    for (constraint, column, referred_table, referred_column) in rows {
        if let Some(pos) = names.iter().position(|n| *n == constraint) {
            let key = &mut keys[pos];
            key.constrained_columns.push(column);
            key.referred_columns.push(referred_column);
        } else {
            names.push(constraint);
            keys.push(ForeignKey {
                constrained_columns: vec![column],
                referred_table,
                referred_columns: vec![referred_column],
            });
        }
    }

    keys
}

/// Normalise a catalog type name for display (`character varying(20)` ->
/// `CHARACTER VARYING(20)`)
pub fn display_type_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        // SQLite columns may be declared without a type
        return "NULL".to_string();
    }
    trimmed.to_uppercase()
}
