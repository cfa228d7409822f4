//! # SQLite Store
//!
//! Connection pool creation and the SQLite implementation of [`DataStore`].
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SQLite Store                                       │
//! │                                                                         │
//! │  DbConfig::new(path)           ← pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SqliteStore::connect(config)  ← pool + embedded migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  get / insert / update / delete                                        │
//! │       │  Table + Filter + Record                                       │
//! │       ▼                                                                 │
//! │  SQL built from whitelisted column names, every value bound            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Rows decoded column-by-column by storage class into a Record          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! Readers don't block writers and writers don't block readers, which keeps
//! reports responsive while a sale is committing.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::filter::{Filter, FilterOp, SortOrder};
use crate::migrations;
use crate::record::Record;
use crate::store::DataStore;
use crate::table::Table;

// =============================================================================
// Configuration
// =============================================================================

/// SQLite pool configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/kasa/kasa.db").max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the database file. Created if missing.
    pub database_path: PathBuf,

    /// Default: 5
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Isolated in-memory database for tests.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            // every connection to :memory: is a separate database
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// SQLite-backed [`DataStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database and runs migrations.
    ///
    /// SQLite is configured with WAL journaling, NORMAL synchronous and
    /// foreign keys on.
    pub async fn connect(config: DbConfig) -> StoreResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing SQLite store"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await?;

        info!(max_connections = config.max_connections, "SQLite pool created");

        let store = SqliteStore { pool };
        if config.run_migrations {
            store.run_migrations().await?;
        }
        Ok(store)
    }

    /// Shorthand for `connect(DbConfig::in_memory())`.
    pub async fn in_memory() -> StoreResult<Self> {
        SqliteStore::connect(DbConfig::in_memory()).await
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        info!("Closing SQLite pool");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        filter.validate_for(table)?;
        let (where_sql, args) = where_clause(filter)?;

        let mut sql = format!("SELECT * FROM {}{}", table.name(), where_sql);
        if let Some((column, order)) = filter.ordering() {
            let direction = match order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}", column, direction));
        }
        if let Some(limit) = filter.max_rows() {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        debug!(sql = %sql, "sqlite get");

        let rows = bind_all(sqlx::query(&sql), args).fetch_all(&self.pool).await?;
        rows.iter().map(|row| row_to_record(table, row)).collect()
    }

    async fn insert(&self, table: Table, record: &Record) -> StoreResult<Option<Record>> {
        table.check_record(record)?;

        let sql = if record.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table.name())
        } else {
            let columns: Vec<&str> = record.columns().collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                table.name(),
                columns.join(", "),
                placeholders
            )
        };
        let args = record
            .iter()
            .map(|(column, value)| to_sql_value(column, value))
            .collect::<StoreResult<Vec<_>>>()?;
        debug!(sql = %sql, "sqlite insert");

        let row = bind_all(sqlx::query(&sql), args).fetch_one(&self.pool).await?;
        row_to_record(table, &row).map(Some)
    }

    async fn update(&self, table: Table, filter: &Filter, patch: &Record) -> StoreResult<u64> {
        filter.require_conditions(table, "update")?;
        filter.validate_for(table)?;
        table.check_record(patch)?;
        if patch.is_empty() {
            return Err(StoreError::Rejected(format!("empty update on {}", table)));
        }

        let mut args = Vec::with_capacity(patch.len() + filter.conditions().len());
        let mut assignments = Vec::with_capacity(patch.len());
        for (column, value) in patch.iter() {
            assignments.push(format!("{} = ?", column));
            args.push(to_sql_value(column, value)?);
        }
        let (where_sql, where_args) = where_clause(filter)?;
        args.extend(where_args);

        let sql = format!("UPDATE {} SET {}{}", table.name(), assignments.join(", "), where_sql);
        debug!(sql = %sql, "sqlite update");

        let result = bind_all(sqlx::query(&sql), args).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        filter.require_conditions(table, "delete")?;
        filter.validate_for(table)?;
        let (where_sql, args) = where_clause(filter)?;

        let sql = format!("DELETE FROM {}{}", table.name(), where_sql);
        debug!(sql = %sql, "sqlite delete");

        let result = bind_all(sqlx::query(&sql), args).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// SQL Helpers
// =============================================================================

/// Owned bind value.
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

fn to_sql_value(column: &str, value: &Value) -> StoreResult<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Int(*b as i64)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Int(i)),
            None => n
                .as_f64()
                .map(SqlValue::Real)
                .ok_or_else(|| StoreError::Rejected(format!("{} is out of range", column))),
        },
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(StoreError::Rejected(format!(
            "{} must be a scalar value",
            column
        ))),
    }
}

/// Renders the conditions of `filter` as ` WHERE ...` with bind values.
fn where_clause(filter: &Filter) -> StoreResult<(String, Vec<SqlValue>)> {
    if filter.is_unfiltered() {
        return Ok((String::new(), Vec::new()));
    }

    let mut parts = Vec::with_capacity(filter.conditions().len());
    let mut args = Vec::new();
    for condition in filter.conditions() {
        if condition.value.is_null() {
            let part = match condition.op {
                FilterOp::Eq => format!("{} IS NULL", condition.column),
                FilterOp::Neq => format!("{} IS NOT NULL", condition.column),
                // ordering against NULL is never true
                _ => "0".to_string(),
            };
            parts.push(part);
        } else {
            parts.push(format!("{} {} ?", condition.column, condition.op.sql()));
            args.push(to_sql_value(&condition.column, &condition.value)?);
        }
    }
    Ok((format!(" WHERE {}", parts.join(" AND ")), args))
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: Vec<SqlValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::Real(f) => query.bind(f),
            SqlValue::Text(s) => query.bind(s),
        };
    }
    query
}

/// Decodes a row by each value's storage class.
fn row_to_record(table: Table, row: &SqliteRow) -> StoreResult<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let storage_class = {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match storage_class.as_deref() {
            None => Value::Null,
            Some("INTEGER") | Some("BOOLEAN") => {
                let i: i64 = row.try_get(index)?;
                if table.is_boolean(name) {
                    Value::Bool(i != 0)
                } else {
                    Value::from(i)
                }
            }
            Some("REAL") => {
                let f: f64 = row.try_get(index)?;
                Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
            }
            Some(_) => {
                let s: String = row.try_get(index)?;
                Value::String(s)
            }
        };
        record.set(name, value);
    }
    Ok(record)
}

// =============================================================================
// Unit Tests
// =============================================================================
