//! # Store Error Types
//!
//! Every backend reports failures with the same four kinds.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error / reqwest::Error / HTTP status                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module)                                              │
//! │       ├── Unavailable ─┐                                                │
//! │       ├── Timeout ─────┴─► transient: RetryingStore backs off, retries │
//! │       ├── Rejected ────► terminal: constraint, unknown column, 4xx     │
//! │       └── Decode ──────► terminal: row did not match the record type   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError (kasa-engine) → ApiError (api-server)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or failed server-side.
    ///
    /// ## When This Occurs
    /// - Connection refused / reset, pool closed or exhausted
    /// - PostgREST answered 5xx
    /// - Fault injected by `MemoryStore`
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the operation. Retrying will not help.
    ///
    /// ## When This Occurs
    /// - UNIQUE / CHECK / FOREIGN KEY violation
    /// - Unknown table column in a filter or record
    /// - PostgREST answered 4xx
    #[error("Store rejected operation: {0}")]
    Rejected(String),

    /// A single call exceeded the configured per-call timeout.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// A row could not be decoded into the requested record type.
    #[error("Failed to decode record: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }

    /// Whether this is a uniqueness violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Rejected(msg) => {
                msg.contains("UNIQUE constraint failed")
                    || msg.contains("duplicate key")
                    || msg.contains("unique violation")
            }
            _ => false,
        }
    }
}

/// Convert sqlx errors to StoreError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database       → Rejected (constraint or SQL error)
/// sqlx::Error::ColumnDecode   → Decode
/// sqlx::Error::PoolTimedOut   → Unavailable
/// sqlx::Error::Io / PoolClosed→ Unavailable
/// Other                       → Unavailable
/// ```
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                // SQLITE_BUSY / SQLITE_LOCKED clear once the other writer finishes
                if msg.contains("database is locked") || msg.contains("database table is locked") {
                    StoreError::Unavailable(msg.to_string())
                } else {
                    StoreError::Rejected(msg.to_string())
                }
            }
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::Decode(format!("column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => StoreError::Decode(source.to_string()),
            sqlx::Error::PoolTimedOut => StoreError::Unavailable("Connection pool exhausted".to_string()),
            sqlx::Error::PoolClosed => StoreError::Unavailable("Pool is closed".to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unavailable(format!("Migration failed: {}", err))
    }
}

/// Transport-level reqwest failures. HTTP statuses are mapped by the REST
/// adapter itself.
impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!StoreError::Rejected("bad".into()).is_transient());
        assert!(!StoreError::Decode("bad".into()).is_transient());
    }

    #[test]
    fn test_unique_violation_detection() {
        let sqlite = StoreError::Rejected("UNIQUE constraint failed: products.barcode".into());
        let postgres = StoreError::Rejected(
            "duplicate key value violates unique constraint \"products_barcode_key\"".into(),
        );
        assert!(sqlite.is_unique_violation());
        assert!(postgres.is_unique_violation());
        assert!(!StoreError::Unavailable("UNIQUE constraint failed".into()).is_unique_violation());
    }
}
