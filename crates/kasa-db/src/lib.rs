//! # kasa-db: Storage Layer for Kasa POS
//!
//! One storage interface with four primitive operations, and three backends
//! behind it. The engine never sees which backend it is talking to.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasa POS Data Flow                               │
//! │                                                                         │
//! │  kasa-engine (SaleEngine, InventoryLedger, Till, ...)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kasa-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   Store ──► RetryingStore ──► DataStore                         │   │
//! │  │                                   ├── SqliteStore  (pool.rs)    │   │
//! │  │                                   ├── RestStore    (rest.rs)    │   │
//! │  │                                   └── MemoryStore  (memory.rs)  │   │
//! │  │                                                                 │   │
//! │  │   Table (column whitelist) • Filter • Record                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL)   or   Supabase PostgREST over HTTPS               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - `DataStore` trait and the typed `Store` handle
//! - [`table`] - Table names and column whitelists
//! - [`filter`] - Conditions, ordering, limit
//! - [`record`] - Column → value rows
//! - [`pool`] - SQLite backend and pool configuration
//! - [`rest`] - PostgREST backend
//! - [`memory`] - In-memory backend with fault injection
//! - [`retry`] - Timeout and backoff decorator
//! - [`migrations`] - Embedded SQLite migrations
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kasa_db::{DbConfig, RetryConfig, RetryingStore, SqliteStore, Store};
//!
//! let sqlite = SqliteStore::connect(DbConfig::new("./kasa.db")).await?;
//! let store = Store::new(RetryingStore::new(sqlite, RetryConfig::default()));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod filter;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod record;
pub mod rest;
pub mod retry;
pub mod store;
pub mod table;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use filter::{Condition, Filter, FilterOp, SortOrder};
pub use memory::{Fault, FaultKind, MemoryStore, StoreOp};
pub use pool::{DbConfig, SqliteStore};
pub use record::Record;
pub use rest::{RestConfig, RestStore};
pub use retry::{RetryConfig, RetryingStore};
pub use store::{DataStore, Store, PAGE_SIZE};
pub use table::{Table, DEDUP_COLUMN};
