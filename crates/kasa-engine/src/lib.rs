//! # kasa-engine: Sale & Cash-Register Consistency Engine
//!
//! The workflows of Kasa POS, written once against [`kasa_db::Store`] and
//! run unchanged on SQLite, PostgREST or the in-memory store.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   SaleEngine ──── creates ────► sales, sale_items                       │
//! │     │                                                                   │
//! │     ├── InventoryLedger ─ owns ─► products.quantity, stock_movements    │
//! │     │                                                                   │
//! │     ├── Till ──────────── owns ─► cash_register, cash_transactions      │
//! │     │     └── ReconciliationReporter (reads sales)                      │
//! │     │                                                                   │
//! │     └── AuditLog ──────── owns ─► audit_logs (never fails a caller)     │
//! │                                                                         │
//! │   Catalog ──► InventoryLedger       Reports (read only)                 │
//! │   Authenticator ──► users                                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No component writes a table another one owns.
//!
//! ## Usage
//! ```rust,ignore
//! use kasa_db::{MemoryStore, Store};
//! use kasa_engine::{Actor, Engine};
//!
//! let engine = Engine::new(Store::new(MemoryStore::new()));
//! engine.till.open(Money::from_cents(10_000), &Actor::new(1)).await?;
//! let receipt = engine.sales.execute(request, Actor::new(1)).await?;
//! ```

pub mod audit;
pub mod auth;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod reconciliation;
pub mod reports;
pub mod sale;
pub mod till;

pub use audit::{Actor, AuditLog};
pub use auth::Authenticator;
pub use catalog::Catalog;
pub use error::{CommittedLine, EngineError, EngineResult, PartialSale, SaleStep};
pub use ledger::{DeltaOutcome, InventoryLedger, NewProductFields, StockDelta};
pub use reconciliation::ReconciliationReporter;
pub use reports::{Health, Reports, StockReport};
pub use sale::{SaleEngine, SaleReceipt, SaleStatus, StockWarning};
pub use till::Till;

use kasa_db::Store;

/// Every engine component, wired to one store.
#[derive(Debug, Clone)]
pub struct Engine {
    pub store: Store,
    pub ledger: InventoryLedger,
    pub till: Till,
    pub reconciliation: ReconciliationReporter,
    pub sales: SaleEngine,
    pub catalog: Catalog,
    pub reports: Reports,
    pub auth: Authenticator,
    pub audit: AuditLog,
}

impl Engine {
    pub fn new(store: Store) -> Self {
        let audit = AuditLog::new(store.clone());
        let ledger = InventoryLedger::new(store.clone(), audit.clone());
        let reconciliation = ReconciliationReporter::new(store.clone());
        let till = Till::new(store.clone(), audit.clone(), reconciliation.clone());
        let sales = SaleEngine::new(store.clone(), ledger.clone(), till.clone(), audit.clone());
        let catalog = Catalog::new(store.clone(), ledger.clone(), audit.clone());
        let reports = Reports::new(store.clone());
        let auth = Authenticator::new(store.clone(), audit.clone());

        Engine {
            store,
            ledger,
            till,
            reconciliation,
            sales,
            catalog,
            reports,
            auth,
            audit,
        }
    }
}
