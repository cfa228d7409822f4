//! # In-Memory Store
//!
//! A [`DataStore`] held in process memory. Used by tests and by
//! `store.backend = "memory"` for demos. It mirrors the SQLite schema's
//! constraints that the engine relies on: unique columns, the
//! non-negative `products.quantity` check, and store-assigned ids.
//!
//! ## Fault Injection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  store.inject(Fault::new(Table::SaleItems, StoreOp::Insert,            │
//! │                          FaultKind::Unavailable).skip(1))              │
//! │                                                                         │
//! │  call #1 on (sale_items, insert) ──► runs normally                     │
//! │  call #2                         ──► Err(Unavailable)                  │
//! │  call #3 ...                     ──► runs normally (times = 1)         │
//! │                                                                         │
//! │  .after_write()  the write is applied, then the error is returned      │
//! │                  (simulates a response lost after commit)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::record::Record;
use crate::store::DataStore;
use crate::table::Table;

/// One of the four store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Insert,
    Update,
    Delete,
}

/// What an injected fault does.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultKind {
    /// Fail with [`StoreError::Unavailable`].
    Unavailable,
    /// Fail with [`StoreError::Rejected`].
    Rejected,
    /// Sleep before running the call, to trip a caller's timeout.
    Hang(Duration),
    /// `update`/`delete` report zero rows without touching anything.
    ZeroRows,
    /// Apply this patch to the rows matching the call's filter, then run the
    /// call normally. Simulates another writer getting there first.
    Interfere(Record),
}

/// A scheduled fault on one `(table, operation)` pair.
#[derive(Debug, Clone)]
pub struct Fault {
    table: Table,
    op: StoreOp,
    kind: FaultKind,
    skip: usize,
    times: Option<usize>,
    after_write: bool,
}

impl Fault {
    /// Fires once, on the next matching call.
    pub fn new(table: Table, op: StoreOp, kind: FaultKind) -> Self {
        Fault {
            table,
            op,
            kind,
            skip: 0,
            times: Some(1),
            after_write: false,
        }
    }

    /// Let `calls` matching calls through first.
    pub fn skip(mut self, calls: usize) -> Self {
        self.skip = calls;
        self
    }

    pub fn times(mut self, times: usize) -> Self {
        self.times = Some(times);
        self
    }

    pub fn always(mut self) -> Self {
        self.times = None;
        self
    }

    /// Apply the write before reporting an `Unavailable`/`Rejected` error.
    pub fn after_write(mut self) -> Self {
        self.after_write = true;
        self
    }

    /// Consumes one firing if this fault applies to the call.
    fn fire(&mut self, table: Table, op: StoreOp) -> Option<(FaultKind, bool)> {
        if self.table != table || self.op != op || self.times == Some(0) {
            return None;
        }
        if self.skip > 0 {
            self.skip -= 1;
            return None;
        }
        if let Some(times) = self.times.as_mut() {
            *times -= 1;
        }
        Some((self.kind.clone(), self.after_write))
    }
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Table, Vec<Record>>,
    next_id: HashMap<Table, i64>,
}

#[derive(Debug, Default)]
struct Faults {
    scheduled: Vec<Fault>,
    calls: HashMap<(Table, StoreOp), usize>,
}

/// In-process [`DataStore`].
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    faults: Mutex<Faults>,
    returning: bool,
    max_rows: Option<usize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            tables: RwLock::new(Tables::default()),
            faults: Mutex::new(Faults::default()),
            returning: true,
            max_rows: None,
        }
    }

    /// `insert` returns `None`, like a REST backend without
    /// `return=representation`.
    pub fn without_returning(mut self) -> Self {
        self.returning = false;
        self
    }

    /// `get` returns at most `rows` rows whatever the filter asks for, like
    /// PostgREST's `max-rows` setting.
    pub fn with_max_rows(mut self, rows: usize) -> Self {
        self.max_rows = Some(rows);
        self
    }

    pub async fn inject(&self, fault: Fault) {
        self.faults.lock().await.scheduled.push(fault);
    }

    /// How many times `(table, op)` has been called, faulted or not.
    pub async fn calls(&self, table: Table, op: StoreOp) -> usize {
        self.faults
            .lock()
            .await
            .calls
            .get(&(table, op))
            .copied()
            .unwrap_or(0)
    }

    /// Every row of `table`, in insertion order.
    pub async fn dump(&self, table: Table) -> Vec<Record> {
        self.tables
            .read()
            .await
            .rows
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count(&self, table: Table) -> usize {
        self.tables
            .read()
            .await
            .rows
            .get(&table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn next_fault(&self, table: Table, op: StoreOp) -> Option<(FaultKind, bool)> {
        let mut faults = self.faults.lock().await;
        *faults.calls.entry((table, op)).or_insert(0) += 1;
        faults
            .scheduled
            .iter_mut()
            .find_map(|fault| fault.fire(table, op))
    }

    async fn interfere(&self, table: Table, filter: &Filter, patch: &Record) {
        let mut tables = self.tables.write().await;
        if let Some(rows) = tables.rows.get_mut(&table) {
            for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                row.merge(patch);
            }
        }
    }

    /// Runs the pre-call part of any fault scheduled for this call.
    async fn before_call(&self, table: Table, op: StoreOp, filter: Option<&Filter>) -> Injected {
        let (kind, after_write) = match self.next_fault(table, op).await {
            Some(fault) => fault,
            None => return Injected::Nothing,
        };
        debug!(table = %table, ?op, ?kind, "injected fault");

        match kind {
            FaultKind::Unavailable => Injected::Fail {
                error: StoreError::Unavailable(format!("injected fault on {} {:?}", table, op)),
                after_write,
            },
            FaultKind::Rejected => Injected::Fail {
                error: StoreError::Rejected(format!("injected rejection on {} {:?}", table, op)),
                after_write,
            },
            FaultKind::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Injected::Nothing
            }
            FaultKind::ZeroRows => Injected::ZeroRows,
            FaultKind::Interfere(patch) => {
                if let Some(filter) = filter {
                    self.interfere(table, filter, &patch).await;
                }
                Injected::Nothing
            }
        }
    }
}

/// Outcome of the fault check for one call.
enum Injected {
    Nothing,
    Fail { error: StoreError, after_write: bool },
    ZeroRows,
}

impl Injected {
    /// Splits into an error to return now and an error to return after the
    /// write.
    fn split(self) -> (Option<StoreError>, Option<StoreError>) {
        match self {
            Injected::Fail { error, after_write: false } => (Some(error), None),
            Injected::Fail { error, after_write: true } => (None, Some(error)),
            Injected::Nothing | Injected::ZeroRows => (None, None),
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        filter.validate_for(table)?;
        if let (Some(error), _) = self.before_call(table, StoreOp::Get, Some(filter)).await.split() {
            return Err(error);
        }

        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .rows
            .get(&table)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default();
        filter.apply_order_and_limit(&mut rows);
        if let Some(cap) = self.max_rows {
            rows.truncate(cap);
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, record: &Record) -> StoreResult<Option<Record>> {
        table.check_record(record)?;
        let (now, later) = self.before_call(table, StoreOp::Insert, None).await.split();
        if let Some(error) = now {
            return Err(error);
        }

        let stored = {
            let mut tables = self.tables.write().await;

            let mut row = Record::new();
            for column in table.columns() {
                row.set(column, record.get(column).cloned().unwrap_or(Value::Null));
            }
            check_constraints(table, &row)?;
            {
                let rows = tables.rows.entry(table).or_default();
                for column in table.unique_columns().iter().chain(std::iter::once(&"id")) {
                    check_unique(table, rows, column, &row, None)?;
                }
            }

            let last_id = tables.next_id.get(&table).copied().unwrap_or(0);
            let id = row.get_i64("id").unwrap_or(last_id + 1);
            tables.next_id.insert(table, last_id.max(id));
            row.set("id", id);

            tables.rows.entry(table).or_default().push(row.clone());
            row
        };

        if let Some(error) = later {
            return Err(error);
        }
        Ok(if self.returning { Some(stored) } else { None })
    }

    async fn update(&self, table: Table, filter: &Filter, patch: &Record) -> StoreResult<u64> {
        filter.require_conditions(table, "update")?;
        filter.validate_for(table)?;
        table.check_record(patch)?;
        let injected = self.before_call(table, StoreOp::Update, Some(filter)).await;
        if matches!(injected, Injected::ZeroRows) {
            return Ok(0);
        }
        let (now, later) = injected.split();
        if let Some(error) = now {
            return Err(error);
        }

        let changed = {
            let mut tables = self.tables.write().await;
            let rows = tables.rows.entry(table).or_default();

            let mut next = rows.clone();
            let mut changed = 0u64;
            for row in next.iter_mut().filter(|row| filter.matches(row)) {
                row.merge(patch);
                check_constraints(table, row)?;
                changed += 1;
            }
            for (index, row) in next.iter().enumerate() {
                for column in table.unique_columns() {
                    if patch.get(column).is_some() {
                        check_unique(table, &next, column, row, Some(index))?;
                    }
                }
            }
            *rows = next;
            changed
        };

        if let Some(error) = later {
            return Err(error);
        }
        Ok(changed)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        filter.require_conditions(table, "delete")?;
        filter.validate_for(table)?;
        let injected = self.before_call(table, StoreOp::Delete, Some(filter)).await;
        if matches!(injected, Injected::ZeroRows) {
            return Ok(0);
        }
        let (now, later) = injected.split();
        if let Some(error) = now {
            return Err(error);
        }

        let deleted = {
            let mut tables = self.tables.write().await;
            let rows = tables.rows.entry(table).or_default();
            let before = rows.len();
            rows.retain(|row| !filter.matches(row));
            (before - rows.len()) as u64
        };

        if let Some(error) = later {
            return Err(error);
        }
        Ok(deleted)
    }
}

fn check_constraints(table: Table, row: &Record) -> StoreResult<()> {
    if table == Table::Products {
        if let Some(quantity) = row.get_i64("quantity") {
            if quantity < 0 {
                return Err(StoreError::Rejected(
                    "CHECK constraint failed: quantity >= 0".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn check_unique(
    table: Table,
    rows: &[Record],
    column: &str,
    row: &Record,
    own_index: Option<usize>,
) -> StoreResult<()> {
    let value = match row.get(column) {
        Some(value) if !value.is_null() => value,
        _ => return Ok(()),
    };
    let clash = rows
        .iter()
        .enumerate()
        .any(|(index, other)| Some(index) != own_index && other.get(column) == Some(value));
    if clash {
        return Err(StoreError::Rejected(format!(
            "UNIQUE constraint failed: {}.{}",
            table, column
        )));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(request_id: Option<&str>) -> Record {
        Record::new()
            .with("request_id", request_id.map(str::to_string))
            .with("barcode", "001")
            .with("product_name", "Ayran")
            .with("movement_type", "out")
            .with("quantity", 1)
            .with("user_id", 1)
            .with("movement_date", "2026-10-15T09:00:00.000000Z")
    }

    fn product(barcode: &str, quantity: i64) -> Record {
        Record::new()
            .with("barcode", barcode)
            .with("name", "Ayran")
            .with("quantity", quantity)
    }

    #[tokio::test]
    async fn test_ids_are_assigned_in_order() {
        let store = MemoryStore::new();
        let a = store.insert(Table::Products, &product("001", 1)).await.unwrap().unwrap();
        let b = store.insert(Table::Products, &product("002", 1)).await.unwrap().unwrap();
        assert_eq!(a.get_i64("id"), Some(1));
        assert_eq!(b.get_i64("id"), Some(2));
    }

    #[tokio::test]
    async fn test_unique_columns_enforced_but_nulls_never_clash() {
        let store = MemoryStore::new();
        store.insert(Table::StockMovements, &movement(Some("r1"))).await.unwrap();
        let err = store
            .insert(Table::StockMovements, &movement(Some("r1")))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        store.insert(Table::StockMovements, &movement(None)).await.unwrap();
        store.insert(Table::StockMovements, &movement(None)).await.unwrap();
        assert_eq!(store.count(Table::StockMovements).await, 3);
    }

    #[tokio::test]
    async fn test_negative_quantity_rejected() {
        let store = MemoryStore::new();
        store.insert(Table::Products, &product("001", 2)).await.unwrap();
        let err = store
            .update(
                Table::Products,
                &Filter::eq("barcode", "001"),
                &Record::new().with("quantity", -1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        let rows = store.dump(Table::Products).await;
        assert_eq!(rows[0].get_i64("quantity"), Some(2));
    }

    #[tokio::test]
    async fn test_fault_skips_then_fires_once() {
        let store = MemoryStore::new();
        store
            .inject(Fault::new(Table::Products, StoreOp::Insert, FaultKind::Unavailable).skip(1))
            .await;

        assert!(store.insert(Table::Products, &product("001", 1)).await.is_ok());
        let err = store.insert(Table::Products, &product("002", 1)).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.insert(Table::Products, &product("002", 1)).await.is_ok());
        assert_eq!(store.calls(Table::Products, StoreOp::Insert).await, 3);
    }

    #[tokio::test]
    async fn test_after_write_fault_persists_row() {
        let store = MemoryStore::new();
        store
            .inject(
                Fault::new(Table::StockMovements, StoreOp::Insert, FaultKind::Unavailable)
                    .after_write(),
            )
            .await;

        assert!(store
            .insert(Table::StockMovements, &movement(Some("r1")))
            .await
            .is_err());
        assert_eq!(store.count(Table::StockMovements).await, 1);
    }

    #[tokio::test]
    async fn test_interfere_changes_rows_before_call() {
        let store = MemoryStore::new();
        store.insert(Table::Products, &product("001", 10)).await.unwrap();
        store
            .inject(Fault::new(
                Table::Products,
                StoreOp::Update,
                FaultKind::Interfere(Record::new().with("quantity", 4)),
            ))
            .await;

        let cas = Filter::eq("barcode", "001").and_eq("quantity", 10);
        let changed = store
            .update(Table::Products, &cas, &Record::new().with("quantity", 7))
            .await
            .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(store.dump(Table::Products).await[0].get_i64("quantity"), Some(4));
    }

    #[tokio::test]
    async fn test_zero_rows_fault() {
        let store = MemoryStore::new();
        store.insert(Table::Products, &product("001", 10)).await.unwrap();
        store
            .inject(Fault::new(Table::Products, StoreOp::Update, FaultKind::ZeroRows).always())
            .await;
        for _ in 0..3 {
            let changed = store
                .update(
                    Table::Products,
                    &Filter::eq("barcode", "001"),
                    &Record::new().with("quantity", 1),
                )
                .await
                .unwrap();
            assert_eq!(changed, 0);
        }
    }

    #[tokio::test]
    async fn test_without_returning() {
        let store = MemoryStore::new().without_returning();
        let echoed = store.insert(Table::Products, &product("001", 1)).await.unwrap();
        assert!(echoed.is_none());
        assert_eq!(store.count(Table::Products).await, 1);
    }
}
