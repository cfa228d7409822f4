//! # DataStore
//!
//! The four primitive operations every backend implements, and the typed
//! [`Store`] handle the engine uses on top of them.
//!
//! ## Layering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Store Layering                                  │
//! │                                                                         │
//! │  kasa-engine                                                           │
//! │       │  store.fetch::<Product>(Table::Products, &filter)              │
//! │       ▼                                                                 │
//! │  Store (typed handle, Clone)                                           │
//! │       │  Record in / Record out                                        │
//! │       ▼                                                                 │
//! │  RetryingStore<S> ── timeout per call, backoff on transient errors     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐               │
//! │  │ SqliteStore  │   │  RestStore   │   │ MemoryStore  │               │
//! │  │ sqlx pool    │   │ PostgREST    │   │ tests, fault │               │
//! │  └──────────────┘   └──────────────┘   └──────────────┘               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Contract
//! - Each call is atomic on its own. No call spans another.
//! - `update` returns the number of rows it changed, which makes
//!   compare-and-set possible: filter on the value you read, and treat 0 as
//!   "someone else got there first".
//! - `insert` may return `None` when the backend is configured not to echo
//!   the written row. Callers that need the id must look it up again.
//! - `update` and `delete` without conditions are rejected.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::filter::{Filter, FilterOp, SortOrder};
use crate::record::Record;
use crate::table::Table;

/// Rows requested per page by [`Store::fetch_all`].
pub const PAGE_SIZE: usize = 500;

/// Storage backend.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    /// Rows matching `filter`, ordered and limited as it says.
    async fn get(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>>;

    /// Inserts one row. Returns the stored row when the backend echoes it.
    async fn insert(&self, table: Table, record: &Record) -> StoreResult<Option<Record>>;

    /// Sets `patch` columns on every matching row. Returns rows changed.
    async fn update(&self, table: Table, filter: &Filter, patch: &Record) -> StoreResult<u64>;

    /// Deletes every matching row. Returns rows deleted.
    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64>;
}

#[async_trait]
impl<T: DataStore + ?Sized> DataStore for Arc<T> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    async fn get(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        (**self).get(table, filter).await
    }

    async fn insert(&self, table: Table, record: &Record) -> StoreResult<Option<Record>> {
        (**self).insert(table, record).await
    }

    async fn update(&self, table: Table, filter: &Filter, patch: &Record) -> StoreResult<u64> {
        (**self).update(table, filter, patch).await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        (**self).delete(table, filter).await
    }
}

// =============================================================================
// Typed Handle
// =============================================================================

/// Cheap-to-clone handle over any backend, with typed helpers.
///
/// ## Example
/// ```rust,ignore
/// let store = Store::new(MemoryStore::new());
/// let product: Option<Product> = store
///     .fetch_one(Table::Products, &Filter::eq("barcode", "8690504"))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn DataStore>,
}

impl Store {
    pub fn new(backend: impl DataStore + 'static) -> Self {
        Store {
            inner: Arc::new(backend),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    pub fn raw(&self) -> &dyn DataStore {
        self.inner.as_ref()
    }

    /// All rows matching `filter`, decoded.
    pub async fn fetch<T: DeserializeOwned>(&self, table: Table, filter: &Filter) -> StoreResult<Vec<T>> {
        self.inner
            .get(table, filter)
            .await?
            .into_iter()
            .map(Record::into_decoded)
            .collect()
    }

    /// All rows matching `filter`, read in pages of [`PAGE_SIZE`] by
    /// ascending `id`. Any ordering on `filter` is replaced.
    ///
    /// PostgREST caps each response at its `max-rows` setting and returns
    /// the truncated page as a success, so an unbounded `fetch` can come
    /// back short. Paging stops at the first empty page.
    pub async fn fetch_all<T: DeserializeOwned>(&self, table: Table, filter: &Filter) -> StoreResult<Vec<T>> {
        let mut rows = Vec::new();
        let mut after: Option<i64> = None;
        loop {
            let mut page = filter.clone();
            if let Some(id) = after {
                page = page.and("id", FilterOp::Gt, id);
            }
            let page = page.order_by("id", SortOrder::Asc).limit(PAGE_SIZE);

            let records = self.inner.get(table, &page).await?;
            let last_id = match records.last() {
                Some(last) => last
                    .get_i64("id")
                    .ok_or_else(|| StoreError::Decode(format!("{} row without an id", table)))?,
                None => break,
            };
            if after.map_or(false, |previous| last_id <= previous) {
                return Err(StoreError::Decode(format!("{} page did not advance past id {}", table, last_id)));
            }
            after = Some(last_id);

            for record in records {
                rows.push(record.into_decoded()?);
            }
        }
        Ok(rows)
    }

    /// First row matching `filter`, decoded.
    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        table: Table,
        filter: &Filter,
    ) -> StoreResult<Option<T>> {
        let filter = filter.clone().limit(1);
        match self.inner.get(table, &filter).await?.into_iter().next() {
            Some(record) => Ok(Some(record.into_decoded()?)),
            None => Ok(None),
        }
    }

    /// Inserts a typed record, returning the stored version (with its id)
    /// when the backend echoes it.
    pub async fn insert<T>(&self, table: Table, value: &T) -> StoreResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let record = Record::encode(value)?;
        match self.inner.insert(table, &record).await? {
            Some(stored) => Ok(Some(stored.into_decoded()?)),
            None => Ok(None),
        }
    }

    pub async fn update(&self, table: Table, filter: &Filter, patch: Record) -> StoreResult<u64> {
        self.inner.update(table, filter, &patch).await
    }

    pub async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        self.inner.delete(table, filter).await
    }

    /// Cheapest possible read, used by the health endpoint.
    pub async fn ping(&self) -> StoreResult<()> {
        self.inner
            .get(Table::CashRegister, &Filter::all().limit(1))
            .await
            .map(|_| ())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("backend", &self.backend()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn movement(quantity: i64) -> Record {
        Record::new()
            .with("barcode", "001")
            .with("product_name", "Ayran")
            .with("movement_type", "in")
            .with("quantity", quantity)
            .with("user_id", 1)
            .with("movement_date", "2026-10-15T09:00:00.000000Z")
    }

    #[tokio::test]
    async fn test_fetch_all_pages_past_a_row_cap() {
        let store = Store::new(MemoryStore::new().with_max_rows(3));
        for quantity in 1..=8 {
            store.raw().insert(Table::StockMovements, &movement(quantity)).await.unwrap();
        }

        let capped = store.raw().get(Table::StockMovements, &Filter::all()).await.unwrap();
        assert_eq!(capped.len(), 3);

        let rows: Vec<Record> = store
            .fetch_all(Table::StockMovements, &Filter::eq("barcode", "001"))
            .await
            .unwrap();
        let quantities: Vec<i64> = rows.iter().filter_map(|r| r.get_i64("quantity")).collect();
        assert_eq!(quantities, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_fetch_all_empty() {
        let store = Store::new(MemoryStore::new());
        let rows: Vec<Record> = store.fetch_all(Table::Sales, &Filter::all()).await.unwrap();
        assert!(rows.is_empty());
    }
}
