//! # Retrying Store
//!
//! Wraps any [`DataStore`] with a per-call timeout and bounded exponential
//! backoff on transient failures.
//!
//! ## Retry Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get / update / delete   retried on Unavailable or Timeout             │
//! │                                                                         │
//! │  insert with request_id  before every retry, look the key up:          │
//! │                            found   → return the stored row (no dup)    │
//! │                            missing → insert again                      │
//! │                          a UNIQUE clash on the key after a retry also  │
//! │                          resolves to the stored row                    │
//! │                                                                         │
//! │  insert without key      never retried (could double-write)            │
//! │                                                                         │
//! │  Rejected / Decode       returned immediately                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Updates are retried as-is. The engine only issues absolute-value updates
//! guarded by the value it read, so replaying one that already landed
//! matches zero rows instead of applying twice. A zero-row answer is
//! therefore ambiguous: callers re-read and compare against what they sent.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::record::Record;
use crate::store::DataStore;
use crate::table::{Table, DEDUP_COLUMN};

/// Timeout and retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Upper bound on a single backend call.
    pub call_timeout: Duration,

    /// Retries after the first attempt. 0 disables retrying.
    pub max_retries: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            call_timeout: Duration::from_secs(5),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// [`DataStore`] decorator applying [`RetryConfig`].
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: DataStore> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        RetryingStore { inner, config }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            // the retry count bounds the loop
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn timed<T, Fut>(&self, call: Fut) -> StoreResult<T>
    where
        Fut: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.config.call_timeout)),
        }
    }

    /// Runs `call` until it succeeds, fails terminally, or retries run out.
    async fn with_retry<T, F, Fut>(&self, table: Table, operation: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut backoff = self.create_backoff();
        let mut retries = 0u32;
        loop {
            match self.timed(call()).await {
                Err(e) if e.is_transient() && retries < self.config.max_retries => {
                    retries += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.config.max_backoff);
                    warn!(
                        table = %table,
                        operation,
                        attempt = retries,
                        ?delay,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn find_by_key(&self, table: Table, key: &str) -> StoreResult<Option<Record>> {
        let filter = Filter::eq(DEDUP_COLUMN, key).limit(1);
        let rows = self.timed(self.inner.get(table, &filter)).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl<S: DataStore> DataStore for RetryingStore<S> {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn get(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        self.with_retry(table, "get", || self.inner.get(table, filter))
            .await
    }

    async fn insert(&self, table: Table, record: &Record) -> StoreResult<Option<Record>> {
        let key = if table.supports_dedup() {
            record.get(DEDUP_COLUMN).and_then(Value::as_str).map(str::to_string)
        } else {
            None
        };
        let key = match key {
            Some(key) => key,
            None => return self.timed(self.inner.insert(table, record)).await,
        };

        let mut backoff = self.create_backoff();
        let mut retries = 0u32;
        loop {
            if retries > 0 {
                match self.find_by_key(table, &key).await {
                    Ok(Some(existing)) => {
                        debug!(table = %table, request_id = %key, "Insert already applied");
                        return Ok(Some(existing));
                    }
                    Ok(None) => {}
                    Err(e) if e.is_transient() && retries < self.config.max_retries => {
                        retries += 1;
                        let delay = backoff.next_backoff().unwrap_or(self.config.max_backoff);
                        warn!(table = %table, request_id = %key, error = %e, "Dedup lookup failed, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            match self.timed(self.inner.insert(table, record)).await {
                Err(e) if e.is_transient() && retries < self.config.max_retries => {
                    retries += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.config.max_backoff);
                    warn!(
                        table = %table,
                        request_id = %key,
                        attempt = retries,
                        ?delay,
                        error = %e,
                        "Transient insert failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if retries > 0 && e.is_unique_violation() => {
                    return match self.find_by_key(table, &key).await? {
                        Some(existing) => Ok(Some(existing)),
                        None => Err(e),
                    };
                }
                other => return other,
            }
        }
    }

    async fn update(&self, table: Table, filter: &Filter, patch: &Record) -> StoreResult<u64> {
        self.with_retry(table, "update", || self.inner.update(table, filter, patch))
            .await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        self.with_retry(table, "delete", || self.inner.delete(table, filter))
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, FaultKind, MemoryStore, StoreOp};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            call_timeout: Duration::from_millis(50),
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    fn movement(request_id: Option<&str>) -> Record {
        Record::new()
            .with("request_id", request_id.map(str::to_string))
            .with("barcode", "001")
            .with("product_name", "Ayran")
            .with("movement_type", "out")
            .with("quantity", 2)
            .with("user_id", 1)
            .with("movement_date", "2026-10-15T09:00:00.000000Z")
    }

    fn retrying(memory: &Arc<MemoryStore>) -> RetryingStore<Arc<MemoryStore>> {
        RetryingStore::new(memory.clone(), fast())
    }

    #[tokio::test]
    async fn test_get_retries_transient_failures() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .inject(Fault::new(Table::Products, StoreOp::Get, FaultKind::Unavailable).times(2))
            .await;

        let rows = retrying(&memory).get(Table::Products, &Filter::all()).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(memory.calls(Table::Products, StoreOp::Get).await, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .inject(Fault::new(Table::Products, StoreOp::Get, FaultKind::Unavailable).always())
            .await;

        let err = retrying(&memory)
            .get(Table::Products, &Filter::all())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(memory.calls(Table::Products, StoreOp::Get).await, 4);
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .inject(Fault::new(Table::Products, StoreOp::Get, FaultKind::Rejected))
            .await;

        let err = retrying(&memory)
            .get(Table::Products, &Filter::all())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert_eq!(memory.calls(Table::Products, StoreOp::Get).await, 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_and_is_retried() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .inject(Fault::new(
                Table::Products,
                StoreOp::Get,
                FaultKind::Hang(Duration::from_millis(500)),
            ))
            .await;

        let rows = retrying(&memory).get(Table::Products, &Filter::all()).await;
        assert!(rows.is_ok());
        assert_eq!(memory.calls(Table::Products, StoreOp::Get).await, 2);
    }

    #[tokio::test]
    async fn test_insert_lost_response_is_not_duplicated() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .inject(
                Fault::new(Table::StockMovements, StoreOp::Insert, FaultKind::Unavailable)
                    .after_write(),
            )
            .await;

        let stored = retrying(&memory)
            .insert(Table::StockMovements, &movement(Some("sale-1:0:out")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored.get_str("request_id"), Some("sale-1:0:out"));
        assert_eq!(memory.count(Table::StockMovements).await, 1);
        assert_eq!(memory.calls(Table::StockMovements, StoreOp::Insert).await, 1);
    }

    #[tokio::test]
    async fn test_insert_failed_before_write_is_retried() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .inject(Fault::new(Table::StockMovements, StoreOp::Insert, FaultKind::Unavailable))
            .await;

        retrying(&memory)
            .insert(Table::StockMovements, &movement(Some("sale-1:0:out")))
            .await
            .unwrap();
        assert_eq!(memory.count(Table::StockMovements).await, 1);
        assert_eq!(memory.calls(Table::StockMovements, StoreOp::Insert).await, 2);
    }

    #[tokio::test]
    async fn test_insert_without_key_is_not_retried() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .inject(Fault::new(Table::StockMovements, StoreOp::Insert, FaultKind::Unavailable))
            .await;

        let err = retrying(&memory)
            .insert(Table::StockMovements, &movement(None))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(memory.count(Table::StockMovements).await, 0);
    }
}
