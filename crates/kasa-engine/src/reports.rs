//! Sales and stock reports, and the store health probe.

use chrono::{DateTime, Utc};
use kasa_core::time;
use kasa_core::{Product, Sale, StockMovement};
use kasa_db::{Filter, FilterOp, SortOrder, Store, Table};
use serde::Serialize;
use tracing::warn;
use ts_rs::TS;

use crate::error::EngineResult;

/// Movements included in the stock report.
pub const RECENT_MOVEMENTS: usize = 100;

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct StockReport {
    /// At or below their reorder level, emptiest first.
    pub low_stock: Vec<Product>,
    /// Newest first.
    pub movements: Vec<StockMovement>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct Health {
    pub status: String,
    pub backend: String,
    pub db_reachable: bool,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Reports {
    store: Store,
}

impl Reports {
    pub fn new(store: Store) -> Self {
        Reports { store }
    }

    /// Sales inside `[start, end]`, newest first. Either bound may be open.
    pub async fn sales_report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<Sale>> {
        let mut filter = Filter::all();
        if let Some(start) = start {
            filter = filter.and("sale_date", FilterOp::Gte, time::format_timestamp(&start));
        }
        if let Some(end) = end {
            filter = filter.and("sale_date", FilterOp::Lte, time::format_timestamp(&end));
        }
        let mut sales: Vec<Sale> = self.store.fetch_all(Table::Sales, &filter).await?;
        sales.sort_by(|a, b| b.sale_date.cmp(&a.sale_date));
        Ok(sales)
    }

    pub async fn stock_report(&self) -> EngineResult<StockReport> {
        // the store filters compare a column to a value, not to another column
        let mut low_stock: Vec<Product> = self
            .store
            .fetch_all::<Product>(Table::Products, &Filter::all())
            .await?
            .into_iter()
            .filter(Product::is_low_stock)
            .collect();
        low_stock.sort_by_key(|p| p.quantity);

        let movements = self
            .store
            .fetch(
                Table::StockMovements,
                &Filter::all()
                    .order_by("id", SortOrder::Desc)
                    .limit(RECENT_MOVEMENTS),
            )
            .await?;

        Ok(StockReport { low_stock, movements })
    }

    /// Never fails; an unreachable store is reported in the body.
    pub async fn health(&self) -> Health {
        let db_reachable = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.store.backend(), error = %e, "Health check could not reach the store");
                false
            }
        };
        Health {
            status: if db_reachable { "healthy" } else { "degraded" }.to_string(),
            backend: self.store.backend().to_string(),
            db_reachable,
            timestamp: time::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kasa_core::{MovementType, PaymentMethod};
    use kasa_db::{Fault, FaultKind, MemoryStore, StoreOp};
    use std::sync::Arc;

    async fn sale_at(store: &Store, at: DateTime<Utc>) {
        let sale = Sale {
            id: None,
            request_id: None,
            total_cents: 1000,
            payment_method: PaymentMethod::Card,
            cash_amount_cents: 0,
            card_amount_cents: 1000,
            change_amount_cents: 0,
            user_id: 1,
            sale_date: at,
        };
        store.insert(Table::Sales, &sale).await.unwrap();
    }

    fn product(barcode: &str, quantity: i64, min_stock_level: i64) -> Product {
        Product {
            id: None,
            barcode: barcode.to_string(),
            name: barcode.to_string(),
            price_cents: 100,
            quantity,
            vat_rate_bps: 1800,
            excise_rate_bps: 0,
            min_stock_level,
            created_at: time::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_sales_report_applies_both_bounds() {
        let store = Store::new(Arc::new(MemoryStore::new()));
        let reports = Reports::new(store.clone());
        let now = time::now();
        for days in [0, 2, 4, 6] {
            sale_at(&store, now - Duration::days(days)).await;
        }

        let sales = reports
            .sales_report(Some(now - Duration::days(5)), Some(now - Duration::days(1)))
            .await
            .unwrap();
        let dates: Vec<_> = sales.iter().map(|s| s.sale_date).collect();
        assert_eq!(dates, vec![now - Duration::days(2), now - Duration::days(4)]);

        assert_eq!(reports.sales_report(None, None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_sales_report_pages_past_a_row_cap() {
        let store = Store::new(Arc::new(MemoryStore::new().with_max_rows(2)));
        let reports = Reports::new(store.clone());
        let now = time::now();
        for minutes in 0..5 {
            sale_at(&store, now - Duration::minutes(minutes)).await;
        }

        let sales = reports.sales_report(None, None).await.unwrap();
        assert_eq!(sales.len(), 5);
        assert_eq!(sales[0].sale_date, now);
    }

    #[tokio::test]
    async fn test_stock_report() {
        let store = Store::new(Arc::new(MemoryStore::new()));
        let reports = Reports::new(store.clone());
        for p in [product("a", 3, 5), product("b", 50, 5), product("c", 0, 5), product("d", 5, 5)] {
            store.insert(Table::Products, &p).await.unwrap();
        }
        for i in 0..(RECENT_MOVEMENTS as i64 + 5) {
            let movement = StockMovement {
                id: None,
                request_id: None,
                barcode: "a".to_string(),
                product_name: "a".to_string(),
                movement_type: MovementType::In,
                quantity: i + 1,
                user_id: 1,
                movement_date: time::now(),
            };
            store.insert(Table::StockMovements, &movement).await.unwrap();
        }

        let report = reports.stock_report().await.unwrap();
        let low: Vec<_> = report.low_stock.iter().map(|p| p.barcode.as_str()).collect();
        assert_eq!(low, vec!["c", "a", "d"]);
        assert_eq!(report.movements.len(), RECENT_MOVEMENTS);
        assert_eq!(report.movements[0].quantity, RECENT_MOVEMENTS as i64 + 5);
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_store() {
        let memory = Arc::new(MemoryStore::new());
        let reports = Reports::new(Store::new(memory.clone()));
        assert!(reports.health().await.db_reachable);

        memory
            .inject(Fault::new(Table::CashRegister, StoreOp::Get, FaultKind::Unavailable))
            .await;
        let health = reports.health().await;
        assert!(!health.db_reachable);
        assert_eq!(health.status, "degraded");
        assert_eq!(health.backend, "memory");
    }
}
