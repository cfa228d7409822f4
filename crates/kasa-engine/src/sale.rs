//! # Sale Engine
//!
//! Turns a sale request into a sale header, its lines, stock decrements and
//! a cash booking, without a transaction to hold them together.
//!
//! ## Execution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  execute(request, actor)                                                │
//! │                                                                         │
//! │  1. validate            ─┐                                              │
//! │  2. stock preflight      ├── failures here write nothing                │
//! │                         ─┘                                              │
//! │  ─────────────── tokio::spawn (caller may disconnect) ─────────────────  │
//! │  3. sale header          request_id = <uuid>                            │
//! │  4. per line:  sale_items row        request_id = <uuid>:<i>            │
//! │                ledger.apply_delta    request_id = <uuid>:<i>:out        │
//! │  5. cash booking         request_id = <uuid>:cash   (cash sales only)   │
//! │  6. audit "sale"                                                        │
//! │                                                                         │
//! │  Failure in 3-5 ──► PartialSaleFailure { sale_id, committed_lines,      │
//! │                                          failed_step, cause }           │
//! │                     + audit "sale_partial_failure". No rollback.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The request ids are dedup keys: a retried insert whose first attempt
//! landed returns the landed row instead of writing a second one.
//!
//! Preflight and decrement are separate reads and writes. A concurrent sale
//! can drain a product between them; the decrement then clamps to zero and
//! the receipt carries a [`StockWarning`].

use kasa_core::time;
use kasa_core::{
    AuditAction, Availability, CoreError, MovementType, Sale, SaleLine, SaleRequest, ValidatedSale,
};
use kasa_db::{Filter, SortOrder, Store, Table};
use serde::Serialize;
use tracing::{error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::audit::{Actor, AuditLog};
use crate::error::{CommittedLine, EngineError, EngineResult, PartialSale, SaleStep};
use crate::ledger::{InventoryLedger, StockDelta};
use crate::till::Till;

/// A line whose decrement found less stock than it took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct StockWarning {
    pub barcode: String,
    pub shortfall: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Committed,
}

/// Result of a committed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct SaleReceipt {
    pub sale_id: i64,
    pub status: SaleStatus,
    /// Whether the till balance moved. `false` for card sales and for cash
    /// sales rung up on a closed till.
    pub cash_booked: bool,
    pub stock_warnings: Vec<StockWarning>,
}

#[derive(Debug, Clone)]
pub struct SaleEngine {
    store: Store,
    ledger: InventoryLedger,
    till: Till,
    audit: AuditLog,
}

impl SaleEngine {
    pub fn new(store: Store, ledger: InventoryLedger, till: Till, audit: AuditLog) -> Self {
        SaleEngine {
            store,
            ledger,
            till,
            audit,
        }
    }

    /// Validates, preflights and commits a sale.
    ///
    /// The commit runs in its own task; dropping the returned future after
    /// preflight does not stop it.
    pub async fn execute(&self, request: SaleRequest, actor: Actor) -> EngineResult<SaleReceipt> {
        let sale = request.validate()?;
        self.preflight(&sale).await?;

        let engine = self.clone();
        let request_id = Uuid::new_v4().to_string();
        tokio::spawn(async move { engine.commit(sale, actor, request_id).await })
            .await
            .map_err(|e| EngineError::Internal(format!("sale task failed: {}", e)))?
    }

    /// Checks every barcode against stock, summing repeated barcodes.
    async fn preflight(&self, sale: &ValidatedSale) -> EngineResult<()> {
        for (barcode, quantity) in sale.quantities_by_barcode() {
            match self.ledger.check_availability(&barcode, quantity).await? {
                Availability::Available => {}
                Availability::NotFound => return Err(EngineError::ProductNotFound(barcode)),
                Availability::Insufficient { have, want } => {
                    return Err(CoreError::InsufficientStock {
                        barcode,
                        available: have,
                        requested: want,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    async fn commit(&self, sale: ValidatedSale, actor: Actor, request_id: String) -> EngineResult<SaleReceipt> {
        let mut progress = Progress::default();

        let header = Sale {
            id: None,
            request_id: Some(request_id.clone()),
            total_cents: sale.total.cents(),
            payment_method: sale.payment_method,
            cash_amount_cents: sale.cash_amount.cents(),
            card_amount_cents: sale.card_amount.cents(),
            change_amount_cents: sale.change_amount.cents(),
            user_id: actor.user_id,
            sale_date: time::now(),
        };
        let sale_id = match self.insert_header(&header, &request_id).await {
            Ok(id) => id,
            Err(e) => return Err(self.abort(progress, SaleStep::Header, e, &actor).await),
        };
        progress.sale_id = Some(sale_id);

        let mut stock_warnings = Vec::new();
        for (index, line) in sale.lines.iter().enumerate() {
            let row = SaleLine {
                id: None,
                request_id: Some(format!("{}:{}", request_id, index)),
                sale_id,
                barcode: line.barcode.clone(),
                product_name: line.name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
            };
            if let Err(e) = self.store.insert(Table::SaleItems, &row).await {
                return Err(self.abort(progress, SaleStep::Line(index), e.into(), &actor).await);
            }

            let delta = StockDelta::new(line.barcode.as_str(), -line.quantity, MovementType::Out)
                .with_request_id(format!("{}:{}:out", request_id, index));
            match self.ledger.apply_delta(delta, &actor).await {
                Ok(outcome) if outcome.stock_went_negative() => stock_warnings.push(StockWarning {
                    barcode: line.barcode.clone(),
                    shortfall: outcome.shortfall,
                }),
                Ok(_) => {}
                Err(e) => return Err(self.abort(progress, SaleStep::Stock(index), e, &actor).await),
            }
            progress.committed_lines.push(CommittedLine {
                index,
                barcode: line.barcode.clone(),
                quantity: line.quantity,
            });
        }

        let mut cash_booked = false;
        if sale.books_cash() {
            match self
                .till
                .apply_cash_effect(sale.total, sale_id, &actor, Some(format!("{}:cash", request_id)))
                .await
            {
                Ok(booked) => cash_booked = booked,
                Err(e) => return Err(self.abort(progress, SaleStep::CashBooking, e, &actor).await),
            }
        }

        self.audit
            .record(
                &actor,
                AuditAction::Sale,
                format!(
                    "Sale #{}: {} line(s), total {} ({})",
                    sale_id,
                    sale.lines.len(),
                    sale.total,
                    sale.payment_method
                ),
            )
            .await;

        info!(
            sale_id,
            actor = actor.user_id,
            total = %sale.total,
            payment_method = %sale.payment_method,
            lines = sale.lines.len(),
            "Sale committed"
        );
        Ok(SaleReceipt {
            sale_id,
            status: SaleStatus::Committed,
            cash_booked,
            stock_warnings,
        })
    }

    /// Inserts the header and works out its id.
    ///
    /// Prefers the returned row, then a lookup by request id. The actor's
    /// latest sale is a last resort for backends that store neither.
    async fn insert_header(&self, header: &Sale, request_id: &str) -> EngineResult<i64> {
        if let Some(id) = self.store.insert(Table::Sales, header).await?.and_then(|s| s.id) {
            return Ok(id);
        }

        let by_key: Option<Sale> = self
            .store
            .fetch_one(Table::Sales, &Filter::eq("request_id", request_id))
            .await?;
        if let Some(id) = by_key.and_then(|s| s.id) {
            return Ok(id);
        }

        let latest: Option<Sale> = self
            .store
            .fetch_one(
                Table::Sales,
                &Filter::eq("user_id", header.user_id).order_by("id", SortOrder::Desc),
            )
            .await?;
        match latest.and_then(|s| s.id) {
            Some(id) => {
                warn!(sale_id = id, actor = header.user_id, "Sale id taken from the actor's latest sale");
                Ok(id)
            }
            None => Err(EngineError::Internal("sale id could not be recovered".to_string())),
        }
    }

    /// Records a stopped sale and builds the error for the caller.
    async fn abort(&self, progress: Progress, step: SaleStep, cause: EngineError, actor: &Actor) -> EngineError {
        let partial = PartialSale {
            sale_id: progress.sale_id,
            committed_lines: progress.committed_lines,
            failed_step: step,
            cause: cause.to_string(),
        };
        error!(
            sale_id = ?partial.sale_id,
            actor = actor.user_id,
            step = %step,
            committed = partial.committed_lines.len(),
            cause = %partial.cause,
            "Sale stopped part-way"
        );
        self.audit
            .record(actor, AuditAction::SalePartialFailure, partial.to_string())
            .await;
        EngineError::PartialSaleFailure(Box::new(partial))
    }
}

#[derive(Debug, Default)]
struct Progress {
    sale_id: Option<i64>,
    committed_lines: Vec<CommittedLine>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::ReconciliationReporter;
    use kasa_core::{Money, Product, SaleLineRequest, StockMovement};
    use kasa_db::{Fault, FaultKind, MemoryStore, Record, StoreOp};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        memory: Arc<MemoryStore>,
        engine: SaleEngine,
        ledger: InventoryLedger,
        till: Till,
    }

    fn fixture(memory: MemoryStore) -> Fixture {
        let memory = Arc::new(memory);
        let store = Store::new(memory.clone());
        let audit = AuditLog::new(store.clone());
        let ledger = InventoryLedger::new(store.clone(), audit.clone());
        let till = Till::new(store.clone(), audit.clone(), ReconciliationReporter::new(store.clone()));
        let engine = SaleEngine::new(store, ledger.clone(), till.clone(), audit);
        Fixture {
            memory,
            engine,
            ledger,
            till,
        }
    }

    async fn stock(f: &Fixture, barcode: &str, quantity: i64) {
        let product = Product {
            id: None,
            barcode: barcode.to_string(),
            name: format!("Ürün {}", barcode),
            price_cents: 500,
            quantity,
            vat_rate_bps: 1800,
            excise_rate_bps: 0,
            min_stock_level: 5,
            created_at: time::now(),
            updated_at: None,
        };
        f.ledger.register_product(product, &Actor::new(1)).await.unwrap();
    }

    fn line(barcode: &str, quantity: i64) -> SaleLineRequest {
        SaleLineRequest {
            barcode: barcode.to_string(),
            name: format!("Ürün {}", barcode),
            quantity,
            unit_price: Money::from_cents(500),
        }
    }

    fn cash_sale(lines: Vec<SaleLineRequest>) -> SaleRequest {
        let total: Money = lines.iter().map(|l| l.unit_price * l.quantity).sum();
        SaleRequest {
            lines,
            total,
            payment_method: "cash".to_string(),
            cash_amount: total,
            card_amount: Money::zero(),
            change_amount: Money::zero(),
        }
    }

    async fn quantity(f: &Fixture, barcode: &str) -> i64 {
        f.ledger.find(barcode).await.unwrap().unwrap().quantity
    }

    async fn out_movements(f: &Fixture) -> Vec<StockMovement> {
        f.memory
            .dump(Table::StockMovements)
            .await
            .iter()
            .map(|r| r.decode::<StockMovement>().unwrap())
            .filter(|m| m.movement_type == MovementType::Out)
            .collect()
    }

    async fn audit_actions(f: &Fixture) -> Vec<String> {
        f.memory
            .dump(Table::AuditLogs)
            .await
            .iter()
            .filter_map(|r| r.get_str("action").map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_cash_sale_commits() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 10).await;
        f.till.open(Money::zero(), &Actor::new(1)).await.unwrap();

        let receipt = f
            .engine
            .execute(cash_sale(vec![line("001", 3)]), Actor::new(2))
            .await
            .unwrap();

        assert_eq!(receipt.status, SaleStatus::Committed);
        assert!(receipt.cash_booked);
        assert!(receipt.stock_warnings.is_empty());
        assert_eq!(quantity(&f, "001").await, 7);

        let outs = out_movements(&f).await;
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].quantity, 3);
        assert_eq!(outs[0].user_id, 2);

        assert_eq!(f.till.state().await.unwrap().current_amount_cents, 1500);
        assert_eq!(audit_actions(&f).await, vec!["cash_open", "sale"]);

        let lines = f.memory.dump(Table::SaleItems).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].get_i64("sale_id"), Some(receipt.sale_id));
    }

    #[tokio::test]
    async fn test_insufficient_stock_writes_nothing() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 2).await;

        let err = f
            .engine
            .execute(cash_sale(vec![line("001", 3)]), Actor::new(1))
            .await
            .unwrap_err();

        match err {
            EngineError::Core(CoreError::InsufficientStock {
                barcode,
                available,
                requested,
            }) => {
                assert_eq!(barcode, "001");
                assert_eq!(available, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(out_movements(&f).await.is_empty());
        assert_eq!(f.memory.count(Table::Sales).await, 0);
        assert_eq!(quantity(&f, "001").await, 2);
    }

    #[tokio::test]
    async fn test_one_bad_line_blocks_the_whole_sale() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 10).await;
        stock(&f, "002", 1).await;

        let err = f
            .engine
            .execute(cash_sale(vec![line("001", 1), line("002", 2)]), Actor::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InsufficientStock { .. })));
        assert_eq!(quantity(&f, "001").await, 10);
        assert_eq!(f.memory.count(Table::SaleItems).await, 0);
    }

    #[tokio::test]
    async fn test_repeated_barcode_is_checked_as_a_sum() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 4).await;

        let err = f
            .engine
            .execute(cash_sale(vec![line("001", 3), line("001", 2)]), Actor::new(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock { available: 4, requested: 5, .. })
        ));
        assert_eq!(f.memory.count(Table::Sales).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_barcode() {
        let f = fixture(MemoryStore::new());
        let err = f
            .engine
            .execute(cash_sale(vec![line("404", 1)]), Actor::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ProductNotFound(b) if b == "404"));
        assert_eq!(f.memory.count(Table::Sales).await, 0);
    }

    #[tokio::test]
    async fn test_validation_lists_every_problem() {
        let f = fixture(MemoryStore::new());
        let request = SaleRequest {
            lines: vec![],
            total: Money::zero(),
            payment_method: "cheque".to_string(),
            cash_amount: Money::zero(),
            card_amount: Money::zero(),
            change_amount: Money::zero(),
        };

        match f.engine.execute(request, Actor::new(1)).await.unwrap_err() {
            EngineError::Core(CoreError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_card_sale_leaves_till_alone() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 10).await;
        f.till.open(Money::from_cents(10000), &Actor::new(1)).await.unwrap();

        let mut request = cash_sale(vec![line("001", 2)]);
        request.payment_method = "card".to_string();
        request.card_amount = request.cash_amount;
        request.cash_amount = Money::zero();

        let receipt = f.engine.execute(request, Actor::new(1)).await.unwrap();
        assert!(!receipt.cash_booked);
        assert_eq!(f.till.state().await.unwrap().current_amount_cents, 10000);
        assert_eq!(f.memory.count(Table::CashTransactions).await, 1);
    }

    #[tokio::test]
    async fn test_cash_sale_on_closed_till_is_recorded_only() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 10).await;

        let receipt = f
            .engine
            .execute(cash_sale(vec![line("001", 1)]), Actor::new(1))
            .await
            .unwrap();
        assert!(!receipt.cash_booked);
        assert_eq!(f.memory.count(Table::CashTransactions).await, 1);
    }

    #[tokio::test]
    async fn test_stock_conservation() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 20).await;

        for qty in [3, 5, 2] {
            f.engine
                .execute(cash_sale(vec![line("001", qty)]), Actor::new(1))
                .await
                .unwrap();
        }
        assert_eq!(quantity(&f, "001").await, 10);
        let sold: i64 = out_movements(&f).await.iter().map(|m| m.quantity).sum();
        assert_eq!(sold, 10);
    }

    #[tokio::test]
    async fn test_line_failure_is_partial() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 10).await;
        stock(&f, "002", 10).await;
        f.memory
            .inject(Fault::new(Table::SaleItems, StoreOp::Insert, FaultKind::Rejected).skip(1))
            .await;

        let err = f
            .engine
            .execute(cash_sale(vec![line("001", 1), line("002", 4)]), Actor::new(1))
            .await
            .unwrap_err();

        let partial = match err {
            EngineError::PartialSaleFailure(partial) => partial,
            other => panic!("unexpected error: {other:?}"),
        };
        assert!(partial.sale_id.is_some());
        assert_eq!(partial.failed_step, SaleStep::Line(1));
        assert_eq!(partial.committed_lines.len(), 1);
        assert_eq!(partial.committed_lines[0].barcode, "001");

        // nothing is rolled back
        assert_eq!(quantity(&f, "001").await, 9);
        assert_eq!(quantity(&f, "002").await, 10);
        assert_eq!(f.memory.count(Table::Sales).await, 1);
        assert_eq!(audit_actions(&f).await, vec!["sale_partial_failure"]);
    }

    #[tokio::test]
    async fn test_header_failure_has_no_sale_id() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 10).await;
        f.memory
            .inject(Fault::new(Table::Sales, StoreOp::Insert, FaultKind::Rejected))
            .await;

        match f
            .engine
            .execute(cash_sale(vec![line("001", 1)]), Actor::new(1))
            .await
            .unwrap_err()
        {
            EngineError::PartialSaleFailure(partial) => {
                assert_eq!(partial.sale_id, None);
                assert_eq!(partial.failed_step, SaleStep::Header);
                assert!(partial.committed_lines.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(quantity(&f, "001").await, 10);
    }

    #[tokio::test]
    async fn test_sale_id_recovered_without_returning() {
        let f = fixture(MemoryStore::new().without_returning());
        stock(&f, "001", 10).await;

        let receipt = f
            .engine
            .execute(cash_sale(vec![line("001", 1)]), Actor::new(1))
            .await
            .unwrap();

        let sales = f.memory.dump(Table::Sales).await;
        assert_eq!(sales[0].get_i64("id"), Some(receipt.sale_id));
        let lines = f.memory.dump(Table::SaleItems).await;
        assert_eq!(lines[0].get_i64("sale_id"), Some(receipt.sale_id));
    }

    #[tokio::test]
    async fn test_drained_stock_is_reported() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 5).await;
        // another till takes 4 after preflight
        f.memory
            .inject(Fault::new(
                Table::Products,
                StoreOp::Update,
                FaultKind::Interfere(Record::new().with("quantity", 1)),
            ))
            .await;

        let receipt = f
            .engine
            .execute(cash_sale(vec![line("001", 3)]), Actor::new(1))
            .await
            .unwrap();

        assert_eq!(
            receipt.stock_warnings,
            vec![StockWarning {
                barcode: "001".to_string(),
                shortfall: 2
            }]
        );
        assert_eq!(quantity(&f, "001").await, 0);
        assert_eq!(audit_actions(&f).await, vec!["stock_went_negative", "sale"]);
    }

    #[tokio::test]
    async fn test_overflowing_lines_are_rejected_before_preflight() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 10).await;

        let mut request = cash_sale(vec![line("001", 1)]);
        request.lines = vec![line("001", i64::MAX), line("001", i64::MAX)];

        let err = f.engine.execute(request, Actor::new(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
        assert_eq!(f.memory.count(Table::Sales).await, 0);
        assert_eq!(quantity(&f, "001").await, 10);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_stop_the_commit() {
        let f = fixture(MemoryStore::new());
        stock(&f, "001", 10).await;
        f.till.open(Money::zero(), &Actor::new(1)).await.unwrap();
        // the line insert stalls until well after the caller gives up
        f.memory
            .inject(Fault::new(
                Table::SaleItems,
                StoreOp::Insert,
                FaultKind::Hang(Duration::from_millis(200)),
            ))
            .await;

        let gave_up = tokio::time::timeout(
            Duration::from_millis(20),
            f.engine.execute(cash_sale(vec![line("001", 2)]), Actor::new(2)),
        )
        .await;
        assert!(gave_up.is_err());
        assert_eq!(f.memory.count(Table::SaleItems).await, 0);

        for _ in 0..100 {
            if audit_actions(&f).await.iter().any(|a| a == "sale") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(audit_actions(&f).await, vec!["cash_open", "sale"]);
        assert_eq!(f.memory.count(Table::SaleItems).await, 1);
        assert_eq!(quantity(&f, "001").await, 8);
        assert_eq!(f.till.state().await.unwrap().current_amount_cents, 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cash_sales_book_their_sum() {
        let f = fixture(MemoryStore::new());
        for n in 0..12 {
            stock(&f, &format!("{:03}", n), 10).await;
        }
        f.till.open(Money::from_cents(10000), &Actor::new(1)).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..12i64 {
            let engine = f.engine.clone();
            let request = cash_sale(vec![line(&format!("{:03}", n), n % 3 + 1)]);
            tasks.spawn(async move { engine.execute(request, Actor::new(2)).await });
        }
        while let Some(joined) = tasks.join_next().await {
            assert!(joined.unwrap().unwrap().cash_booked);
        }

        let sold: i64 = (0..12i64).map(|n| (n % 3 + 1) * 500).sum();
        assert_eq!(f.till.state().await.unwrap().current_amount_cents, 10000 + sold);
        assert_eq!(f.memory.count(Table::Sales).await, 12);
        let booked: i64 = f
            .memory
            .dump(Table::CashTransactions)
            .await
            .iter()
            .filter(|r| r.get_str("transaction_type") == Some("sale"))
            .filter_map(|r| r.get_i64("amount_cents"))
            .sum();
        assert_eq!(booked, sold);
    }
}
