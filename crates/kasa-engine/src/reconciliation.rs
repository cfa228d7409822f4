//! # Reconciliation Reporter
//!
//! Derives expected drawer cash from recorded sales. Reads only.
//!
//! There is no isolation against sales recorded while a close is in flight:
//! a cash sale landing between the read here and the till's close write is
//! in the drawer but not in `expected_cash`.

use chrono::{DateTime, FixedOffset, Local, Utc};
use kasa_core::reconciliation;
use kasa_core::time;
use kasa_core::{Money, PaymentMethod, Sale, TillState};
use kasa_db::{Filter, FilterOp, Store, Table};
use tracing::debug;

use crate::error::EngineResult;

#[derive(Debug, Clone)]
pub struct ReconciliationReporter {
    store: Store,
    offset: FixedOffset,
}

impl ReconciliationReporter {
    /// Reporter whose business day follows the host's local offset.
    pub fn new(store: Store) -> Self {
        Self::with_offset(store, *Local::now().offset())
    }

    pub fn with_offset(store: Store, offset: FixedOffset) -> Self {
        ReconciliationReporter { store, offset }
    }

    /// Midnight of the current business day.
    pub fn start_of_today(&self) -> DateTime<Utc> {
        time::start_of_day(time::now(), self.offset)
    }

    pub async fn cash_sales_since(&self, since: DateTime<Utc>) -> EngineResult<Money> {
        self.sales_total_since(PaymentMethod::Cash, since).await
    }

    pub async fn card_sales_since(&self, since: DateTime<Utc>) -> EngineResult<Money> {
        self.sales_total_since(PaymentMethod::Card, since).await
    }

    /// `opening_balance + cash sales since opening`. A till that was never
    /// opened counts from the start of today.
    pub async fn expected_cash(&self, till: &TillState) -> EngineResult<Money> {
        let since = till.opening_time.unwrap_or_else(|| self.start_of_today());
        let cash_sales = self.cash_sales_since(since).await?;
        Ok(reconciliation::expected_cash(till.opening_balance(), cash_sales))
    }

    async fn sales_total_since(&self, method: PaymentMethod, since: DateTime<Utc>) -> EngineResult<Money> {
        let filter = Filter::eq("payment_method", method.as_str()).and(
            "sale_date",
            FilterOp::Gte,
            time::format_timestamp(&since),
        );
        let sales: Vec<Sale> = self.store.fetch_all(Table::Sales, &filter).await?;
        let total = reconciliation::sum_sales(&sales, method);
        debug!(method = %method.as_str(), since = %since, sales = sales.len(), total = %total, "Summed sales");
        Ok(total)
    }
}
