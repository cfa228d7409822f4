//! # Till
//!
//! The cash-register singleton (`cash_register.id = 1`) and its
//! `cash_transactions` log.
//!
//! ## Serialization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open / apply_cash_effect / close                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  gate.lock()  ◄── one till writer per process                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  read row ──► next state (kasa_core::TillState) ──► CAS write           │
//! │                                                     WHERE id = 1        │
//! │                                                       AND is_open = ?   │
//! │                                                                         │
//! │  status() takes no lock and never writes                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The compare-and-set on `is_open` (and on `current_amount_cents` for cash
//! effects) covers a second process sharing the store.
//!
//! A write whose response was lost and then replayed matches zero rows.
//! Every zero-row answer is checked against a fresh read: a row that already
//! equals the state we sent means our own write landed.

use std::sync::Arc;

use kasa_core::time;
use kasa_core::{
    AuditAction, CashTransaction, CashTransactionType, CloseSummary, CoreError, Money, TillState,
    TillStatus, ValidationError, ValidationErrors, TILL_ROW_ID,
};
use kasa_db::{Filter, Record, Store, Table};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audit::{Actor, AuditLog};
use crate::error::{EngineError, EngineResult};
use crate::reconciliation::ReconciliationReporter;

/// Attempts at the balance compare-and-set when another process interleaves.
const MAX_BALANCE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct Till {
    store: Store,
    audit: AuditLog,
    reporter: ReconciliationReporter,
    gate: Arc<Mutex<()>>,
}

impl Till {
    pub fn new(store: Store, audit: AuditLog, reporter: ReconciliationReporter) -> Self {
        Till {
            store,
            audit,
            reporter,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Current till row, or the never-opened state if the row does not exist.
    pub async fn state(&self) -> EngineResult<TillState> {
        Ok(self
            .read()
            .await?
            .unwrap_or_else(|| TillState::initial(time::now())))
    }

    /// Read-only composite of the till row and today's sales.
    pub async fn status(&self) -> EngineResult<TillStatus> {
        let till = self.state().await?;
        let today = self.reporter.start_of_today();
        let cash_sales_today = self.reporter.cash_sales_since(today).await?;
        let card_sales_today = self.reporter.card_sales_since(today).await?;

        Ok(TillStatus {
            is_open: till.is_open,
            current_amount: till.current_amount(),
            opening_balance: till.opening_balance(),
            opening_time: till.opening_time,
            cash_sales_today,
            card_sales_today,
            expected_cash: till.opening_balance() + cash_sales_today,
        })
    }

    /// Closed → Open with `initial` in the drawer.
    pub async fn open(&self, initial: Money, actor: &Actor) -> EngineResult<TillState> {
        if initial.is_negative() {
            let mut errors = ValidationErrors::new();
            errors.push(ValidationError::must_be_non_negative("initial_amount"));
            return Err(errors.into());
        }

        let _guard = self.gate.lock().await;
        let now = time::now();
        let till = self.load_or_init().await?;
        let next = till.opened(initial, now)?;

        let cas = Filter::eq("id", TILL_ROW_ID).and_eq("is_open", false);
        if !self.write_state(&cas, state_patch(&next), &next).await? {
            return Err(CoreError::AlreadyOpen.into());
        }

        self.append_transaction(
            CashTransactionType::Open,
            initial,
            actor,
            None,
            format!("Till opened with {}", initial),
        )
        .await?;
        self.audit
            .record(actor, AuditAction::CashOpen, format!("Till opened with {}", initial))
            .await;

        info!(actor = actor.user_id, opening_balance = %initial, "Till opened");
        Ok(next)
    }

    /// Books a cash sale.
    ///
    /// The transaction row is written whether or not the till is open; the
    /// balance moves only while open. Returns whether the balance moved.
    pub async fn apply_cash_effect(
        &self,
        amount: Money,
        sale_id: i64,
        actor: &Actor,
        request_id: Option<String>,
    ) -> EngineResult<bool> {
        if !amount.is_positive() {
            let mut errors = ValidationErrors::new();
            errors.push(ValidationError::must_be_positive("amount"));
            return Err(errors.into());
        }

        let _guard = self.gate.lock().await;
        self.append_transaction(
            CashTransactionType::Sale,
            amount,
            actor,
            request_id,
            format!("Sale #{}", sale_id),
        )
        .await?;

        for attempt in 1..=MAX_BALANCE_ATTEMPTS {
            let till = self.load_or_init().await?;
            if !till.is_open {
                warn!(sale_id, amount = %amount, "Cash sale recorded while till is closed");
                return Ok(false);
            }

            let next = till.with_cash(amount, time::now());
            let cas = Filter::eq("id", TILL_ROW_ID)
                .and_eq("is_open", true)
                .and_eq("current_amount_cents", till.current_amount_cents);
            let patch = Record::new()
                .with("current_amount_cents", next.current_amount_cents)
                .with("last_updated", time::format_timestamp(&next.last_updated));

            if self.write_state(&cas, patch, &next).await? {
                debug!(sale_id, amount = %amount, balance = next.current_amount_cents, "Cash booked");
                return Ok(true);
            }
            debug!(sale_id, attempt, "Till balance changed under compare-and-set, retrying");
        }

        Err(EngineError::Internal(format!(
            "till balance kept changing while booking sale #{}",
            sale_id
        )))
    }

    /// Open → Closed. Expected cash is the opening balance plus cash sales
    /// since the till opened.
    pub async fn close(&self, actual: Money, actor: &Actor) -> EngineResult<CloseSummary> {
        if actual.is_negative() {
            let mut errors = ValidationErrors::new();
            errors.push(ValidationError::must_be_non_negative("final_amount"));
            return Err(errors.into());
        }

        let _guard = self.gate.lock().await;
        let till = self.load_or_init().await?;
        if !till.is_open {
            return Err(CoreError::AlreadyClosed.into());
        }

        let expected_cash = self.reporter.expected_cash(&till).await?;
        let summary = CloseSummary::compute(
            till.opening_balance(),
            expected_cash - till.opening_balance(),
            actual,
        );

        let next = till.closed(time::now())?;
        let cas = Filter::eq("id", TILL_ROW_ID).and_eq("is_open", true);
        if !self.write_state(&cas, state_patch(&next), &next).await? {
            return Err(CoreError::AlreadyClosed.into());
        }

        let description = format!(
            "Till closed. Expected: {}, actual: {}",
            summary.expected_cash, summary.actual_amount
        );
        self.append_transaction(CashTransactionType::Close, actual, actor, None, description.clone())
            .await?;
        self.audit.record(actor, AuditAction::CashClose, description).await;

        info!(
            actor = actor.user_id,
            expected = %summary.expected_cash,
            actual = %summary.actual_amount,
            difference = %summary.difference,
            "Till closed"
        );
        Ok(summary)
    }

    /// Compare-and-set write of `next`. `Ok(false)` when the guard did not
    /// match and the row is not already `next`.
    async fn write_state(&self, cas: &Filter, patch: Record, next: &TillState) -> EngineResult<bool> {
        let failure = match self.store.update(Table::CashRegister, cas, patch).await {
            Ok(0) => None,
            Ok(_) => return Ok(true),
            Err(e) if e.is_transient() => Some(e),
            Err(e) => return Err(e.into()),
        };

        if self.read().await?.as_ref() == Some(next) {
            debug!("Earlier till write had landed");
            return Ok(true);
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(false),
        }
    }

    async fn read(&self) -> EngineResult<Option<TillState>> {
        Ok(self
            .store
            .fetch_one(Table::CashRegister, &Filter::eq("id", TILL_ROW_ID))
            .await?)
    }

    /// Reads the till row, creating it closed on first use.
    async fn load_or_init(&self) -> EngineResult<TillState> {
        if let Some(till) = self.read().await? {
            return Ok(till);
        }
        let initial = TillState::initial(time::now());
        match self.store.insert(Table::CashRegister, &initial).await {
            Ok(Some(till)) => Ok(till),
            Ok(None) => Ok(initial),
            // another process created it first
            Err(e) if e.is_unique_violation() => Ok(self.read().await?.unwrap_or(initial)),
            Err(e) => Err(e.into()),
        }
    }

    async fn append_transaction(
        &self,
        transaction_type: CashTransactionType,
        amount: Money,
        actor: &Actor,
        request_id: Option<String>,
        description: String,
    ) -> EngineResult<()> {
        let transaction = CashTransaction {
            id: None,
            request_id,
            transaction_type,
            amount_cents: amount.cents(),
            user_id: actor.user_id,
            transaction_date: time::now(),
            description,
        };
        self.store.insert(Table::CashTransactions, &transaction).await?;
        Ok(())
    }
}

/// Every mutable column of the till row.
fn state_patch(state: &TillState) -> Record {
    let stamp = |ts: &Option<chrono::DateTime<chrono::Utc>>| {
        ts.as_ref()
            .map(|t| serde_json::Value::from(time::format_timestamp(t)))
            .unwrap_or(serde_json::Value::Null)
    };
    Record::new()
        .with("is_open", state.is_open)
        .with("current_amount_cents", state.current_amount_cents)
        .with("opening_balance_cents", state.opening_balance_cents)
        .with("opening_time", stamp(&state.opening_time))
        .with("closing_time", stamp(&state.closing_time))
        .with("last_updated", time::format_timestamp(&state.last_updated))
}
