//! # Tables
//!
//! The fixed set of tables Kasa reads and writes, with their column
//! whitelists. Adapters build SQL / PostgREST queries only from names that
//! pass these checks, so no caller-supplied string reaches a query verbatim.

use std::fmt;

use crate::error::{StoreError, StoreResult};
use crate::record::Record;

/// A stored table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Users,
    Products,
    StockMovements,
    Sales,
    SaleItems,
    CashRegister,
    CashTransactions,
    AuditLogs,
}

/// Column used as an insert deduplication key.
pub const DEDUP_COLUMN: &str = "request_id";

impl Table {
    pub const ALL: [Table; 8] = [
        Table::Users,
        Table::Products,
        Table::StockMovements,
        Table::Sales,
        Table::SaleItems,
        Table::CashRegister,
        Table::CashTransactions,
        Table::AuditLogs,
    ];

    /// Table name in the store.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Products => "products",
            Table::StockMovements => "stock_movements",
            Table::Sales => "sales",
            Table::SaleItems => "sale_items",
            Table::CashRegister => "cash_register",
            Table::CashTransactions => "cash_transactions",
            Table::AuditLogs => "audit_logs",
        }
    }

    /// Every column of the table.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Users => &[
                "id",
                "username",
                "password_hash",
                "full_name",
                "role",
                "last_login",
                "created_at",
            ],
            Table::Products => &[
                "id",
                "barcode",
                "name",
                "price_cents",
                "quantity",
                "vat_rate_bps",
                "excise_rate_bps",
                "min_stock_level",
                "created_at",
                "updated_at",
            ],
            Table::StockMovements => &[
                "id",
                "request_id",
                "barcode",
                "product_name",
                "movement_type",
                "quantity",
                "user_id",
                "movement_date",
            ],
            Table::Sales => &[
                "id",
                "request_id",
                "total_cents",
                "payment_method",
                "cash_amount_cents",
                "card_amount_cents",
                "change_amount_cents",
                "user_id",
                "sale_date",
            ],
            Table::SaleItems => &[
                "id",
                "request_id",
                "sale_id",
                "barcode",
                "product_name",
                "quantity",
                "unit_price_cents",
            ],
            Table::CashRegister => &[
                "id",
                "is_open",
                "current_amount_cents",
                "opening_balance_cents",
                "opening_time",
                "closing_time",
                "last_updated",
            ],
            Table::CashTransactions => &[
                "id",
                "request_id",
                "transaction_type",
                "amount_cents",
                "user_id",
                "transaction_date",
                "description",
            ],
            Table::AuditLogs => &[
                "id",
                "user_id",
                "action",
                "description",
                "ip_address",
                "created_at",
            ],
        }
    }

    /// Columns stored as 0/1 integers by SQLite that records expect as bools.
    pub fn boolean_columns(&self) -> &'static [&'static str] {
        match self {
            Table::CashRegister => &["is_open"],
            _ => &[],
        }
    }

    /// Columns with a UNIQUE constraint (besides `id`). NULLs never collide.
    pub fn unique_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Users => &["username"],
            Table::Products => &["barcode"],
            Table::StockMovements | Table::Sales | Table::SaleItems | Table::CashTransactions => {
                &[DEDUP_COLUMN]
            }
            Table::CashRegister | Table::AuditLogs => &[],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    pub fn is_boolean(&self, column: &str) -> bool {
        self.boolean_columns().contains(&column)
    }

    /// Whether inserts into this table can carry a dedup key.
    pub fn supports_dedup(&self) -> bool {
        self.has_column(DEDUP_COLUMN)
    }

    /// Rejects any column not in the whitelist.
    pub fn check_column(&self, column: &str) -> StoreResult<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(StoreError::Rejected(format!(
                "unknown column '{}' for table {}",
                column,
                self.name()
            )))
        }
    }

    /// Rejects a record with any column not in the whitelist.
    pub fn check_record(&self, record: &Record) -> StoreResult<()> {
        record.columns().try_for_each(|column| self.check_column(column))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_has_an_id() {
        for table in Table::ALL {
            assert!(table.has_column("id"), "{} has no id column", table);
        }
    }

    #[test]
    fn test_dedup_tables() {
        assert!(Table::Sales.supports_dedup());
        assert!(Table::SaleItems.supports_dedup());
        assert!(Table::StockMovements.supports_dedup());
        assert!(Table::CashTransactions.supports_dedup());
        assert!(!Table::Products.supports_dedup());
        assert!(!Table::AuditLogs.supports_dedup());
    }

    #[test]
    fn test_unknown_column_rejected() {
        let record = Record::new().with("barcode", "001").with("colour", "red");
        let err = Table::Products.check_record(&record).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(msg) if msg.contains("colour")));
    }
}
