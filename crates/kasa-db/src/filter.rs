//! # Query Filters
//!
//! A conjunction of column conditions plus optional ordering and limit.
//! Every backend interprets the same `Filter`: SQLite renders it to a
//! `WHERE` clause, PostgREST to query parameters, and the memory store
//! evaluates it with [`Filter::matches`].
//!
//! ## Example
//! ```
//! use kasa_db::{Filter, FilterOp, SortOrder};
//!
//! let filter = Filter::eq("payment_method", "cash")
//!     .and("sale_date", FilterOp::Gte, "2026-10-15T00:00:00.000000Z")
//!     .order_by("sale_date", SortOrder::Desc)
//!     .limit(50);
//! assert_eq!(filter.conditions().len(), 2);
//! ```

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::record::Record;
use crate::table::Table;

/// Comparison operator of one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    /// SQL operator text.
    pub fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }

    /// PostgREST operator prefix.
    pub fn postgrest(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Neq => ordering != Ordering::Equal,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Gte => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// `column op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Conditions (ANDed), optional ordering, optional limit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
    order: Option<(String, SortOrder)>,
    limit: Option<usize>,
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::all().and(column, FilterOp::Eq, value)
    }

    pub fn and(mut self, column: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn and_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.and(column, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, column: &str, order: SortOrder) -> Self {
        self.order = Some((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> Option<(&str, SortOrder)> {
        self.order.as_ref().map(|(c, o)| (c.as_str(), *o))
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// True when no condition narrows the row set.
    pub fn is_unfiltered(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Rejects conditions or ordering on columns the table does not have,
    /// and nested values no backend can compare.
    pub fn validate_for(&self, table: Table) -> StoreResult<()> {
        for condition in &self.conditions {
            table.check_column(&condition.column)?;
            if condition.value.is_array() || condition.value.is_object() {
                return Err(StoreError::Rejected(format!(
                    "filter on {}.{} must compare a scalar",
                    table, condition.column
                )));
            }
        }
        if let Some((column, _)) = &self.order {
            table.check_column(column)?;
        }
        Ok(())
    }

    /// Update and delete must name the rows they touch.
    pub fn require_conditions(&self, table: Table, operation: &str) -> StoreResult<()> {
        if self.is_unfiltered() {
            return Err(StoreError::Rejected(format!(
                "refusing unfiltered {} on {}",
                operation, table
            )));
        }
        Ok(())
    }

    /// Evaluates the conditions against one record.
    ///
    /// `Eq`/`Neq` against `null` test for absence. A `null` column never
    /// satisfies a comparison against a non-null value.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|condition| {
            let actual = record.get(&condition.column).unwrap_or(&Value::Null);
            match (&condition.value, actual) {
                (Value::Null, actual) => match condition.op {
                    FilterOp::Eq => actual.is_null(),
                    FilterOp::Neq => !actual.is_null(),
                    _ => false,
                },
                (_, Value::Null) => false,
                (expected, actual) => compare_values(actual, expected)
                    .map(|ordering| condition.op.accepts(ordering))
                    .unwrap_or(false),
            }
        })
    }

    /// Sorts and truncates rows already filtered with [`Filter::matches`].
    pub fn apply_order_and_limit(&self, rows: &mut Vec<Record>) {
        if let Some((column, order)) = &self.order {
            rows.sort_by(|a, b| {
                let left = a.get(column).unwrap_or(&Value::Null);
                let right = b.get(column).unwrap_or(&Value::Null);
                let ordering = match (left, right) {
                    (Value::Null, Value::Null) => Ordering::Equal,
                    (Value::Null, _) => Ordering::Less,
                    (_, Value::Null) => Ordering::Greater,
                    (l, r) => compare_values(l, r).unwrap_or(Ordering::Equal),
                };
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
    }
}

/// Orders two scalars of compatible kinds. Booleans compare as 0/1 so a
/// filter on `is_open = true` also matches SQLite's integer storage.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (numeric(left), numeric(right)) {
        (Some(l), Some(r)) => {
            if let (Some(li), Some(ri)) = (l.as_i64(), r.as_i64()) {
                return Some(li.cmp(&ri));
            }
            l.as_f64()?.partial_cmp(&r.as_f64()?)
        }
        _ => match (left, right) {
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            _ => None,
        },
    }
}

fn numeric(value: &Value) -> Option<serde_json::Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::Bool(b) => Some(serde_json::Number::from(*b as i64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(id: i64, method: &str, date: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("payment_method", method)
            .with("sale_date", date)
    }

    #[test]
    fn test_conditions_are_anded() {
        let filter = Filter::eq("payment_method", "cash").and(
            "sale_date",
            FilterOp::Gte,
            "2026-10-15T00:00:00.000000Z",
        );

        assert!(filter.matches(&sale(1, "cash", "2026-10-15T09:30:00.000000Z")));
        assert!(!filter.matches(&sale(2, "card", "2026-10-15T09:30:00.000000Z")));
        assert!(!filter.matches(&sale(3, "cash", "2026-10-14T23:59:59.999999Z")));
    }

    #[test]
    fn test_null_semantics() {
        let open = Record::new().with("closing_time", Value::Null);
        assert!(Filter::eq("closing_time", Value::Null).matches(&open));
        assert!(!Filter::all()
            .and("closing_time", FilterOp::Neq, Value::Null)
            .matches(&open));
        assert!(!Filter::all()
            .and("closing_time", FilterOp::Lt, "2026")
            .matches(&open));
        // missing column behaves like null
        assert!(Filter::eq("user_id", Value::Null).matches(&Record::new()));
    }

    #[test]
    fn test_bool_matches_integer_storage() {
        let row = Record::new().with("is_open", 1);
        assert!(Filter::eq("is_open", true).matches(&row));
        assert!(!Filter::eq("is_open", false).matches(&row));
    }

    #[test]
    fn test_numeric_comparison_mixes_int_and_float() {
        let row = Record::new().with("quantity", 10);
        assert!(Filter::all().and("quantity", FilterOp::Gt, 9.5).matches(&row));
        assert!(Filter::eq("quantity", 10.0).matches(&row));
    }

    #[test]
    fn test_order_and_limit() {
        let filter = Filter::all().order_by("id", SortOrder::Desc).limit(2);
        let mut rows = vec![
            sale(1, "cash", "a"),
            sale(3, "cash", "c"),
            sale(2, "card", "b"),
        ];
        filter.apply_order_and_limit(&mut rows);
        let ids: Vec<i64> = rows.iter().filter_map(|r| r.get_i64("id")).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_validate_for_rejects_unknown_columns() {
        assert!(Filter::eq("barcode", "001").validate_for(Table::Products).is_ok());
        assert!(Filter::eq("barcode; DROP TABLE", "001")
            .validate_for(Table::Products)
            .is_err());
        assert!(Filter::all()
            .order_by("nope", SortOrder::Asc)
            .validate_for(Table::Products)
            .is_err());
        assert!(Filter::eq("barcode", serde_json::json!(["a"]))
            .validate_for(Table::Products)
            .is_err());
    }

    #[test]
    fn test_unfiltered_mutation_refused() {
        assert!(Filter::all().require_conditions(Table::Products, "delete").is_err());
        assert!(Filter::eq("id", 1).require_conditions(Table::Products, "delete").is_ok());
    }
}
