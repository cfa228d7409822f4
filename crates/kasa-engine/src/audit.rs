//! # Audit Log
//!
//! Appends [`AuditLogEntry`] rows. Writing the audit trail never fails the
//! operation being audited: a store error is logged with `warn!` and
//! dropped.

use kasa_core::time;
use kasa_core::{AuditAction, AuditLogEntry};
use kasa_db::{Store, Table};
use tracing::{debug, warn};

/// Who is acting, as seen by the audit trail and the `user_id` columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub ip_address: Option<String>,
}

impl Actor {
    pub fn new(user_id: i64) -> Self {
        Actor {
            user_id,
            ip_address: None,
        }
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    store: Store,
}

impl AuditLog {
    pub fn new(store: Store) -> Self {
        AuditLog { store }
    }

    /// Appends an entry attributed to `actor`.
    pub async fn record(&self, actor: &Actor, action: AuditAction, description: impl Into<String>) {
        let user_id = Some(actor.user_id);
        let entry = AuditLogEntry {
            id: None,
            user_id,
            action,
            description: description.into(),
            ip_address: actor.ip_address.clone(),
            created_at: time::now(),
        };
        match self.store.insert(Table::AuditLogs, &entry).await {
            Ok(_) => debug!(action = %action, ?user_id, "audit entry written"),
            Err(e) => warn!(action = %action, ?user_id, error = %e, "Failed to write audit entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasa_db::{Fault, FaultKind, MemoryStore, StoreOp};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_record_writes_entry() {
        let memory = Arc::new(MemoryStore::new());
        let audit = AuditLog::new(Store::new(memory.clone()));

        audit
            .record(&Actor::new(3).with_ip("10.0.0.7"), AuditAction::CashOpen, "Opened with 100.00")
            .await;

        let rows = memory.dump(Table::AuditLogs).await;
        assert_eq!(rows.len(), 1);
        let entry: AuditLogEntry = rows[0].decode().unwrap();
        assert_eq!(entry.user_id, Some(3));
        assert_eq!(entry.action, AuditAction::CashOpen);
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .inject(Fault::new(Table::AuditLogs, StoreOp::Insert, FaultKind::Unavailable))
            .await;
        let audit = AuditLog::new(Store::new(memory.clone()));

        audit.record(&Actor::new(1), AuditAction::Sale, "Sale #1").await;
        assert_eq!(memory.count(Table::AuditLogs).await, 0);
    }
}
