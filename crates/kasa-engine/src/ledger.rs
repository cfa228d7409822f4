//! # Inventory Ledger
//!
//! Sole owner of `products.quantity` and the `stock_movements` log.
//!
//! ## Applying a Delta
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_delta("001", -3, Out)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  read product ─── quantity = 10                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE products SET quantity = 7                                      │
//! │   WHERE barcode = '001' AND quantity = 10     ◄── compare-and-set      │
//! │       │                                                                 │
//! │       ├── 1 row  ──► append movement (out, 3) ──► done                 │
//! │       └── 0 rows ──► someone else wrote first: re-read, try again      │
//! │                      (5 attempts, then StockContention)                │
//! │                                                                         │
//! │  target < 0 ──► write 0, report shortfall, audit stock_went_negative   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every successful call appends exactly one movement, with
//! `quantity = |delta|` even when the write was clamped.

use chrono::{DateTime, Utc};
use kasa_core::time;
use kasa_core::{
    AuditAction, Availability, Money, MovementType, Product, Rate, StockMovement, ValidationError,
    ValidationErrors,
};
use kasa_db::{Filter, Record, Store, Table};
use tracing::{debug, info, warn};

use crate::audit::{Actor, AuditLog};
use crate::error::{EngineError, EngineResult};

/// Compare-and-set attempts before giving up with `StockContention`.
pub const MAX_CAS_ATTEMPTS: usize = 5;

/// Attributes for a product created by a positive delta.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProductFields {
    pub name: String,
    pub price: Money,
    pub vat_rate: Rate,
    pub excise_rate: Rate,
    pub min_stock_level: i64,
}

/// One quantity change for one barcode.
#[derive(Debug, Clone, PartialEq)]
pub struct StockDelta {
    pub barcode: String,
    pub delta: i64,
    pub movement_type: MovementType,
    /// Dedup key for the movement insert.
    pub request_id: Option<String>,
    /// Lets a positive delta create a missing product.
    pub create: Option<NewProductFields>,
}

impl StockDelta {
    pub fn new(barcode: impl Into<String>, delta: i64, movement_type: MovementType) -> Self {
        StockDelta {
            barcode: barcode.into(),
            delta,
            movement_type,
            request_id: None,
            create: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn creating(mut self, fields: NewProductFields) -> Self {
        self.create = Some(fields);
        self
    }
}

/// What a delta did.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaOutcome {
    /// The product as written.
    pub product: Product,
    pub previous_quantity: i64,
    /// Units a decrement could not take because stock ran out under it.
    pub shortfall: i64,
    /// The delta created the product.
    pub created: bool,
    pub movement: StockMovement,
}

impl DeltaOutcome {
    pub fn stock_went_negative(&self) -> bool {
        self.shortfall > 0
    }
}

/// Where a write moves the quantity.
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Relative to whatever is stored when the write goes out.
    By(i64),
    /// An absolute count; the delta is taken against the latest read.
    To(i64),
}

/// One compare-and-set write, as sent.
#[derive(Debug, Clone, Copy)]
struct Attempt {
    previous_quantity: i64,
    new_quantity: i64,
    delta: i64,
    movement_type: MovementType,
    shortfall: i64,
    stamp: DateTime<Utc>,
}

impl Attempt {
    /// Whether `product` is exactly what this write would have left.
    fn landed_in(&self, product: &Product) -> bool {
        product.quantity == self.new_quantity && product.updated_at == Some(self.stamp)
    }
}

#[derive(Debug, Clone)]
pub struct InventoryLedger {
    store: Store,
    audit: AuditLog,
}

impl InventoryLedger {
    pub fn new(store: Store, audit: AuditLog) -> Self {
        InventoryLedger { store, audit }
    }

    pub async fn find(&self, barcode: &str) -> EngineResult<Option<Product>> {
        Ok(self
            .store
            .fetch_one(Table::Products, &Filter::eq("barcode", barcode))
            .await?)
    }

    /// Read-only sufficiency check.
    pub async fn check_availability(&self, barcode: &str, quantity: i64) -> EngineResult<Availability> {
        Ok(match self.find(barcode).await? {
            Some(product) => product.availability(quantity),
            None => Availability::NotFound,
        })
    }

    /// Inserts a product with its initial quantity. A positive quantity gets
    /// a `new` movement.
    pub async fn register_product(&self, product: Product, actor: &Actor) -> EngineResult<Product> {
        let stored = match self.store.insert(Table::Products, &product).await {
            Ok(Some(stored)) => stored,
            Ok(None) => self
                .find(&product.barcode)
                .await?
                .ok_or_else(|| EngineError::Internal(format!("product {} vanished after insert", product.barcode)))?,
            Err(e) if e.is_unique_violation() => {
                return Err(EngineError::DuplicateBarcode(product.barcode));
            }
            Err(e) => return Err(e.into()),
        };

        if stored.quantity > 0 {
            self.append_movement(&stored, MovementType::New, stored.quantity, None, actor, stored.created_at)
                .await?;
        }
        info!(barcode = %stored.barcode, quantity = stored.quantity, "Product registered");
        Ok(stored)
    }

    /// Adds `delta` to the product's quantity and appends one movement.
    pub async fn apply_delta(&self, change: StockDelta, actor: &Actor) -> EngineResult<DeltaOutcome> {
        if change.delta == 0 || change.delta == i64::MIN {
            let mut errors = ValidationErrors::new();
            if change.delta == 0 {
                errors.push(ValidationError::must_be_positive("quantity"));
            } else {
                errors.push(ValidationError::out_of_range("quantity"));
            }
            return Err(errors.into());
        }

        let barcode = change.barcode.clone();
        let target = Target::By(change.delta);
        self.write_quantity(change, target, actor)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("stock delta for {} wrote nothing", barcode)))
    }

    /// Sets the product's quantity to `quantity`, appending an `in` or `out`
    /// movement for the difference. `Ok(None)` when it already holds that
    /// count.
    pub async fn set_quantity(
        &self,
        barcode: &str,
        quantity: i64,
        actor: &Actor,
    ) -> EngineResult<Option<DeltaOutcome>> {
        if quantity < 0 {
            let mut errors = ValidationErrors::new();
            errors.push(ValidationError::must_be_non_negative("quantity"));
            return Err(errors.into());
        }
        let change = StockDelta::new(barcode, 0, MovementType::In);
        self.write_quantity(change, Target::To(quantity), actor).await
    }

    async fn write_quantity(
        &self,
        change: StockDelta,
        target: Target,
        actor: &Actor,
    ) -> EngineResult<Option<DeltaOutcome>> {
        // our last write attempt, recognised if its response was lost
        let mut pending: Option<Attempt> = None;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = match self.find(&change.barcode).await? {
                Some(product) => product,
                None => {
                    if !matches!(target, Target::By(delta) if delta > 0) {
                        return Err(EngineError::ProductNotFound(change.barcode));
                    }
                    let fields = change.create.clone().ok_or_else(|| {
                        EngineError::MissingProductFields {
                            barcode: change.barcode.clone(),
                        }
                    })?;
                    match self.create_with_delta(&change, fields, actor).await? {
                        Some(outcome) => return Ok(Some(outcome)),
                        // created concurrently by someone else; adjust theirs
                        None => continue,
                    }
                }
            };

            if let Some(landed) = pending.filter(|p| p.landed_in(&current)) {
                debug!(barcode = %current.barcode, "Earlier stock write had landed");
                return self.complete(change, current, landed, actor).await.map(Some);
            }

            let (delta, movement_type) = match target {
                Target::By(delta) => (delta, change.movement_type),
                Target::To(quantity) => {
                    let delta = quantity - current.quantity;
                    if delta == 0 {
                        return Ok(None);
                    }
                    (delta, if delta > 0 { MovementType::In } else { MovementType::Out })
                }
            };
            let target_quantity = current.quantity.checked_add(delta).ok_or_else(|| {
                let mut errors = ValidationErrors::new();
                errors.push(ValidationError::out_of_range("quantity"));
                EngineError::from(errors)
            })?;
            let write = Attempt {
                previous_quantity: current.quantity,
                new_quantity: target_quantity.max(0),
                delta,
                movement_type,
                shortfall: target_quantity.saturating_neg().max(0),
                stamp: time::now(),
            };
            pending = Some(write);

            let cas = Filter::eq("barcode", current.barcode.as_str()).and_eq("quantity", current.quantity);
            let patch = Record::new()
                .with("quantity", write.new_quantity)
                .with("updated_at", time::format_timestamp(&write.stamp));

            let changed = match self.store.update(Table::Products, &cas, patch).await {
                Ok(changed) => changed,
                // the write may have landed; the next read tells
                Err(e) if e.is_transient() && attempt < MAX_CAS_ATTEMPTS => {
                    warn!(barcode = %current.barcode, attempt, error = %e, "Stock write failed, re-reading");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if changed == 0 {
                debug!(
                    barcode = %current.barcode,
                    attempt,
                    expected = current.quantity,
                    "Stock changed under compare-and-set, retrying"
                );
                continue;
            }

            let product = Product {
                quantity: write.new_quantity,
                updated_at: Some(write.stamp),
                ..current
            };
            return self.complete(change, product, write, actor).await.map(Some);
        }

        warn!(barcode = %change.barcode, attempts = MAX_CAS_ATTEMPTS, "Giving up on stock update");
        Err(EngineError::StockContention(change.barcode))
    }

    /// Records the shortfall (if any) and the movement for a landed write.
    async fn complete(
        &self,
        change: StockDelta,
        product: Product,
        write: Attempt,
        actor: &Actor,
    ) -> EngineResult<DeltaOutcome> {
        if write.shortfall > 0 {
            warn!(
                barcode = %product.barcode,
                previous = write.previous_quantity,
                delta = write.delta,
                shortfall = write.shortfall,
                "Stock would have gone negative, clamped to zero"
            );
            self.audit
                .record(
                    actor,
                    AuditAction::StockWentNegative,
                    format!(
                        "Stock for {} clamped to 0: had {}, removed {}, short {}",
                        product.barcode,
                        write.previous_quantity,
                        -write.delta,
                        write.shortfall
                    ),
                )
                .await;
        }
        let movement = self
            .append_movement(
                &product,
                write.movement_type,
                write.delta.abs(),
                change.request_id,
                actor,
                write.stamp,
            )
            .await?;
        Ok(DeltaOutcome {
            product,
            previous_quantity: write.previous_quantity,
            shortfall: write.shortfall,
            created: false,
            movement,
        })
    }

    /// Creates the product with `delta` as its quantity. `Ok(None)` means the
    /// barcode appeared concurrently.
    async fn create_with_delta(
        &self,
        change: &StockDelta,
        fields: NewProductFields,
        actor: &Actor,
    ) -> EngineResult<Option<DeltaOutcome>> {
        let now = time::now();
        let product = Product {
            id: None,
            barcode: change.barcode.clone(),
            name: fields.name,
            price_cents: fields.price.cents(),
            quantity: change.delta,
            vat_rate_bps: fields.vat_rate.bps(),
            excise_rate_bps: fields.excise_rate.bps(),
            min_stock_level: fields.min_stock_level,
            created_at: now,
            updated_at: None,
        };

        let stored = match self.store.insert(Table::Products, &product).await {
            Ok(Some(stored)) => stored,
            Ok(None) => self.find(&product.barcode).await?.unwrap_or(product),
            Err(e) if e.is_unique_violation() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let movement = self
            .append_movement(
                &stored,
                MovementType::New,
                change.delta,
                change.request_id.clone(),
                actor,
                now,
            )
            .await?;
        info!(barcode = %stored.barcode, quantity = stored.quantity, "Product created by stock add");
        Ok(Some(DeltaOutcome {
            product: stored,
            previous_quantity: 0,
            shortfall: 0,
            created: true,
            movement,
        }))
    }

    async fn append_movement(
        &self,
        product: &Product,
        movement_type: MovementType,
        quantity: i64,
        request_id: Option<String>,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> EngineResult<StockMovement> {
        let movement = StockMovement {
            id: None,
            request_id,
            barcode: product.barcode.clone(),
            product_name: product.name.clone(),
            movement_type,
            quantity,
            user_id: actor.user_id,
            movement_date: at,
        };
        let stored = self.store.insert(Table::StockMovements, &movement).await?;
        debug!(
            barcode = %movement.barcode,
            movement_type = %movement_type,
            quantity,
            "Stock movement appended"
        );
        Ok(stored.unwrap_or(movement))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
