//! # Product Catalog
//!
//! Back-office product CRUD and goods receiving. Quantity changes always go
//! through the [`InventoryLedger`] so every one leaves a stock movement.

use kasa_core::time;
use kasa_core::{
    AuditAction, MovementType, Product, ProductDraft, ProductPatch, Rate, SaleLine, StockAddRequest,
    DEFAULT_EXCISE_RATE_BPS, DEFAULT_MIN_STOCK_LEVEL, DEFAULT_VAT_RATE_BPS,
};
use kasa_db::{Filter, Record, Store, Table};
use tracing::info;

use crate::audit::{Actor, AuditLog};
use crate::error::{EngineError, EngineResult};
use crate::ledger::{DeltaOutcome, InventoryLedger, NewProductFields, StockDelta};

#[derive(Debug, Clone)]
pub struct Catalog {
    store: Store,
    ledger: InventoryLedger,
    audit: AuditLog,
}

impl Catalog {
    pub fn new(store: Store, ledger: InventoryLedger, audit: AuditLog) -> Self {
        Catalog { store, ledger, audit }
    }

    pub async fn get_product(&self, barcode: &str) -> EngineResult<Product> {
        self.ledger
            .find(barcode)
            .await?
            .ok_or_else(|| EngineError::ProductNotFound(barcode.to_string()))
    }

    /// All products, by name.
    pub async fn list_products(&self) -> EngineResult<Vec<Product>> {
        let mut products: Vec<Product> = self.store.fetch_all(Table::Products, &Filter::all()).await?;
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    pub async fn create_product(&self, draft: ProductDraft, actor: &Actor) -> EngineResult<Product> {
        let product = draft.validate(time::now())?;
        let product = self.ledger.register_product(product, actor).await?;

        self.audit
            .record(
                actor,
                AuditAction::ProductCreate,
                format!("Product created: {} ({})", product.name, product.barcode),
            )
            .await;
        Ok(product)
    }

    /// Patches product details in place. A new quantity is the absolute
    /// count the product ends up holding.
    pub async fn update_product(&self, barcode: &str, patch: ProductPatch, actor: &Actor) -> EngineResult<Product> {
        let patch = patch.validate()?;
        self.get_product(barcode).await?;

        if patch.touches_details() {
            let mut record = Record::new().with("updated_at", time::format_timestamp(&time::now()));
            if let Some(name) = &patch.name {
                record.set("name", name.trim());
            }
            if let Some(price) = patch.price {
                record.set("price_cents", price.cents());
            }
            if let Some(rate) = patch.vat_rate {
                record.set("vat_rate_bps", rate.bps());
            }
            if let Some(rate) = patch.excise_rate {
                record.set("excise_rate_bps", rate.bps());
            }
            if let Some(level) = patch.min_stock_level {
                record.set("min_stock_level", level);
            }
            let changed = self
                .store
                .update(Table::Products, &Filter::eq("barcode", barcode), record)
                .await?;
            if changed == 0 {
                return Err(EngineError::ProductNotFound(barcode.to_string()));
            }
        }

        if let Some(quantity) = patch.quantity {
            self.ledger.set_quantity(barcode, quantity, actor).await?;
        }

        let updated = self.get_product(barcode).await?;
        self.audit
            .record(
                actor,
                AuditAction::ProductUpdate,
                format!("Product updated: {} ({})", updated.name, updated.barcode),
            )
            .await;
        Ok(updated)
    }

    /// Deletes a product no sale line refers to.
    pub async fn delete_product(&self, barcode: &str, actor: &Actor) -> EngineResult<()> {
        let product = self.get_product(barcode).await?;

        let sold: Option<SaleLine> = self
            .store
            .fetch_one(Table::SaleItems, &Filter::eq("barcode", barcode))
            .await?;
        if sold.is_some() {
            return Err(EngineError::ProductInUse(barcode.to_string()));
        }

        if self.store.delete(Table::Products, &Filter::eq("barcode", barcode)).await? == 0 {
            return Err(EngineError::ProductNotFound(barcode.to_string()));
        }

        self.audit
            .record(
                actor,
                AuditAction::ProductDelete,
                format!("Product deleted: {} ({})", product.name, product.barcode),
            )
            .await;
        info!(barcode, actor = actor.user_id, "Product deleted");
        Ok(())
    }

    /// Receives goods. An unknown barcode is created when the request names
    /// and prices it.
    pub async fn add_stock(&self, request: StockAddRequest, actor: &Actor) -> EngineResult<DeltaOutcome> {
        let request = request.validate()?;

        let mut delta = StockDelta::new(request.barcode.as_str(), request.quantity, MovementType::In);
        if let (Some(name), Some(price)) = (request.name, request.price) {
            delta = delta.creating(NewProductFields {
                name,
                price,
                vat_rate: request.vat_rate.unwrap_or(Rate::from_bps(DEFAULT_VAT_RATE_BPS)),
                excise_rate: request
                    .excise_rate
                    .unwrap_or(Rate::from_bps(DEFAULT_EXCISE_RATE_BPS)),
                min_stock_level: request.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL),
            });
        }

        let outcome = self.ledger.apply_delta(delta, actor).await?;
        self.audit
            .record(
                actor,
                AuditAction::StockUpdate,
                format!(
                    "Stock added: {} +{} (now {})",
                    outcome.product.barcode, request.quantity, outcome.product.quantity
                ),
            )
            .await;
        info!(
            barcode = %outcome.product.barcode,
            added = request.quantity,
            quantity = outcome.product.quantity,
            created = outcome.created,
            "Stock added"
        );
        Ok(outcome)
    }
}
