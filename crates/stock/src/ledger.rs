//! Inventory ledger.
//!
//! Single adjustments and all-or-nothing batches over the products locked
//! by a [`ProductTx`]. A batch aggregates its items per product, locks the
//! products in ascending id order and validates every new quantity before
//! writing any of them, so a rejected batch leaves stock untouched.

use std::collections::BTreeMap;

use common::{ProductId, SaleItemMessage};

use crate::error::{LedgerError, Result};
use crate::product::Product;
use crate::store::ProductTx;

/// Which way a batch moves stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Remove the item quantities from stock.
    Deduct,
    /// Put the item quantities back.
    Restock,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deduct => "deduct",
            Direction::Restock => "restock",
        }
    }

    fn signed(&self, quantity: i64) -> i64 {
        match self {
            Direction::Deduct => -quantity,
            Direction::Restock => quantity,
        }
    }
}

/// The outcome of one product's adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub delta: i64,
    pub new_quantity: i64,
}

/// Computes the quantity after applying `delta`, refusing to go below zero.
pub fn apply_delta(product: &Product, delta: i64) -> Result<i64> {
    let new_quantity = product.quantity.checked_add(delta).ok_or_else(|| {
        LedgerError::Validation(format!("Adjustment of {delta} overflows product {}", product.id))
    })?;
    if new_quantity < 0 {
        return Err(LedgerError::InsufficientStock {
            product_id: product.id,
            available: product.quantity,
            requested: delta.unsigned_abs(),
        });
    }
    Ok(new_quantity)
}

/// Aggregates batch items into one signed delta per product, by ascending id.
pub fn plan_batch(items: &[SaleItemMessage], direction: Direction) -> Result<Vec<(ProductId, i64)>> {
    if items.is_empty() {
        return Err(LedgerError::Validation(
            "A stock batch needs at least one item".to_string(),
        ));
    }
    let mut totals: BTreeMap<ProductId, i64> = BTreeMap::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(LedgerError::Validation(format!(
                "Invalid quantity {} for product {} (must be positive)",
                item.quantity, item.product_id
            )));
        }
        let total = totals.entry(item.product_id).or_default();
        *total = total.checked_add(item.quantity).ok_or_else(|| {
            LedgerError::Validation(format!("Quantity overflow for product {}", item.product_id))
        })?;
    }
    Ok(totals
        .into_iter()
        .map(|(product_id, quantity)| (product_id, direction.signed(quantity)))
        .collect())
}

/// Applies a signed adjustment to one product and returns its new quantity.
///
/// A zero delta is a read of the current quantity.
#[tracing::instrument(skip(tx))]
pub async fn adjust(tx: &mut dyn ProductTx, product_id: ProductId, delta: i64) -> Result<i64> {
    let product = tx
        .lock_product(product_id)
        .await?
        .ok_or(LedgerError::ProductNotFound(product_id))?;
    let new_quantity = apply_delta(&product, delta)?;
    if delta != 0 {
        tx.set_quantity(product_id, new_quantity).await?;
        record_adjustment(if delta < 0 { "deduct" } else { "restock" });
    }
    Ok(new_quantity)
}

/// Applies every item of a batch, or none of them.
#[tracing::instrument(skip(tx, items, direction), fields(items = items.len(), direction = direction.as_str()))]
pub async fn adjust_batch(
    tx: &mut dyn ProductTx,
    items: &[SaleItemMessage],
    direction: Direction,
) -> Result<Vec<StockChange>> {
    let plan = plan_batch(items, direction)?;

    let mut changes = Vec::with_capacity(plan.len());
    for (product_id, delta) in plan {
        let product = tx
            .lock_product(product_id)
            .await?
            .ok_or(LedgerError::ProductNotFound(product_id))?;
        let new_quantity = apply_delta(&product, delta)?;
        changes.push(StockChange {
            product_id,
            delta,
            new_quantity,
        });
    }

    for change in &changes {
        tx.set_quantity(change.product_id, change.new_quantity).await?;
    }
    record_adjustment(direction.as_str());
    tracing::debug!(products = changes.len(), "Stock batch applied");
    Ok(changes)
}

fn record_adjustment(direction: &'static str) {
    metrics::counter!("stock_adjustments_total", "direction" => direction).increment(1);
}
