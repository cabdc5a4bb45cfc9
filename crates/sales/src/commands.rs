//! Sale commands.

use common::{CustomerId, ProductId};
use serde::Deserialize;

/// A requested line item; the price is looked up, not supplied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl SaleItemRequest {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Command to create a new sale.
#[derive(Debug, Clone)]
pub struct CreateSale {
    pub customer_id: CustomerId,
    pub items: Vec<SaleItemRequest>,
}

impl CreateSale {
    pub fn new(customer_id: CustomerId, items: Vec<SaleItemRequest>) -> Self {
        Self { customer_id, items }
    }

    /// Adds an item.
    pub fn with_item(mut self, product_id: ProductId, quantity: i64) -> Self {
        self.items.push(SaleItemRequest::new(product_id, quantity));
        self
    }
}
