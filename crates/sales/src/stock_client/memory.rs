use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, ProductId};

use super::{ProductStockInfo, StockClient, StockClientError};

#[derive(Debug, Default)]
struct InMemoryStockState {
    products: HashMap<ProductId, ProductStockInfo>,
    unavailable: bool,
}

/// In-memory stock client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockClient {
    state: Arc<RwLock<InMemoryStockState>>,
}

impl InMemoryStockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn set_product(&self, product_id: ProductId, unit_price: Money, quantity_on_hand: i64) {
        self.state.write().unwrap().products.insert(
            product_id,
            ProductStockInfo {
                product_id,
                unit_price,
                quantity_on_hand,
            },
        );
    }

    /// Makes every call fail as if the service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    pub fn quantity(&self, product_id: ProductId) -> Option<i64> {
        self.state
            .read()
            .unwrap()
            .products
            .get(&product_id)
            .map(|p| p.quantity_on_hand)
    }
}

#[async_trait]
impl StockClient for InMemoryStockClient {
    async fn get_product_stock(
        &self,
        product_id: ProductId,
    ) -> Result<ProductStockInfo, StockClientError> {
        let state = self.state.read().unwrap();
        if state.unavailable {
            return Err(StockClientError::Unavailable("simulated outage".to_string()));
        }
        state
            .products
            .get(&product_id)
            .copied()
            .ok_or(StockClientError::NotFound(product_id))
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<i64, StockClientError> {
        let mut state = self.state.write().unwrap();
        if state.unavailable {
            return Err(StockClientError::Unavailable("simulated outage".to_string()));
        }
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(StockClientError::NotFound(product_id))?;
        let new_quantity = product.quantity_on_hand + delta;
        if new_quantity < 0 {
            return Err(StockClientError::InsufficientStock(product_id));
        }
        product.quantity_on_hand = new_quantity;
        Ok(new_quantity)
    }
}
