//! Synchronous client for the stock service.
//!
//! Used for the stock pre-check and price snapshot when a sale is created,
//! and for direct stock adjustments outside the saga.

mod circuit_breaker;
mod http;
mod memory;

use async_trait::async_trait;
use common::{Money, ProductId};
use thiserror::Error;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use http::{HttpStockClient, StockClientConfig};
pub use memory::InMemoryStockClient;

/// Stock-side view of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductStockInfo {
    pub product_id: ProductId,
    pub unit_price: Money,
    pub quantity_on_hand: i64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StockClientError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    /// Timeout, connection failure or server error, after retries.
    #[error("Stock service unavailable: {0}")]
    Unavailable(String),

    /// The circuit breaker rejected the call without trying.
    #[error("Stock service circuit is open")]
    CircuitOpen,
}

impl StockClientError {
    /// Returns true if the stock service is considered down.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StockClientError::Unavailable(_) | StockClientError::CircuitOpen
        )
    }
}

#[async_trait]
pub trait StockClient: Send + Sync {
    async fn get_product_stock(
        &self,
        product_id: ProductId,
    ) -> Result<ProductStockInfo, StockClientError>;

    /// Applies a signed delta and returns the new quantity on hand.
    async fn adjust_stock(&self, product_id: ProductId, delta: i64)
    -> Result<i64, StockClientError>;
}
