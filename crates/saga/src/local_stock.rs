//! In-process stock client for the single-process deployment.

use async_trait::async_trait;
use common::ProductId;
use sales::{ProductStockInfo, StockClient, StockClientError};
use stock::{LedgerError, ProductService};

/// Serves the sales service's stock queries straight from a [`ProductService`].
#[derive(Clone)]
pub struct LocalStockClient {
    products: ProductService,
}

impl LocalStockClient {
    pub fn new(products: ProductService) -> Self {
        Self { products }
    }
}

fn to_client_error(error: LedgerError) -> StockClientError {
    match error {
        LedgerError::ProductNotFound(id) => StockClientError::NotFound(id),
        LedgerError::InsufficientStock { product_id, .. } => {
            StockClientError::InsufficientStock(product_id)
        }
        other => StockClientError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl StockClient for LocalStockClient {
    async fn get_product_stock(
        &self,
        product_id: ProductId,
    ) -> Result<ProductStockInfo, StockClientError> {
        let product = self
            .products
            .get_product(product_id)
            .await
            .map_err(to_client_error)?;
        Ok(ProductStockInfo {
            product_id: product.id,
            unit_price: product.unit_price,
            quantity_on_hand: product.quantity,
        })
    }

    async fn adjust_stock(
        &self,
        product_id: ProductId,
        delta: i64,
    ) -> Result<i64, StockClientError> {
        self.products
            .update_stock(product_id, delta)
            .await
            .map_err(to_client_error)
    }
}
