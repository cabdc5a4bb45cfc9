//! Product catalogue and direct stock adjustments.

use std::sync::Arc;

use common::{Page, PageRequest, ProductId};

use crate::error::{LedgerError, Result};
use crate::ledger;
use crate::product::{NewProduct, Product};
use crate::store::ProductStore;

/// Service for managing products and their stock.
#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn ProductStore>,
}

impl ProductService {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let mut tx = self.store.begin().await?;
        let product = tx.insert_product(product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, quantity = product.quantity, "Product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or(LedgerError::ProductNotFound(product_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self, request: PageRequest) -> Result<Page<Product>> {
        self.store.list_products(request).await
    }

    /// Adds `delta` to the product's quantity (negative deducts) and returns
    /// the new quantity. Fails without change if it would go below zero.
    #[tracing::instrument(skip(self))]
    pub async fn update_stock(&self, product_id: ProductId, delta: i64) -> Result<i64> {
        let mut tx = self.store.begin().await?;
        let new_quantity = ledger::adjust(&mut *tx, product_id, delta).await?;
        tx.commit().await?;

        tracing::info!(%product_id, delta, new_quantity, "Stock updated");
        Ok(new_quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryProductStore;
    use common::Money;

    fn service() -> ProductService {
        ProductService::new(Arc::new(InMemoryProductStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_get_product() {
        let service = service();
        let created = service
            .create_product(
                NewProduct::new("Widget", Money::from_cents(1999), 5).with_description("Blue"),
            )
            .await
            .unwrap();

        let fetched = service.get_product(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.unit_price.to_string(), "19.99");
    }

    #[tokio::test]
    async fn test_create_product_rejects_invalid_input() {
        let service = service();
        let result = service
            .create_product(NewProduct::new("", Money::from_cents(1), 1))
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_missing_product() {
        let service = service();
        assert!(matches!(
            service.get_product(ProductId::new(1)).await,
            Err(LedgerError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_stock_adds_and_deducts() {
        let service = service();
        let product = service
            .create_product(NewProduct::new("Widget", Money::from_cents(100), 5))
            .await
            .unwrap();

        assert_eq!(service.update_stock(product.id, 3).await.unwrap(), 8);
        assert_eq!(service.update_stock(product.id, -8).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_stock_never_goes_negative() {
        let service = service();
        let product = service
            .create_product(NewProduct::new("Widget", Money::from_cents(100), 2))
            .await
            .unwrap();

        let result = service.update_stock(product.id, -3).await;
        assert!(matches!(result, Err(LedgerError::InsufficientStock { .. })));
        assert_eq!(service.get_product(product.id).await.unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_update_stock_rejects_extreme_deltas() {
        let service = service();
        let product = service
            .create_product(NewProduct::new("Widget", Money::from_cents(100), 5))
            .await
            .unwrap();

        let result = service.update_stock(product.id, i64::MIN).await;
        assert!(matches!(result, Err(LedgerError::InsufficientStock { .. })));
        let result = service.update_stock(product.id, i64::MAX).await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert_eq!(service.get_product(product.id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_concurrent_deductions_never_oversell() {
        let service = service();
        let product = service
            .create_product(NewProduct::new("Widget", Money::from_cents(100), 10))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.update_stock(product.id, -1).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(service.get_product(product.id).await.unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_list_products_pages() {
        let service = service();
        for i in 0..5 {
            service
                .create_product(NewProduct::new(format!("P{i}"), Money::from_cents(100), 1))
                .await
                .unwrap();
        }

        let page = service
            .list_products(PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].name, "P2");
        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_previous);
        assert!(page.has_next);
    }
}
