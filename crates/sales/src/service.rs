//! Sale service: creation, queries and the transitions that need no saga step.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Page, PageRequest, ProductId, SaleId};

use crate::commands::CreateSale;
use crate::error::{Result, SaleError};
use crate::sale::Sale;
use crate::stock_client::{StockClient, StockClientError};
use crate::store::SaleStore;

/// Service for managing sales.
///
/// Payment and cancellation also drive stock through messages and live in
/// the saga coordinator; everything else is here.
#[derive(Clone)]
pub struct SaleService {
    store: Arc<dyn SaleStore>,
    stock: Arc<dyn StockClient>,
}

impl SaleService {
    pub fn new(store: Arc<dyn SaleStore>, stock: Arc<dyn StockClient>) -> Self {
        Self { store, stock }
    }

    pub fn store(&self) -> &Arc<dyn SaleStore> {
        &self.store
    }

    /// Creates a sale in `PendingPayment`.
    ///
    /// Every product is checked against the stock service, which also
    /// supplies the unit price snapshot. Nothing is reserved: stock is only
    /// deducted once the sale is paid.
    #[tracing::instrument(skip(self))]
    pub async fn create_sale(&self, cmd: CreateSale) -> Result<Sale> {
        let mut sale = self.prepare_sale(cmd).await?;

        let mut tx = self.store.begin().await?;
        let sale_id = tx.insert_sale(&mut sale).await?;
        tx.commit().await?;

        metrics::counter!("sales_created_total").increment(1);
        tracing::info!(%sale_id, total = %sale.total(), "Sale created");
        Ok(sale)
    }

    /// Validates a sale request and builds the unsaved sale with its price
    /// snapshot. Nothing is written.
    pub async fn prepare_sale(&self, cmd: CreateSale) -> Result<Sale> {
        if cmd.items.is_empty() {
            return Err(SaleError::Validation(
                "A sale needs at least one item".to_string(),
            ));
        }
        if let Some(item) = cmd.items.iter().find(|item| item.quantity <= 0) {
            return Err(SaleError::Validation(format!(
                "Invalid quantity {} for product {} (must be greater than 0)",
                item.quantity, item.product_id
            )));
        }

        let mut requested: BTreeMap<ProductId, i64> = BTreeMap::new();
        for item in &cmd.items {
            let total = requested.entry(item.product_id).or_default();
            *total = total.checked_add(item.quantity).ok_or_else(|| {
                SaleError::Validation(format!("Quantity overflow for product {}", item.product_id))
            })?;
        }

        let mut prices = BTreeMap::new();
        for (&product_id, &quantity) in &requested {
            let info = self
                .stock
                .get_product_stock(product_id)
                .await
                .map_err(|e| match e {
                    StockClientError::NotFound(id) => SaleError::ProductNotFound(id),
                    other => SaleError::StockClient(other),
                })?;
            if info.quantity_on_hand < quantity {
                return Err(SaleError::Validation(format!(
                    "Insufficient stock for product {product_id}: requested {quantity}, available {}",
                    info.quantity_on_hand
                )));
            }
            prices.insert(product_id, info.unit_price);
        }

        let mut sale = Sale::new(cmd.customer_id);
        for item in &cmd.items {
            let unit_price = prices[&item.product_id];
            sale.add_item(item.product_id, item.quantity, unit_price)?;
        }
        Ok(sale)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_sale(&self, sale_id: SaleId) -> Result<Sale> {
        self.store
            .get_sale(sale_id)
            .await?
            .ok_or(SaleError::NotFound(sale_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_sales(&self, request: PageRequest) -> Result<Page<Sale>> {
        self.store.list_sales(request).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_shipped(&self, sale_id: SaleId) -> Result<Sale> {
        self.transition(sale_id, Sale::mark_shipped).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_completed(&self, sale_id: SaleId) -> Result<Sale> {
        self.transition(sale_id, Sale::mark_completed).await
    }

    async fn transition(
        &self,
        sale_id: SaleId,
        apply: fn(&mut Sale) -> Result<()>,
    ) -> Result<Sale> {
        let mut tx = self.store.begin().await?;
        let mut sale = tx
            .load_sale(sale_id)
            .await?
            .ok_or(SaleError::NotFound(sale_id))?;

        apply(&mut sale)?;
        tx.update_sale(&mut sale).await?;
        tx.commit().await?;

        tracing::info!(%sale_id, status = %sale.status(), "Sale status changed");
        Ok(sale)
    }
}
