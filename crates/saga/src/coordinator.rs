//! Saga coordinator: the sales-side triggers of the fulfillment saga.
//!
//! Every trigger commits the sale change and the message announcing it in
//! one store transaction; the outbox relay delivers the message later.

use common::{Page, PageRequest, SaleCancelled, SaleId, SalePaid};
use messaging::{OutboxRecord, OutboxWriter};
use sales::{CreateSale, Sale, SaleError, SaleService, SaleStatus};

use crate::error::{Result, SagaError};

/// Drives the sales side of the fulfillment saga.
#[derive(Clone)]
pub struct SagaCoordinator {
    sales: SaleService,
}

impl SagaCoordinator {
    pub fn new(sales: SaleService) -> Self {
        Self { sales }
    }

    pub fn sales(&self) -> &SaleService {
        &self.sales
    }

    /// Creates a sale directly in `initial_status`.
    ///
    /// `Paid` and `Shipped` insert the sale at that status together with its
    /// `SalePaid` message, in one transaction. `Completed` and `Cancelled`
    /// cannot be requested at creation.
    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn create_sale(&self, cmd: CreateSale, initial_status: SaleStatus) -> Result<Sale> {
        if initial_status == SaleStatus::PendingPayment {
            return Ok(self.sales.create_sale(cmd).await?);
        }
        if matches!(initial_status, SaleStatus::Completed | SaleStatus::Cancelled) {
            return Err(SagaError::Validation(format!(
                "A sale cannot be created as {initial_status}"
            )));
        }

        let mut sale = self.sales.prepare_sale(cmd).await?;
        sale.mark_paid()?;
        if initial_status == SaleStatus::Shipped {
            sale.mark_shipped()?;
        }

        let mut tx = self.sales.store().begin().await?;
        let sale_id = tx.insert_sale(&mut sale).await?;
        tx.enqueue(OutboxRecord::for_message(&SalePaid::new(
            sale_id,
            sale.item_messages(),
        ))?)
        .await?;
        tx.commit().await?;

        metrics::counter!("sales_created_total").increment(1);
        metrics::counter!("saga_sales_paid_total").increment(1);
        tracing::info!(%sale_id, status = %sale.status(), "Sale created, stock deduction requested");
        Ok(sale)
    }

    pub async fn get_sale(&self, sale_id: SaleId) -> Result<Sale> {
        Ok(self.sales.get_sale(sale_id).await?)
    }

    pub async fn list_sales(&self, request: PageRequest) -> Result<Page<Sale>> {
        Ok(self.sales.list_sales(request).await?)
    }

    /// Marks a pending sale paid and publishes `SalePaid` with its items.
    #[tracing::instrument(skip(self))]
    pub async fn mark_paid(&self, sale_id: SaleId) -> Result<Sale> {
        let mut tx = self.sales.store().begin().await?;
        let mut sale = tx
            .load_sale(sale_id)
            .await?
            .ok_or(SaleError::NotFound(sale_id))?;

        sale.mark_paid()?;
        tx.update_sale(&mut sale).await?;
        tx.enqueue(OutboxRecord::for_message(&SalePaid::new(
            sale_id,
            sale.item_messages(),
        ))?)
        .await?;
        tx.commit().await?;

        metrics::counter!("saga_sales_paid_total").increment(1);
        tracing::info!(%sale_id, items = sale.items().len(), "Sale paid, stock deduction requested");
        Ok(sale)
    }

    /// Cancels a sale. If it was already paid, publishes `SaleCancelled` so
    /// the stock service returns whatever it deducted.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_sale(&self, sale_id: SaleId) -> Result<Sale> {
        let mut tx = self.sales.store().begin().await?;
        let mut sale = tx
            .load_sale(sale_id)
            .await?
            .ok_or(SaleError::NotFound(sale_id))?;

        let previous = sale.cancel()?;
        tx.update_sale(&mut sale).await?;
        let compensate = previous != SaleStatus::PendingPayment;
        if compensate {
            tx.enqueue(OutboxRecord::for_message(&SaleCancelled::new(
                sale_id,
                sale.item_messages(),
            ))?)
            .await?;
        }
        tx.commit().await?;

        metrics::counter!("saga_sales_cancelled_total").increment(1);
        tracing::info!(%sale_id, %previous, compensate, "Sale cancelled");
        Ok(sale)
    }

    /// Generic status update: the target must be strictly ahead of the
    /// current status and cannot be `Cancelled`.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, sale_id: SaleId, target: SaleStatus) -> Result<Sale> {
        let sale = self.sales.get_sale(sale_id).await?;
        sale.validate_status_change(target)?;

        match target {
            SaleStatus::Paid => self.mark_paid(sale_id).await,
            SaleStatus::Shipped => Ok(self.sales.mark_shipped(sale_id).await?),
            SaleStatus::Completed => Ok(self.sales.mark_completed(sale_id).await?),
            SaleStatus::PendingPayment | SaleStatus::Cancelled => Err(SagaError::Validation(
                format!("Status {target} cannot be requested"),
            )),
        }
    }
}
