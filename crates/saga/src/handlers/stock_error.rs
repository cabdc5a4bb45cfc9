use std::sync::Arc;

use async_trait::async_trait;
use common::{Message, StockError};
use messaging::{Envelope, HandleOutcome, HandlerError, InboxGuard, InboxRecord, MessageHandler};
use sales::{SaleError, SaleStatus, SaleStore};

use crate::error::{Result, SagaError};
use crate::queues::SALES_STOCK_ERROR;

/// Compensates a rejected stock deduction by cancelling the sale.
///
/// An unknown sale, or one that already shipped, cannot be compensated:
/// the message fails permanently and is parked for an operator.
pub struct StockErrorHandler {
    store: Arc<dyn SaleStore>,
}

impl StockErrorHandler {
    pub fn new(store: Arc<dyn SaleStore>) -> Self {
        Self { store }
    }

    async fn process(&self, envelope: &Envelope) -> Result<HandleOutcome> {
        let message: StockError = envelope.decode()?;
        let sale_id = message.sale_id;

        let mut tx = self.store.begin().await?;
        if tx
            .already_processed(SALES_STOCK_ERROR, envelope.message_id)
            .await?
        {
            return Ok(HandleOutcome::Duplicate);
        }

        let Some(mut sale) = tx.load_sale(sale_id).await? else {
            tracing::error!(%sale_id, reason = %message.reason, "Compensation failure: sale not found");
            return Err(SagaError::CompensationFailure {
                sale_id,
                reason: "sale not found".to_string(),
            });
        };

        if sale.status() == SaleStatus::Cancelled {
            tracing::info!(%sale_id, "Sale already cancelled");
        } else {
            match sale.cancel() {
                Ok(previous) => {
                    tx.update_sale(&mut sale).await?;
                    metrics::counter!("saga_compensations_total", "step" => "cancel_sale")
                        .increment(1);
                    tracing::warn!(
                        %sale_id,
                        %previous,
                        reason = %message.reason,
                        "Sale cancelled after stock rejection"
                    );
                }
                Err(SaleError::InvalidState { current, .. }) => {
                    tracing::error!(%sale_id, %current, "Compensation failure: sale can no longer be cancelled");
                    return Err(SagaError::CompensationFailure {
                        sale_id,
                        reason: format!("sale is {current}"),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.record_processed(InboxRecord::for_envelope(SALES_STOCK_ERROR, envelope))
            .await?;
        tx.commit().await?;
        Ok(HandleOutcome::Processed)
    }
}

#[async_trait]
impl MessageHandler for StockErrorHandler {
    fn name(&self) -> &'static str {
        SALES_STOCK_ERROR
    }

    fn message_type(&self) -> &'static str {
        StockError::MESSAGE_TYPE
    }

    async fn handle(&self, envelope: &Envelope) -> std::result::Result<HandleOutcome, HandlerError> {
        Ok(self.process(envelope).await?)
    }
}
