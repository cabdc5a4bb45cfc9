use std::sync::Arc;

use async_trait::async_trait;
use common::{Message, SaleCancelled};
use messaging::{Envelope, HandleOutcome, HandlerError, InboxGuard, InboxRecord, MessageHandler};
use stock::{CancelAction, Direction, ProductStore, SaleDeduction, journal, ledger};

use crate::error::{Result, SagaError};
use crate::queues::STOCK_SALE_CANCELLED;

/// Returns the stock a cancelled sale had deducted.
///
/// The journal decides what to return: only a recorded deduction, and only
/// once. A cancellation that arrives first voids the sale instead.
pub struct SaleCancelledHandler {
    store: Arc<dyn ProductStore>,
}

impl SaleCancelledHandler {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    async fn process(&self, envelope: &Envelope) -> Result<HandleOutcome> {
        let message: SaleCancelled = envelope.decode()?;
        let sale_id = message.sale_id;

        let mut tx = self.store.begin().await?;
        if tx
            .already_processed(STOCK_SALE_CANCELLED, envelope.message_id)
            .await?
        {
            return Ok(HandleOutcome::Duplicate);
        }

        let entry = tx.load_deduction(sale_id).await?;
        match journal::on_sale_cancelled(entry.as_ref()) {
            CancelAction::Restock(items) => {
                match ledger::adjust_batch(&mut *tx, &items, Direction::Restock).await {
                    Ok(_) => {}
                    Err(e) if e.is_rejection() => {
                        tracing::error!(%sale_id, error = %e, "Compensation failure: stock could not be returned");
                        return Err(SagaError::CompensationFailure {
                            sale_id,
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
                if let Some(mut entry) = entry {
                    entry.mark_returned();
                    tx.save_deduction(&entry).await?;
                }
                metrics::counter!("saga_compensations_total", "step" => "restock").increment(1);
                tracing::info!(%sale_id, items = items.len(), "Stock returned for cancelled sale");
            }
            CancelAction::Void => {
                tx.save_deduction(&SaleDeduction::voided(sale_id, message.items))
                    .await?;
                tracing::info!(%sale_id, "Sale cancelled before deduction, voided");
            }
            CancelAction::Nothing(state) => {
                tracing::info!(%sale_id, %state, "Nothing to return for cancelled sale");
            }
        }

        tx.record_processed(InboxRecord::for_envelope(STOCK_SALE_CANCELLED, envelope))
            .await?;
        tx.commit().await?;
        Ok(HandleOutcome::Processed)
    }
}

#[async_trait]
impl MessageHandler for SaleCancelledHandler {
    fn name(&self) -> &'static str {
        STOCK_SALE_CANCELLED
    }

    fn message_type(&self) -> &'static str {
        SaleCancelled::MESSAGE_TYPE
    }

    async fn handle(&self, envelope: &Envelope) -> std::result::Result<HandleOutcome, HandlerError> {
        Ok(self.process(envelope).await?)
    }
}
