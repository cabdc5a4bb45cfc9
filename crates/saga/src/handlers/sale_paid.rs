use std::sync::Arc;

use async_trait::async_trait;
use common::{Message, SalePaid, StockError, StockSuccess};
use messaging::{
    Envelope, HandleOutcome, HandlerError, InboxGuard, InboxRecord, MessageHandler, OutboxRecord,
    OutboxWriter,
};
use stock::{Direction, LedgerError, PaidAction, ProductStore, SaleDeduction, journal, ledger};

use super::{INSUFFICIENT_STOCK_REASON, product_not_found_reason};
use crate::error::Result;
use crate::queues::STOCK_SALE_PAID;

/// Deducts stock for a paid sale and reports the outcome.
///
/// A rejected deduction is an expected outcome, answered with `StockError`;
/// only infrastructure failures surface as handler errors.
pub struct SalePaidHandler {
    store: Arc<dyn ProductStore>,
}

impl SalePaidHandler {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    async fn process(&self, envelope: &Envelope) -> Result<HandleOutcome> {
        let message: SalePaid = envelope.decode()?;
        let sale_id = message.sale_id;

        let mut tx = self.store.begin().await?;
        if tx.already_processed(STOCK_SALE_PAID, envelope.message_id).await? {
            return Ok(HandleOutcome::Duplicate);
        }

        let entry = tx.load_deduction(sale_id).await?;
        match journal::on_sale_paid(entry.as_ref()) {
            PaidAction::Deduct => {
                match ledger::adjust_batch(&mut *tx, &message.items, Direction::Deduct).await {
                    Ok(changes) => {
                        tx.save_deduction(&SaleDeduction::deducted(sale_id, message.items.clone()))
                            .await?;
                        tx.enqueue(OutboxRecord::for_message(&StockSuccess::new(sale_id))?)
                            .await?;
                        tracing::info!(%sale_id, products = changes.len(), "Stock deducted for sale");
                    }
                    Err(e) if e.is_rejection() => {
                        let reason = match &e {
                            LedgerError::InsufficientStock { .. } => {
                                INSUFFICIENT_STOCK_REASON.to_string()
                            }
                            LedgerError::ProductNotFound(id) => product_not_found_reason(*id),
                            other => other.to_string(),
                        };
                        tx.enqueue(OutboxRecord::for_message(&StockError::new(sale_id, &reason))?)
                            .await?;
                        tracing::warn!(%sale_id, error = %e, %reason, "Stock deduction rejected");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            PaidAction::AlreadyDeducted => {
                tx.enqueue(OutboxRecord::for_message(&StockSuccess::new(sale_id))?)
                    .await?;
                tracing::info!(%sale_id, "Stock already deducted for sale");
            }
            PaidAction::Skip(state) => {
                tracing::info!(%sale_id, %state, "Sale already cancelled, nothing deducted");
            }
        }

        tx.record_processed(InboxRecord::for_envelope(STOCK_SALE_PAID, envelope))
            .await?;
        tx.commit().await?;
        Ok(HandleOutcome::Processed)
    }
}

#[async_trait]
impl MessageHandler for SalePaidHandler {
    fn name(&self) -> &'static str {
        STOCK_SALE_PAID
    }

    fn message_type(&self) -> &'static str {
        SalePaid::MESSAGE_TYPE
    }

    async fn handle(&self, envelope: &Envelope) -> std::result::Result<HandleOutcome, HandlerError> {
        Ok(self.process(envelope).await?)
    }
}
