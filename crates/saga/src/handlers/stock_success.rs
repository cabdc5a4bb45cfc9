use std::sync::Arc;

use async_trait::async_trait;
use common::{Message, StockSuccess};
use messaging::{Envelope, HandleOutcome, HandlerError, InboxGuard, InboxRecord, MessageHandler};
use sales::SaleStore;

use crate::error::Result;
use crate::queues::SALES_STOCK_SUCCESS;

/// Records that stock was deducted for a paid sale. The sale stays `Paid`.
pub struct StockSuccessHandler {
    store: Arc<dyn SaleStore>,
}

impl StockSuccessHandler {
    pub fn new(store: Arc<dyn SaleStore>) -> Self {
        Self { store }
    }

    async fn process(&self, envelope: &Envelope) -> Result<HandleOutcome> {
        let message: StockSuccess = envelope.decode()?;
        let sale_id = message.sale_id;

        let mut tx = self.store.begin().await?;
        if tx
            .already_processed(SALES_STOCK_SUCCESS, envelope.message_id)
            .await?
        {
            return Ok(HandleOutcome::Duplicate);
        }

        match tx.load_sale(sale_id).await? {
            Some(sale) => tracing::info!(
                %sale_id,
                status = %sale.status(),
                processed_at = %message.processed_at,
                "Stock confirmed for sale"
            ),
            None => tracing::warn!(%sale_id, "Stock confirmed for unknown sale"),
        }

        tx.record_processed(InboxRecord::for_envelope(SALES_STOCK_SUCCESS, envelope))
            .await?;
        tx.commit().await?;
        Ok(HandleOutcome::Processed)
    }
}

#[async_trait]
impl MessageHandler for StockSuccessHandler {
    fn name(&self) -> &'static str {
        SALES_STOCK_SUCCESS
    }

    fn message_type(&self) -> &'static str {
        StockSuccess::MESSAGE_TYPE
    }

    async fn handle(&self, envelope: &Envelope) -> std::result::Result<HandleOutcome, HandlerError> {
        Ok(self.process(envelope).await?)
    }
}
