use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Page, PageRequest, ProductId, SaleId};
use messaging::{
    InMemoryInbox, InMemoryOutbox, InboxGuard, InboxRecord, MessageId, OutboxRecord,
    OutboxSource, OutboxWriter,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ProductStore, ProductTx};
use crate::error::{LedgerError, Result};
use crate::journal::SaleDeduction;
use crate::product::{NewProduct, Product};

#[derive(Default)]
struct StockState {
    products: BTreeMap<ProductId, Product>,
    next_id: i64,
    deductions: HashMap<SaleId, SaleDeduction>,
    outbox: InMemoryOutbox,
    inbox: InMemoryInbox,
}

/// In-memory product store.
///
/// A transaction holds the whole store's lock from `begin` to commit or
/// drop, which serializes writers the way row locks do for a single product.
#[derive(Clone, Default)]
pub struct InMemoryProductStore {
    state: Arc<Mutex<StockState>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every outbox record, sent ones included.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.lock().await.outbox.records().to_vec()
    }

    pub async fn deduction(&self, sale_id: SaleId) -> Option<SaleDeduction> {
        self.state.lock().await.deductions.get(&sale_id).cloned()
    }

    pub async fn inbox_count(&self) -> usize {
        self.state.lock().await.inbox.len()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn begin(&self) -> Result<Box<dyn ProductTx>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryProductTx {
            guard,
            products: BTreeMap::new(),
            next_id: None,
            deductions: HashMap::new(),
            outbox: Vec::new(),
            inbox: Vec::new(),
        }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self, request: PageRequest) -> Result<Page<Product>> {
        let state = self.state.lock().await;
        let items = state
            .products
            .values()
            .skip(request.offset() as usize)
            .take(request.page_size() as usize)
            .cloned()
            .collect();
        Ok(Page::new(items, request, state.products.len() as u64))
    }

    fn outbox_source(&self) -> Arc<dyn OutboxSource> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl OutboxSource for InMemoryProductStore {
    async fn fetch_pending(&self, limit: usize) -> messaging::Result<Vec<OutboxRecord>> {
        Ok(self.state.lock().await.outbox.pending(limit))
    }

    async fn mark_sent(&self, id: MessageId, sent_at: DateTime<Utc>) -> messaging::Result<()> {
        self.state.lock().await.outbox.mark_sent(id, sent_at)
    }

    async fn record_failure(&self, id: MessageId, error: &str) -> messaging::Result<()> {
        self.state.lock().await.outbox.record_failure(id, error)
    }
}

struct InMemoryProductTx {
    guard: OwnedMutexGuard<StockState>,
    /// Staged product rows, inserted or updated.
    products: BTreeMap<ProductId, Product>,
    next_id: Option<i64>,
    deductions: HashMap<SaleId, SaleDeduction>,
    outbox: Vec<OutboxRecord>,
    inbox: Vec<InboxRecord>,
}

impl InMemoryProductTx {
    fn read_product(&self, id: ProductId) -> Option<Product> {
        self.products
            .get(&id)
            .or_else(|| self.guard.products.get(&id))
            .cloned()
    }
}

#[async_trait]
impl ProductTx for InMemoryProductTx {
    async fn insert_product(&mut self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let next = self.next_id.unwrap_or(self.guard.next_id) + 1;
        self.next_id = Some(next);
        let product = product.into_product(ProductId::new(next));
        self.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.read_product(id))
    }

    async fn set_quantity(&mut self, id: ProductId, quantity: i64) -> Result<()> {
        if quantity < 0 {
            return Err(LedgerError::Validation(format!(
                "Quantity of product {id} cannot become negative"
            )));
        }
        let mut product = self
            .read_product(id)
            .ok_or(LedgerError::ProductNotFound(id))?;
        product.quantity = quantity;
        self.products.insert(id, product);
        Ok(())
    }

    async fn load_deduction(&mut self, sale_id: SaleId) -> Result<Option<SaleDeduction>> {
        Ok(self
            .deductions
            .get(&sale_id)
            .or_else(|| self.guard.deductions.get(&sale_id))
            .cloned())
    }

    async fn save_deduction(&mut self, deduction: &SaleDeduction) -> Result<()> {
        self.deductions.insert(deduction.sale_id, deduction.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryProductTx {
            mut guard,
            products,
            next_id,
            deductions,
            outbox,
            inbox,
        } = *self;

        for record in &inbox {
            if guard.inbox.contains(&record.consumer, record.message_id) {
                return Err(messaging::MessagingError::DuplicateInboxRecord {
                    consumer: record.consumer.clone(),
                    message_id: record.message_id,
                }
                .into());
            }
        }

        if let Some(next_id) = next_id {
            guard.next_id = next_id;
        }
        guard.products.extend(products);
        guard.deductions.extend(deductions);
        for record in outbox {
            guard.outbox.push(record);
        }
        for record in inbox {
            guard.inbox.insert(record)?;
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxWriter for InMemoryProductTx {
    async fn enqueue(&mut self, record: OutboxRecord) -> messaging::Result<()> {
        self.outbox.push(record);
        Ok(())
    }
}

#[async_trait]
impl InboxGuard for InMemoryProductTx {
    async fn already_processed(
        &mut self,
        consumer: &str,
        message_id: MessageId,
    ) -> messaging::Result<bool> {
        let staged = self
            .inbox
            .iter()
            .any(|r| r.consumer == consumer && r.message_id == message_id);
        Ok(staged || self.guard.inbox.contains(consumer, message_id))
    }

    async fn record_processed(&mut self, record: InboxRecord) -> messaging::Result<()> {
        self.inbox.push(record);
        Ok(())
    }
}
