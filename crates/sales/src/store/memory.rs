use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Page, PageRequest, SaleId, Version};
use messaging::{
    InMemoryInbox, InMemoryOutbox, InboxGuard, InboxRecord, MessageId, OutboxRecord,
    OutboxSource, OutboxWriter,
};
use tokio::sync::RwLock;

use super::{SaleStore, SaleTx};
use crate::error::{Result, SaleError};
use crate::sale::Sale;

#[derive(Default)]
struct SalesState {
    sales: BTreeMap<SaleId, Sale>,
    next_id: i64,
    outbox: InMemoryOutbox,
    inbox: InMemoryInbox,
}

/// In-memory sale store.
///
/// Transactions are optimistic: they stage writes and validate every
/// updated sale's version at commit, like the PostgreSQL store's
/// conditional update.
#[derive(Clone, Default)]
pub struct InMemorySaleStore {
    state: Arc<RwLock<SalesState>>,
}

impl InMemorySaleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sales.
    pub async fn sale_count(&self) -> usize {
        self.state.read().await.sales.len()
    }

    /// Returns every outbox record, sent ones included.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.read().await.outbox.records().to_vec()
    }

    pub async fn inbox_count(&self) -> usize {
        self.state.read().await.inbox.len()
    }
}

#[async_trait]
impl SaleStore for InMemorySaleStore {
    async fn begin(&self) -> Result<Box<dyn SaleTx>> {
        Ok(Box::new(InMemorySaleTx {
            state: self.state.clone(),
            inserts: Vec::new(),
            updates: Vec::new(),
            outbox: Vec::new(),
            inbox: Vec::new(),
        }))
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>> {
        Ok(self.state.read().await.sales.get(&id).cloned())
    }

    async fn list_sales(&self, request: PageRequest) -> Result<Page<Sale>> {
        let state = self.state.read().await;
        let items = state
            .sales
            .values()
            .skip(request.offset() as usize)
            .take(request.page_size() as usize)
            .cloned()
            .collect();
        Ok(Page::new(items, request, state.sales.len() as u64))
    }

    fn outbox_source(&self) -> Arc<dyn OutboxSource> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl OutboxSource for InMemorySaleStore {
    async fn fetch_pending(&self, limit: usize) -> messaging::Result<Vec<OutboxRecord>> {
        Ok(self.state.read().await.outbox.pending(limit))
    }

    async fn mark_sent(&self, id: MessageId, sent_at: DateTime<Utc>) -> messaging::Result<()> {
        self.state.write().await.outbox.mark_sent(id, sent_at)
    }

    async fn record_failure(&self, id: MessageId, error: &str) -> messaging::Result<()> {
        self.state.write().await.outbox.record_failure(id, error)
    }
}

struct InMemorySaleTx {
    state: Arc<RwLock<SalesState>>,
    inserts: Vec<Sale>,
    /// (new state, version read)
    updates: Vec<(Sale, Version)>,
    outbox: Vec<OutboxRecord>,
    inbox: Vec<InboxRecord>,
}

#[async_trait]
impl SaleTx for InMemorySaleTx {
    async fn load_sale(&mut self, id: SaleId) -> Result<Option<Sale>> {
        if let Some(sale) = self.inserts.iter().find(|s| s.id() == Some(id)) {
            return Ok(Some(sale.clone()));
        }
        if let Some((sale, _)) = self.updates.iter().find(|(s, _)| s.id() == Some(id)) {
            return Ok(Some(sale.clone()));
        }
        Ok(self.state.read().await.sales.get(&id).cloned())
    }

    async fn insert_sale(&mut self, sale: &mut Sale) -> Result<SaleId> {
        let id = {
            let mut state = self.state.write().await;
            state.next_id += 1;
            SaleId::new(state.next_id)
        };
        sale.assign_id(id);
        sale.set_version(Version::first());
        self.inserts.push(sale.clone());
        Ok(id)
    }

    async fn update_sale(&mut self, sale: &mut Sale) -> Result<()> {
        let id = sale
            .id()
            .ok_or_else(|| SaleError::Validation("Cannot update an unsaved sale".to_string()))?;
        let read_version = sale.version();
        sale.set_version(read_version.next());

        if let Some(staged) = self.inserts.iter_mut().find(|s| s.id() == Some(id)) {
            *staged = sale.clone();
        } else if let Some((staged, _)) = self.updates.iter_mut().find(|(s, _)| s.id() == Some(id)) {
            *staged = sale.clone();
        } else {
            self.updates.push((sale.clone(), read_version));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemorySaleTx {
            state: shared,
            inserts,
            updates,
            outbox,
            inbox,
        } = *self;
        let mut state = shared.write().await;

        for (sale, read_version) in &updates {
            let Some(id) = sale.id() else { continue };
            let current = state.sales.get(&id).map(Sale::version);
            if current != Some(*read_version) {
                return Err(SaleError::ConcurrencyConflict {
                    sale_id: id,
                    expected: *read_version,
                });
            }
        }
        for record in &inbox {
            if state.inbox.contains(&record.consumer, record.message_id) {
                return Err(messaging::MessagingError::DuplicateInboxRecord {
                    consumer: record.consumer.clone(),
                    message_id: record.message_id,
                }
                .into());
            }
        }

        for sale in inserts.into_iter().chain(updates.into_iter().map(|(s, _)| s)) {
            if let Some(id) = sale.id() {
                state.sales.insert(id, sale);
            }
        }
        for record in outbox {
            state.outbox.push(record);
        }
        for record in inbox {
            state.inbox.insert(record)?;
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxWriter for InMemorySaleTx {
    async fn enqueue(&mut self, record: OutboxRecord) -> messaging::Result<()> {
        self.outbox.push(record);
        Ok(())
    }
}

#[async_trait]
impl InboxGuard for InMemorySaleTx {
    async fn already_processed(
        &mut self,
        consumer: &str,
        message_id: MessageId,
    ) -> messaging::Result<bool> {
        if self
            .inbox
            .iter()
            .any(|r| r.consumer == consumer && r.message_id == message_id)
        {
            return Ok(true);
        }
        Ok(self.state.read().await.inbox.contains(consumer, message_id))
    }

    async fn record_processed(&mut self, record: InboxRecord) -> messaging::Result<()> {
        self.inbox.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::{CustomerId, Money, ProductId, SaleId, StockSuccess};
    use messaging::Envelope;

    use super::*;
    use crate::sale::SaleStatus;

    fn new_sale() -> Sale {
        let mut sale = Sale::new(CustomerId::new(1));
        sale.add_item(ProductId::new(1), 2, Money::from_cents(500))
            .unwrap();
        sale
    }

    async fn insert(store: &InMemorySaleStore) -> Sale {
        let mut sale = new_sale();
        let mut tx = store.begin().await.unwrap();
        tx.insert_sale(&mut sale).await.unwrap();
        tx.commit().await.unwrap();
        sale
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = InMemorySaleStore::new();
        let first = insert(&store).await;
        let second = insert(&store).await;

        assert_eq!(first.id(), Some(SaleId::new(1)));
        assert_eq!(second.id(), Some(SaleId::new(2)));
        assert_eq!(first.version(), Version::first());
        assert_eq!(store.sale_count().await, 2);
    }

    #[tokio::test]
    async fn dropped_transaction_writes_nothing() {
        let store = InMemorySaleStore::new();
        let mut sale = new_sale();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_sale(&mut sale).await.unwrap();
            tx.enqueue(OutboxRecord::for_message(&StockSuccess::new(SaleId::new(1))).unwrap())
                .await
                .unwrap();
        }
        assert_eq!(store.sale_count().await, 0);
        assert!(store.outbox_records().await.is_empty());
    }

    #[tokio::test]
    async fn update_bumps_version_and_is_visible_inside_tx() {
        let store = InMemorySaleStore::new();
        let sale = insert(&store).await;
        let id = sale.id().unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut loaded = tx.load_sale(id).await.unwrap().unwrap();
        loaded.mark_paid().unwrap();
        tx.update_sale(&mut loaded).await.unwrap();
        assert_eq!(loaded.version(), Version::new(2));
        assert_eq!(
            tx.load_sale(id).await.unwrap().unwrap().status(),
            SaleStatus::Paid
        );
        tx.commit().await.unwrap();

        let stored = store.get_sale(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), SaleStatus::Paid);
        assert_eq!(stored.version(), Version::new(2));
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = InMemorySaleStore::new();
        let id = insert(&store).await.id().unwrap();

        let mut tx_a = store.begin().await.unwrap();
        let mut tx_b = store.begin().await.unwrap();
        let mut a = tx_a.load_sale(id).await.unwrap().unwrap();
        let mut b = tx_b.load_sale(id).await.unwrap().unwrap();

        a.mark_paid().unwrap();
        tx_a.update_sale(&mut a).await.unwrap();
        tx_a.commit().await.unwrap();

        b.cancel().unwrap();
        tx_b.update_sale(&mut b).await.unwrap();
        let result = tx_b.commit().await;
        assert!(matches!(result, Err(SaleError::ConcurrencyConflict { .. })));

        let stored = store.get_sale(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), SaleStatus::Paid);
    }

    #[tokio::test]
    async fn outbox_and_inbox_commit_with_the_sale() {
        let store = InMemorySaleStore::new();
        let id = insert(&store).await.id().unwrap();
        let envelope = Envelope::for_message(&StockSuccess::new(id)).unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.already_processed("c", envelope.message_id).await.unwrap());
        tx.record_processed(InboxRecord::for_envelope("c", &envelope))
            .await
            .unwrap();
        assert!(tx.already_processed("c", envelope.message_id).await.unwrap());
        tx.enqueue(OutboxRecord::for_message(&StockSuccess::new(id)).unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.inbox_count().await, 1);
        assert_eq!(store.fetch_pending(10).await.unwrap().len(), 1);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.already_processed("c", envelope.message_id).await.unwrap());
    }

    #[tokio::test]
    async fn list_sales_pages_by_id() {
        let store = InMemorySaleStore::new();
        for _ in 0..5 {
            insert(&store).await;
        }

        let page = store.list_sales(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.total_pages, 3);
        let ids: Vec<_> = page.items.iter().filter_map(Sale::id).collect();
        assert_eq!(ids, vec![SaleId::new(3), SaleId::new(4)]);
    }
}
