use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::envelope::{Envelope, MessageId};
use crate::error::{MessagingError, Result};
use crate::inbox::InboxRecord;
use crate::outbox::{OutboxRecord, OutboxStatus};
use crate::transport::{Delivery, DeliveryId, MessageTransport, ParkedMessage, error_queue};

/// Outbox table kept in memory.
///
/// Embedded in the in-memory service stores, which guard it with the same
/// lock as their entity data so that records commit together with state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutbox {
    records: Vec<OutboxRecord>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: OutboxRecord) {
        self.records.push(record);
    }

    /// Returns up to `limit` pending records in insertion order.
    pub fn pending(&self, limit: usize) -> Vec<OutboxRecord> {
        self.records
            .iter()
            .filter(|r| r.is_pending())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn mark_sent(&mut self, id: MessageId, at: DateTime<Utc>) -> Result<()> {
        self.find_mut(id)?.mark_sent(at);
        Ok(())
    }

    pub fn record_failure(&mut self, id: MessageId, error: &str) -> Result<()> {
        self.find_mut(id)?.record_failure(error);
        Ok(())
    }

    /// All records, sent ones included.
    pub fn records(&self) -> &[OutboxRecord] {
        &self.records
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending)
            .count()
    }

    fn find_mut(&mut self, id: MessageId) -> Result<&mut OutboxRecord> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(MessagingError::OutboxRecordNotFound(id))
    }
}

/// Inbox table kept in memory, keyed by consumer and message id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInbox {
    records: HashMap<(String, MessageId), InboxRecord>,
}

impl InMemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, consumer: &str, message_id: MessageId) -> bool {
        self.records
            .contains_key(&(consumer.to_string(), message_id))
    }

    /// Inserts a record, rejecting a second record for the same key.
    pub fn insert(&mut self, record: InboxRecord) -> Result<()> {
        let key = (record.consumer.clone(), record.message_id);
        if self.records.contains_key(&key) {
            return Err(MessagingError::DuplicateInboxRecord {
                consumer: record.consumer,
                message_id: record.message_id,
            });
        }
        self.records.insert(key, record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Default)]
struct TransportState {
    /// message type -> bound queues
    bindings: HashMap<String, Vec<String>>,
    ready: HashMap<String, VecDeque<Delivery>>,
    in_flight: HashMap<DeliveryId, Delivery>,
    /// keyed by the consumer queue, not the error queue name
    parked: HashMap<String, Vec<ParkedMessage>>,
    next_delivery: i64,
    fail_on_publish: bool,
}

/// In-memory transport for tests and the single-process deployment.
///
/// Provides the same delivery semantics as the PostgreSQL transport except
/// durability across restarts.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<RwLock<TransportState>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail, simulating a broker outage.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    /// Number of ready messages on `queue`.
    pub async fn ready_count(&self, queue: &str) -> usize {
        self.state
            .read()
            .await
            .ready
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Number of leased, not yet settled messages across all queues.
    pub async fn in_flight_count(&self) -> usize {
        self.state.read().await.in_flight.len()
    }

    /// Removes every queued, leased and parked message. Bindings stay.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.ready.clear();
        state.in_flight.clear();
        state.parked.clear();
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn bind(&self, queue: &str, message_type: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let queues = state.bindings.entry(message_type.to_string()).or_default();
        if !queues.iter().any(|q| q == queue) {
            queues.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(&self, envelope: &Envelope) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(MessagingError::TransportUnavailable(
                "simulated publish failure".to_string(),
            ));
        }

        let queues = state
            .bindings
            .get(&envelope.message_type)
            .cloned()
            .unwrap_or_default();
        if queues.is_empty() {
            return Err(MessagingError::NoRoute(envelope.message_type.clone()));
        }

        for queue in queues {
            state.next_delivery += 1;
            let delivery = Delivery {
                id: DeliveryId::new(state.next_delivery),
                queue: queue.clone(),
                envelope: envelope.clone(),
                delivery_count: 0,
            };
            state.ready.entry(queue).or_default().push_back(delivery);
        }
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut state = self.state.write().await;
        let Some(mut delivery) = state.ready.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        delivery.delivery_count += 1;
        state.in_flight.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .in_flight
            .remove(&delivery.id)
            .map(|_| ())
            .ok_or(MessagingError::UnknownDelivery(delivery.id))
    }

    async fn release(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.write().await;
        let leased = state
            .in_flight
            .remove(&delivery.id)
            .ok_or(MessagingError::UnknownDelivery(delivery.id))?;
        state
            .ready
            .entry(leased.queue.clone())
            .or_default()
            .push_front(leased);
        Ok(())
    }

    async fn park(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let leased = state
            .in_flight
            .remove(&delivery.id)
            .ok_or(MessagingError::UnknownDelivery(delivery.id))?;
        tracing::warn!(
            queue = %leased.queue,
            error_queue = %error_queue(&leased.queue),
            message_id = %leased.envelope.message_id,
            reason,
            "Message parked"
        );
        state
            .parked
            .entry(leased.queue.clone())
            .or_default()
            .push(ParkedMessage {
                id: leased.id,
                queue: leased.queue,
                envelope: leased.envelope,
                reason: reason.to_string(),
                parked_at: Utc::now(),
            });
        Ok(())
    }

    async fn parked(&self, queue: &str) -> Result<Vec<ParkedMessage>> {
        Ok(self
            .state
            .read()
            .await
            .parked
            .get(queue)
            .cloned()
            .unwrap_or_default())
    }

    async fn redrive(&self, queue: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let parked = state.parked.remove(queue).unwrap_or_default();
        let count = parked.len();
        let ready = state.ready.entry(queue.to_string()).or_default();
        for message in parked {
            ready.push_back(Delivery {
                id: message.id,
                queue: message.queue,
                envelope: message.envelope,
                delivery_count: 0,
            });
        }
        Ok(count)
    }
}
