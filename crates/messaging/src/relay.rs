//! Outbox relay: forwards committed outbox records to the transport.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::error::Result;
use crate::outbox::OutboxSource;
use crate::transport::MessageTransport;

/// Configuration for an [`OutboxRelay`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum number of records forwarded per tick.
    pub batch_size: usize,
    /// Wait between ticks.
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Moves outbox records from `Pending` to `Sent`.
///
/// A record is marked sent only after the transport accepted it. When a
/// publish fails the record stays pending with the error recorded, the rest
/// of the batch is left for the next tick (keeping per-outbox order), and
/// the relay keeps retrying for as long as it runs.
pub struct OutboxRelay {
    name: String,
    outbox: Arc<dyn OutboxSource>,
    transport: Arc<dyn MessageTransport>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(
        name: impl Into<String>,
        outbox: Arc<dyn OutboxSource>,
        transport: Arc<dyn MessageTransport>,
        config: RelayConfig,
    ) -> Self {
        Self {
            name: name.into(),
            outbox,
            transport,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forwards one batch. Returns the number of records sent.
    #[tracing::instrument(skip(self), fields(relay = %self.name))]
    pub async fn run_once(&self) -> Result<usize> {
        let pending = self.outbox.fetch_pending(self.config.batch_size).await?;
        let mut sent = 0;

        for record in pending {
            let envelope = record.to_envelope();
            match self.transport.publish(&envelope).await {
                Ok(()) => {
                    self.outbox.mark_sent(record.id, Utc::now()).await?;
                    metrics::counter!("outbox_messages_sent_total", "relay" => self.name.clone())
                        .increment(1);
                    tracing::debug!(
                        message_id = %record.id,
                        message_type = %record.message_type,
                        correlation_key = %record.correlation_key,
                        "Outbox record sent"
                    );
                    sent += 1;
                }
                Err(e) => {
                    metrics::counter!("outbox_publish_failures_total", "relay" => self.name.clone())
                        .increment(1);
                    tracing::warn!(
                        message_id = %record.id,
                        message_type = %record.message_type,
                        attempts = record.attempts + 1,
                        error = %e,
                        "Outbox publish failed, will retry"
                    );
                    self.outbox.record_failure(record.id, &e.to_string()).await?;
                    break;
                }
            }
        }

        Ok(sent)
    }

    /// Polls until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(relay = %self.name, "Outbox relay started");
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(relay = %self.name, error = %e, "Outbox relay tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(relay = %self.name, "Outbox relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::DateTime;
    use common::{SaleId, StockSuccess};
    use tokio::sync::Mutex;

    use super::*;
    use crate::envelope::MessageId;
    use crate::memory::{InMemoryOutbox, InMemoryTransport};
    use crate::outbox::OutboxRecord;

    #[derive(Default)]
    struct SharedOutbox(Mutex<InMemoryOutbox>);

    #[async_trait]
    impl OutboxSource for SharedOutbox {
        async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
            Ok(self.0.lock().await.pending(limit))
        }

        async fn mark_sent(&self, id: MessageId, sent_at: DateTime<Utc>) -> Result<()> {
            self.0.lock().await.mark_sent(id, sent_at)
        }

        async fn record_failure(&self, id: MessageId, error: &str) -> Result<()> {
            self.0.lock().await.record_failure(id, error)
        }
    }

    async fn setup(records: usize) -> (Arc<SharedOutbox>, InMemoryTransport, OutboxRelay) {
        let outbox = Arc::new(SharedOutbox::default());
        for i in 0..records {
            let record =
                OutboxRecord::for_message(&StockSuccess::new(SaleId::new(i as i64))).unwrap();
            outbox.0.lock().await.push(record);
        }
        let transport = InMemoryTransport::new();
        transport.bind("q", "StockSuccess").await.unwrap();
        let relay = OutboxRelay::new(
            "test",
            outbox.clone(),
            Arc::new(transport.clone()),
            RelayConfig::default(),
        );
        (outbox, transport, relay)
    }

    #[tokio::test]
    async fn sends_pending_records_in_order() {
        let (outbox, transport, relay) = setup(3).await;

        assert_eq!(relay.run_once().await.unwrap(), 3);
        assert_eq!(outbox.0.lock().await.pending_count(), 0);
        assert_eq!(transport.ready_count("q").await, 3);

        let first = transport.receive("q").await.unwrap().unwrap();
        assert_eq!(first.envelope.correlation_key, "0");

        assert_eq!(relay.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transport_outage_keeps_records_pending() {
        let (outbox, transport, relay) = setup(2).await;
        transport.set_fail_on_publish(true).await;

        assert_eq!(relay.run_once().await.unwrap(), 0);
        assert_eq!(relay.run_once().await.unwrap(), 0);
        {
            let outbox = outbox.0.lock().await;
            assert_eq!(outbox.pending_count(), 2);
            assert_eq!(outbox.records()[0].attempts, 2);
            assert_eq!(outbox.records()[1].attempts, 0);
        }

        transport.set_fail_on_publish(false).await;
        assert_eq!(relay.run_once().await.unwrap(), 2);
        assert_eq!(transport.ready_count("q").await, 2);
    }

    #[tokio::test]
    async fn unrouted_records_wait_for_a_binding() {
        let outbox = Arc::new(SharedOutbox::default());
        outbox
            .0
            .lock()
            .await
            .push(OutboxRecord::for_message(&StockSuccess::new(SaleId::new(1))).unwrap());
        let transport = InMemoryTransport::new();
        let relay = OutboxRelay::new(
            "test",
            outbox.clone(),
            Arc::new(transport.clone()),
            RelayConfig::default(),
        );

        assert_eq!(relay.run_once().await.unwrap(), 0);
        {
            let outbox = outbox.0.lock().await;
            assert_eq!(outbox.pending_count(), 1);
            assert!(outbox.records()[0].last_error.is_some());
        }

        transport.bind("late", "StockSuccess").await.unwrap();
        assert_eq!(relay.run_once().await.unwrap(), 1);
        assert_eq!(transport.ready_count("late").await, 1);
    }

    #[tokio::test]
    async fn republished_record_keeps_message_id() {
        let (outbox, transport, relay) = setup(1).await;
        let id = outbox.0.lock().await.records()[0].id;

        relay.run_once().await.unwrap();
        let delivery = transport.receive("q").await.unwrap().unwrap();
        assert_eq!(delivery.envelope.message_id, id);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (outbox, _transport, relay) = setup(1).await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(relay.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(outbox.0.lock().await.pending_count(), 0);
    }
}
