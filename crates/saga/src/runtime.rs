//! Saga runtime: outbox relays and consumers wired to one transport.

use std::sync::Arc;
use std::time::Duration;

use messaging::{
    ConsumerRunner, MessageHandler, MessageTransport, OutboxRelay, ParkedMessage, RelayConfig,
    RetryPolicy,
};
use sales::SaleStore;
use stock::ProductStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::handlers::{
    SaleCancelledHandler, SalePaidHandler, StockErrorHandler, StockSuccessHandler,
};
use crate::queues::{
    BINDINGS, SALES_STOCK_ERROR, SALES_STOCK_SUCCESS, STOCK_SALE_CANCELLED, STOCK_SALE_PAID,
};

/// Configuration for a [`SagaRuntime`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub relay: RelayConfig,
    /// Retry schedule for transient handler failures.
    pub retry: RetryPolicy,
    /// Consumer sleep when its queue is empty.
    pub idle_wait: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            retry: RetryPolicy::default(),
            idle_wait: Duration::from_millis(200),
        }
    }
}

/// Builds a [`SagaRuntime`] for one or both services.
pub struct SagaRuntimeBuilder {
    transport: Arc<dyn MessageTransport>,
    config: RuntimeConfig,
    relays: Vec<OutboxRelay>,
    consumers: Vec<ConsumerRunner>,
}

impl SagaRuntimeBuilder {
    /// Adds the sales side: its outbox relay and the stock outcome consumers.
    pub fn with_sales(mut self, store: Arc<dyn SaleStore>) -> Self {
        self.relays.push(OutboxRelay::new(
            "sales",
            store.outbox_source(),
            self.transport.clone(),
            self.config.relay.clone(),
        ));
        self.add_consumer(SALES_STOCK_SUCCESS, Arc::new(StockSuccessHandler::new(store.clone())));
        self.add_consumer(SALES_STOCK_ERROR, Arc::new(StockErrorHandler::new(store)));
        self
    }

    /// Adds the stock side: its outbox relay and the sale event consumers.
    pub fn with_stock(mut self, store: Arc<dyn ProductStore>) -> Self {
        self.relays.push(OutboxRelay::new(
            "stock",
            store.outbox_source(),
            self.transport.clone(),
            self.config.relay.clone(),
        ));
        self.add_consumer(STOCK_SALE_PAID, Arc::new(SalePaidHandler::new(store.clone())));
        self.add_consumer(STOCK_SALE_CANCELLED, Arc::new(SaleCancelledHandler::new(store)));
        self
    }

    fn add_consumer(&mut self, queue: &str, handler: Arc<dyn MessageHandler>) {
        self.consumers.push(
            ConsumerRunner::new(
                queue,
                handler,
                self.transport.clone(),
                self.config.retry.clone(),
            )
            .with_idle_wait(self.config.idle_wait),
        );
    }

    pub fn build(self) -> SagaRuntime {
        SagaRuntime {
            transport: self.transport,
            relays: self.relays,
            consumers: self.consumers,
        }
    }
}

/// Relays and consumers of the services hosted by this process.
pub struct SagaRuntime {
    transport: Arc<dyn MessageTransport>,
    relays: Vec<OutboxRelay>,
    consumers: Vec<ConsumerRunner>,
}

impl SagaRuntime {
    pub fn builder(transport: Arc<dyn MessageTransport>, config: RuntimeConfig) -> SagaRuntimeBuilder {
        SagaRuntimeBuilder {
            transport,
            config,
            relays: Vec::new(),
            consumers: Vec::new(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    /// Queues consumed by this runtime.
    pub fn queues(&self) -> Vec<&str> {
        self.consumers.iter().map(ConsumerRunner::queue).collect()
    }

    /// Declares the whole saga topology, including the queues of the
    /// service hosted elsewhere, then binds this runtime's consumers.
    pub async fn bind(&self) -> Result<()> {
        for (queue, message_type) in BINDINGS {
            self.transport.bind(queue, message_type).await?;
        }
        for consumer in &self.consumers {
            consumer.bind().await?;
        }
        Ok(())
    }

    /// Relays and consumes until nothing is left to do in this process.
    /// Returns the number of messages relayed plus settled.
    pub async fn settle(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let mut progress = 0;
            for relay in &self.relays {
                progress += relay.run_once().await?;
            }
            for consumer in &self.consumers {
                progress += consumer.drain().await?;
            }
            if progress == 0 {
                return Ok(total);
            }
            total += progress;
        }
    }

    /// Lists the messages parked from `queue`.
    pub async fn parked(&self, queue: &str) -> Result<Vec<ParkedMessage>> {
        Ok(self.transport.parked(queue).await?)
    }

    /// Moves the messages parked from `queue` back onto it.
    pub async fn redrive(&self, queue: &str) -> Result<usize> {
        let count = self.transport.redrive(queue).await?;
        tracing::info!(queue, count, "Parked messages redriven");
        Ok(count)
    }

    /// Binds the queues and spawns every relay and consumer loop.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        self.bind().await?;
        tracing::info!(
            relays = self.relays.len(),
            consumers = self.consumers.len(),
            "Saga runtime started"
        );

        let mut handles = Vec::with_capacity(self.relays.len() + self.consumers.len());
        for relay in self.relays {
            handles.push(tokio::spawn(relay.run(shutdown.clone())));
        }
        for consumer in self.consumers {
            handles.push(tokio::spawn(consumer.run(shutdown.clone())));
        }
        Ok(handles)
    }
}
