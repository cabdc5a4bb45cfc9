//! Consumer runner with bounded retry and parking.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::envelope::Envelope;
use crate::error::{MessagingError, Result};
use crate::retry::RetryPolicy;
use crate::transport::{Delivery, MessageTransport};

/// Result of a successful handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Effects were applied and the inbox record committed.
    Processed,
    /// The inbox already held this message; nothing was done.
    Duplicate,
}

/// Handler failure, classified by whether another attempt can help.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Infrastructure trouble or a lost race; retried, then parked.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The message can never be processed as is; parked immediately.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn transient(error: impl Display) -> Self {
        HandlerError::Transient(error.to_string())
    }

    pub fn permanent(error: impl Display) -> Self {
        HandlerError::Permanent(error.to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

impl From<MessagingError> for HandlerError {
    fn from(error: MessagingError) -> Self {
        if error.is_poison() {
            HandlerError::Permanent(error.to_string())
        } else {
            HandlerError::Transient(error.to_string())
        }
    }
}

/// Processes one message type.
///
/// Implementations check the inbox and record the message inside the same
/// transaction as their effects, returning [`HandleOutcome::Duplicate`] when
/// the inbox already holds it. Failures must be returned, never swallowed,
/// so that retry and parking engage.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Consumer name recorded in the inbox.
    fn name(&self) -> &'static str;

    /// Message type this handler accepts.
    fn message_type(&self) -> &'static str;

    async fn handle(&self, envelope: &Envelope) -> std::result::Result<HandleOutcome, HandlerError>;
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Acked(HandleOutcome),
    Parked(String),
}

/// Pulls deliveries from one queue and feeds them to one handler.
pub struct ConsumerRunner {
    queue: String,
    handler: Arc<dyn MessageHandler>,
    transport: Arc<dyn MessageTransport>,
    retry: RetryPolicy,
    idle_wait: Duration,
}

impl ConsumerRunner {
    pub fn new(
        queue: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
        transport: Arc<dyn MessageTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue: queue.into(),
            handler,
            transport,
            retry,
            idle_wait: Duration::from_millis(200),
        }
    }

    /// Sets how long [`run`](Self::run) sleeps when the queue is empty.
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Binds the handler's message type to this runner's queue.
    pub async fn bind(&self) -> Result<()> {
        self.transport
            .bind(&self.queue, self.handler.message_type())
            .await
    }

    /// Receives and settles a single delivery. Returns None if the queue is empty.
    pub async fn process_next(&self) -> Result<Option<Disposition>> {
        let Some(delivery) = self.transport.receive(&self.queue).await? else {
            return Ok(None);
        };
        let disposition = self.dispatch(&delivery).await;

        match &disposition {
            Disposition::Acked(_) => self.transport.ack(&delivery).await?,
            Disposition::Parked(reason) => self.transport.park(&delivery, reason).await?,
        }
        Ok(Some(disposition))
    }

    /// Processes deliveries until the queue is empty. Returns how many were settled.
    pub async fn drain(&self) -> Result<usize> {
        let mut settled = 0;
        while self.process_next().await?.is_some() {
            settled += 1;
        }
        Ok(settled)
    }

    /// Consumes until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = %self.queue, consumer = self.handler.name(), "Consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let wait = match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => self.idle_wait,
                Err(e) => {
                    tracing::error!(queue = %self.queue, error = %e, "Consumer transport error");
                    self.idle_wait
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(queue = %self.queue, consumer = self.handler.name(), "Consumer stopped");
    }

    #[tracing::instrument(
        skip(self, delivery),
        fields(
            queue = %self.queue,
            message_id = %delivery.envelope.message_id,
            message_type = %delivery.envelope.message_type,
            correlation_key = %delivery.envelope.correlation_key,
        )
    )]
    async fn dispatch(&self, delivery: &Delivery) -> Disposition {
        let consumer = self.handler.name();
        let mut retry = 0;

        loop {
            match self.handler.handle(&delivery.envelope).await {
                Ok(outcome) => {
                    match outcome {
                        HandleOutcome::Processed => {
                            metrics::counter!("consumer_messages_processed_total", "consumer" => consumer)
                                .increment(1);
                        }
                        HandleOutcome::Duplicate => {
                            metrics::counter!("consumer_messages_duplicate_total", "consumer" => consumer)
                                .increment(1);
                            tracing::info!("Duplicate delivery skipped");
                        }
                    }
                    return Disposition::Acked(outcome);
                }
                Err(HandlerError::Permanent(reason)) => {
                    metrics::counter!("consumer_messages_parked_total", "consumer" => consumer)
                        .increment(1);
                    tracing::error!(reason = %reason, "Permanent handler failure, parking message");
                    return Disposition::Parked(reason);
                }
                Err(HandlerError::Transient(reason)) => {
                    let Some(delay) = self.retry.delay_for_retry(retry) else {
                        metrics::counter!("consumer_messages_parked_total", "consumer" => consumer)
                            .increment(1);
                        tracing::error!(
                            attempts = retry + 1,
                            reason = %reason,
                            "Retries exhausted, parking message"
                        );
                        return Disposition::Parked(reason);
                    };
                    metrics::counter!("consumer_retries_total", "consumer" => consumer).increment(1);
                    tracing::warn!(
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Handler failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}
