//! Message transport abstraction.
//!
//! Publishing routes an envelope to every queue bound to its message type.
//! Receiving leases one message from a queue; the consumer then acknowledges,
//! releases or parks it. Parked messages move to the queue's error queue and
//! stay there until an operator redrives them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::error::Result;

/// Identifier of one queued copy of a message.
///
/// The same message published to two queues gets two delivery ids but keeps
/// its [`MessageId`](crate::envelope::MessageId).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(i64);

impl DeliveryId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A leased message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: DeliveryId,
    pub queue: String,
    pub envelope: Envelope,
    /// How many times this copy has been handed out, including this one.
    pub delivery_count: i32,
}

/// A message set aside after its handler gave up on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParkedMessage {
    pub id: DeliveryId,
    /// Queue the message was consumed from.
    pub queue: String,
    pub envelope: Envelope,
    pub reason: String,
    pub parked_at: DateTime<Utc>,
}

/// Name of the error queue that receives parked messages from `queue`.
pub fn error_queue(queue: &str) -> String {
    format!("{queue}_error")
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Routes messages of `message_type` to `queue`. Binding twice is a no-op.
    async fn bind(&self, queue: &str, message_type: &str) -> Result<()>;

    /// Copies the envelope onto every queue bound to its message type.
    /// Fails with [`NoRoute`](crate::MessagingError::NoRoute) when no queue
    /// is bound, so the sender keeps the message.
    async fn publish(&self, envelope: &Envelope) -> Result<()>;

    /// Leases the oldest ready message of `queue`, if any.
    async fn receive(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Removes a leased message for good.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Returns a leased message to its queue for another attempt.
    async fn release(&self, delivery: &Delivery) -> Result<()>;

    /// Moves a leased message to the error queue of its queue.
    async fn park(&self, delivery: &Delivery, reason: &str) -> Result<()>;

    /// Lists the messages parked from `queue`, oldest first.
    async fn parked(&self, queue: &str) -> Result<Vec<ParkedMessage>>;

    /// Moves every message parked from `queue` back onto it. Returns the count.
    async fn redrive(&self, queue: &str) -> Result<usize>;
}
