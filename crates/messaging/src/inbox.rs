//! Idempotent consumer support.
//!
//! Handlers check the inbox and record the processed message inside the same
//! transaction as their effects. A redelivered message is then recognised
//! and skipped without repeating those effects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, MessageId};
use crate::error::Result;

/// Marker that `consumer` has fully processed `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxRecord {
    pub consumer: String,
    pub message_id: MessageId,
    pub message_type: String,
    pub processed_at: DateTime<Utc>,
}

impl InboxRecord {
    pub fn for_envelope(consumer: impl Into<String>, envelope: &Envelope) -> Self {
        Self {
            consumer: consumer.into(),
            message_id: envelope.message_id,
            message_type: envelope.message_type.clone(),
            processed_at: Utc::now(),
        }
    }
}

/// Inbox access, implemented by service transactions.
#[async_trait]
pub trait InboxGuard: Send {
    /// Returns true if `consumer` already committed the processing of `message_id`.
    async fn already_processed(&mut self, consumer: &str, message_id: MessageId) -> Result<bool>;

    /// Stages the processed marker; it becomes durable on commit.
    async fn record_processed(&mut self, record: InboxRecord) -> Result<()>;
}
