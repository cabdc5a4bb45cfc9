//! Transactional outbox.
//!
//! A service writes an [`OutboxRecord`] through the same transaction that
//! changes its state. The [`OutboxRelay`](crate::relay::OutboxRelay) later
//! reads pending records from an [`OutboxSource`] and publishes them, so a
//! message exists if and only if the state change committed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Message;
use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, MessageId};
use crate::error::Result;

/// Delivery status of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Committed but not yet handed to the transport.
    Pending,
    /// Accepted by the transport.
    Sent,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
        }
    }

    /// Parses the stored representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OutboxStatus::Pending),
            "sent" => Some(OutboxStatus::Sent),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message waiting in a service's outbox table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Becomes the message id of the published envelope.
    pub id: MessageId,
    pub message_type: String,
    pub correlation_key: String,
    pub payload: serde_json::Value,
    pub headers: HashMap<String, String>,
    pub status: OutboxStatus,
    /// Number of failed publish attempts.
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Creates a pending record for a typed message.
    pub fn for_message<M: Message>(message: &M) -> Result<Self> {
        Ok(Self {
            id: MessageId::new(),
            message_type: M::MESSAGE_TYPE.to_string(),
            correlation_key: message.correlation_key(),
            payload: serde_json::to_value(message)?,
            headers: HashMap::new(),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            sent_at: None,
        })
    }

    /// Adds a header that will travel with the published envelope.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    /// Builds the envelope to publish. Relaying the same record twice yields
    /// the same message id.
    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            message_id: self.id,
            message_type: self.message_type.clone(),
            correlation_key: self.correlation_key.clone(),
            occurred_at: self.created_at,
            payload: self.payload.clone(),
            headers: self.headers.clone(),
        }
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.status = OutboxStatus::Sent;
        self.sent_at = Some(at);
    }

    pub fn record_failure(&mut self, error: &str) {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
    }
}

/// Write side of the outbox, implemented by service transactions.
#[async_trait]
pub trait OutboxWriter: Send {
    /// Stages a record; it becomes visible to the relay only on commit.
    async fn enqueue(&mut self, record: OutboxRecord) -> Result<()>;
}

/// Read side of the outbox, consumed by the relay.
#[async_trait]
pub trait OutboxSource: Send + Sync {
    /// Returns up to `limit` pending records, oldest first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxRecord>>;

    /// Marks a record as accepted by the transport.
    async fn mark_sent(&self, id: MessageId, sent_at: DateTime<Utc>) -> Result<()>;

    /// Records a failed publish attempt; the record stays pending.
    async fn record_failure(&self, id: MessageId, error: &str) -> Result<()>;
}
