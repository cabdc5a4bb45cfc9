use thiserror::Error;

use crate::envelope::MessageId;
use crate::transport::DeliveryId;

/// Errors raised by the outbox, inbox and transport layers.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An envelope was decoded as the wrong message type.
    #[error("Unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessageType {
        expected: &'static str,
        actual: String,
    },

    /// The message was already recorded as processed by this consumer.
    #[error("Message {message_id} already processed by {consumer}")]
    DuplicateInboxRecord {
        consumer: String,
        message_id: MessageId,
    },

    /// No outbox record with this id exists.
    #[error("Outbox record not found: {0}")]
    OutboxRecordNotFound(MessageId),

    /// The delivery is not leased (already acknowledged, released or parked).
    #[error("Unknown delivery: {0}")]
    UnknownDelivery(DeliveryId),

    /// No queue is bound to the message type yet. The message stays with
    /// the sender until a binding exists.
    #[error("No queue bound for message type {0}")]
    NoRoute(String),

    /// The transport refused or could not accept the operation.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),
}

impl MessagingError {
    /// Returns true when the error is caused by the message itself, so
    /// retrying the same message can never succeed.
    pub fn is_poison(&self) -> bool {
        matches!(
            self,
            MessagingError::Serialization(_) | MessagingError::UnexpectedMessageType { .. }
        )
    }
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
