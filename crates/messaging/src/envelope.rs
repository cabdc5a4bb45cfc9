use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MessagingError, Result};

/// Unique identifier of a message, stable across redeliveries.
///
/// Consumers key their inbox on it, so a message relayed twice by the outbox
/// carries the same id both times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<MessageId> for Uuid {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

/// A message as it travels through the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: MessageId,

    /// Wire name of the payload (e.g. "SalePaid").
    pub message_type: String,

    /// Saga instance the message belongs to.
    pub correlation_key: String,

    pub occurred_at: DateTime<Utc>,

    pub payload: serde_json::Value,

    /// Free-form headers, e.g. the HTTP correlation id of the originating request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Envelope {
    /// Creates a new envelope builder.
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    /// Wraps a typed message in a fresh envelope.
    pub fn for_message<M: Message>(message: &M) -> Result<Self> {
        Ok(Self {
            message_id: MessageId::new(),
            message_type: M::MESSAGE_TYPE.to_string(),
            correlation_key: message.correlation_key(),
            occurred_at: Utc::now(),
            payload: serde_json::to_value(message)?,
            headers: HashMap::new(),
        })
    }

    /// Returns true if the envelope carries a message of type `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.message_type == M::MESSAGE_TYPE
    }

    /// Decodes the payload as `M`, rejecting envelopes of another type.
    pub fn decode<M: Message>(&self) -> Result<M> {
        if !self.is::<M>() {
            return Err(MessagingError::UnexpectedMessageType {
                expected: M::MESSAGE_TYPE,
                actual: self.message_type.clone(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Returns a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

/// Builder for constructing envelopes by hand.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    message_id: Option<MessageId>,
    message_type: Option<String>,
    correlation_key: Option<String>,
    occurred_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    headers: HashMap<String, String>,
}

impl EnvelopeBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn correlation_key(mut self, key: impl Into<String>) -> Self {
        self.correlation_key = Some(key.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> std::result::Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Builds the envelope, returning None if the type, correlation key or
    /// payload is missing.
    pub fn try_build(self) -> Option<Envelope> {
        Some(Envelope {
            message_id: self.message_id.unwrap_or_default(),
            message_type: self.message_type?,
            correlation_key: self.correlation_key?,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            payload: self.payload?,
            headers: self.headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use common::{SaleId, SalePaid, SaleItemMessage, ProductId, StockError};

    use super::*;

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn for_message_fills_routing_fields() {
        let event = SalePaid::new(SaleId::new(4), vec![SaleItemMessage::new(ProductId::new(1), 2)]);
        let envelope = Envelope::for_message(&event).unwrap();

        assert_eq!(envelope.message_type, "SalePaid");
        assert_eq!(envelope.correlation_key, "4");
        assert!(envelope.is::<SalePaid>());
        assert_eq!(envelope.decode::<SalePaid>().unwrap(), event);
    }

    #[test]
    fn decode_rejects_other_message_types() {
        let envelope = Envelope::for_message(&StockError::new(SaleId::new(1), "x")).unwrap();
        let err = envelope.decode::<SalePaid>().unwrap_err();
        assert!(matches!(err, MessagingError::UnexpectedMessageType { .. }));
        assert!(err.is_poison());
    }

    #[test]
    fn decode_reports_malformed_payloads() {
        let envelope = Envelope::builder()
            .message_type("SalePaid")
            .correlation_key("1")
            .payload_raw(serde_json::json!({"unexpected": true}))
            .try_build()
            .unwrap();
        let err = envelope.decode::<SalePaid>().unwrap_err();
        assert!(matches!(err, MessagingError::Serialization(_)));
    }

    #[test]
    fn builder_keeps_headers() {
        let envelope = Envelope::builder()
            .message_type("StockSuccess")
            .correlation_key("9")
            .payload_raw(serde_json::json!({}))
            .header("x-correlation-id", "abc")
            .try_build()
            .unwrap();
        assert_eq!(envelope.header("x-correlation-id"), Some("abc"));
    }

    #[test]
    fn try_build_returns_none_on_missing_fields() {
        assert!(Envelope::builder().try_build().is_none());
    }
}
