//! Messaging plumbing for the sale saga.
//!
//! - [`outbox`]: records written in the same transaction as the state change
//!   they announce, forwarded later by the [`relay`].
//! - [`inbox`]: processed message ids, so redelivered messages are skipped.
//! - [`transport`]: named queues with at-least-once delivery and an error
//!   queue per consumer queue.
//! - [`consumer`]: runs a handler per delivery with bounded retry, parking
//!   the message once retries are exhausted.

pub mod consumer;
pub mod envelope;
pub mod error;
pub mod inbox;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod relay;
pub mod retry;
pub mod transport;

pub use consumer::{ConsumerRunner, Disposition, HandleOutcome, HandlerError, MessageHandler};
pub use envelope::{Envelope, EnvelopeBuilder, MessageId};
pub use error::{MessagingError, Result};
pub use inbox::{InboxGuard, InboxRecord};
pub use memory::{InMemoryInbox, InMemoryOutbox, InMemoryTransport};
pub use outbox::{OutboxRecord, OutboxSource, OutboxStatus, OutboxWriter};
pub use postgres::{PostgresOutbox, PostgresTransport};
pub use relay::{OutboxRelay, RelayConfig};
pub use retry::RetryPolicy;
pub use transport::{Delivery, DeliveryId, MessageTransport, ParkedMessage, error_queue};
