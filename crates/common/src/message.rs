//! Trait implemented by every message that crosses the service boundary.

use serde::{Serialize, de::DeserializeOwned};

/// A message exchanged between the sales and stock services.
///
/// The message type routes the message to its queues; the correlation key
/// ties it to one saga instance (always the sale id here).
pub trait Message: Serialize + DeserializeOwned + Send + Sync {
    /// Wire name of the message, used for routing and for decoding.
    const MESSAGE_TYPE: &'static str;

    /// Returns the correlation key of the saga instance this message belongs to.
    fn correlation_key(&self) -> String;
}
