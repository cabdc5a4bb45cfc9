//! Sales service error types.

use common::{ProductId, SaleId, Version};
use messaging::MessagingError;
use thiserror::Error;

use crate::sale::SaleStatus;
use crate::stock_client::StockClientError;

/// Errors that can occur during sale operations.
#[derive(Debug, Error)]
pub enum SaleError {
    /// Malformed input, rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested transition is illegal for the current status.
    #[error("Invalid state transition: cannot {action} from {current} status")]
    InvalidState {
        current: SaleStatus,
        action: &'static str,
    },

    #[error("Sale not found: {0}")]
    NotFound(SaleId),

    /// A referenced product does not exist in the stock service.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The sale row changed since it was read.
    #[error("Concurrency conflict on sale {sale_id}: expected version {expected}")]
    ConcurrencyConflict { sale_id: SaleId, expected: Version },

    /// The stock service could not be reached or answered unexpectedly.
    #[error("Stock service error: {0}")]
    StockClient(#[from] StockClientError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SaleError {
    /// Returns true for business rejections, which are never retried.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SaleError::Validation(_)
                | SaleError::InvalidState { .. }
                | SaleError::NotFound(_)
                | SaleError::ProductNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SaleError::ConcurrencyConflict { .. })
    }
}

/// Result type for sale operations.
pub type Result<T> = std::result::Result<T, SaleError>;
