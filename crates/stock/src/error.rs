//! Stock service error types.

use common::ProductId;
use messaging::MessagingError;
use thiserror::Error;

/// Errors that can occur during stock operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input, rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Applying the adjustment would make the quantity on hand negative.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: u64,
    },

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// Returns true for business rejections, which are never retried.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_)
                | LedgerError::ProductNotFound(_)
                | LedgerError::InsufficientStock { .. }
        )
    }
}

/// Result type for stock operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
