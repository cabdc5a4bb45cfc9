//! Saga error types.

use common::SaleId;
use messaging::{HandlerError, MessagingError};
use sales::{SaleError, StockClientError};
use stock::LedgerError;
use thiserror::Error;

/// Errors that can occur while driving the saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Malformed request, rejected before the saga starts.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A compensating action could not be applied. Needs an operator.
    #[error("Compensation failed for sale {sale_id}: {reason}")]
    CompensationFailure { sale_id: SaleId, reason: String },

    #[error("Sale error: {0}")]
    Sale(#[from] SaleError),

    #[error("Stock error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
}

impl SagaError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SagaError::Validation(_) | SagaError::CompensationFailure { .. } => false,
            SagaError::Sale(e) => match e {
                SaleError::ConcurrencyConflict { .. } | SaleError::Database(_) => true,
                SaleError::StockClient(e) => e.is_unavailable(),
                SaleError::Messaging(e) => !e.is_poison(),
                _ => false,
            },
            SagaError::Ledger(e) => match e {
                LedgerError::Database(_) => true,
                LedgerError::Messaging(e) => !e.is_poison(),
                _ => false,
            },
            SagaError::Messaging(e) => !e.is_poison(),
        }
    }
}

impl From<StockClientError> for SagaError {
    fn from(error: StockClientError) -> Self {
        SagaError::Sale(SaleError::StockClient(error))
    }
}

impl From<SagaError> for HandlerError {
    fn from(error: SagaError) -> Self {
        if error.is_transient() {
            HandlerError::transient(error)
        } else {
            HandlerError::permanent(error)
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
