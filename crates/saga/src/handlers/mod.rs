//! Saga message handlers.
//!
//! Each handler decodes its message, checks the inbox, applies its effects
//! and records the message as processed inside one store transaction.
//! Errors are classified through [`SagaError::is_transient`]: transient ones
//! are retried by the consumer runner, the rest are parked.
//!
//! [`SagaError::is_transient`]: crate::error::SagaError::is_transient

mod sale_cancelled;
mod sale_paid;
mod stock_error;
mod stock_success;

pub use sale_cancelled::SaleCancelledHandler;
pub use sale_paid::SalePaidHandler;
pub use stock_error::StockErrorHandler;
pub use stock_success::StockSuccessHandler;

/// Reason published in `StockError` when a product lacks stock.
pub const INSUFFICIENT_STOCK_REASON: &str = "Estoque insuficiente";

/// Reason published in `StockError` when a product does not exist.
pub fn product_not_found_reason(product_id: common::ProductId) -> String {
    format!("Produto {product_id} não encontrado")
}
