//! Sale fulfillment saga.
//!
//! Paying a sale deducts its stock; a rejected deduction cancels the sale;
//! cancelling a paid sale returns its stock. The two services never share a
//! transaction: each step commits locally together with the message that
//! triggers the next one, and every consumer is idempotent.

pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod local_stock;
pub mod queues;
pub mod runtime;

pub use coordinator::SagaCoordinator;
pub use error::{Result, SagaError};
pub use handlers::{
    INSUFFICIENT_STOCK_REASON, SaleCancelledHandler, SalePaidHandler, StockErrorHandler,
    StockSuccessHandler,
};
pub use local_stock::LocalStockClient;
pub use runtime::{RuntimeConfig, SagaRuntime, SagaRuntimeBuilder};
