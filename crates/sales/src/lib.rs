//! Sales service domain.
//!
//! - [`Sale`] aggregate with the [`SaleStatus`] state machine
//! - [`SaleStore`] persistence with transactional outbox and inbox
//! - [`StockClient`] for synchronous stock checks, with timeout, retry and
//!   circuit breaker
//! - [`SaleService`] for creation, queries, shipping and completion

pub mod commands;
pub mod error;
pub mod sale;
pub mod service;
pub mod stock_client;
pub mod store;

pub use commands::{CreateSale, SaleItemRequest};
pub use error::{Result, SaleError};
pub use sale::{Sale, SaleItem, SaleStatus};
pub use service::SaleService;
pub use stock_client::{
    HttpStockClient, InMemoryStockClient, ProductStockInfo, StockClient, StockClientConfig,
    StockClientError,
};
pub use store::{InMemorySaleStore, PostgresSaleStore, SaleStore, SaleTx};
