//! Stock service: product catalogue, inventory ledger and the per-sale
//! deduction journal the saga handlers consult.

pub mod error;
pub mod journal;
pub mod ledger;
pub mod product;
pub mod service;
pub mod store;

pub use error::{LedgerError, Result};
pub use journal::{CancelAction, DeductionState, PaidAction, SaleDeduction};
pub use ledger::{Direction, StockChange};
pub use product::{NewProduct, Product};
pub use service::ProductService;
pub use store::{InMemoryProductStore, PostgresProductStore, ProductStore, ProductTx};
