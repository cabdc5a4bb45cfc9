//! Types shared by the sales and stock services.

pub mod events;
pub mod message;
pub mod money;
pub mod paging;
pub mod types;

pub use events::{SaleCancelled, SaleItemMessage, SalePaid, StockError, StockSuccess};
pub use message::Message;
pub use money::Money;
pub use paging::{Page, PageRequest};
pub use types::{CustomerId, ProductId, SaleId, Version};
