//! Sale aggregate and related types.

mod aggregate;
mod item;
mod status;

pub use aggregate::Sale;
pub use item::SaleItem;
pub use status::SaleStatus;
