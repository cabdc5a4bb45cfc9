//! Queue topology.
//!
//! Each consumer owns one queue and uses the queue name as its inbox key.

use common::{Message, SaleCancelled, SalePaid, StockError, StockSuccess};

/// Stock side: deduct stock for a paid sale.
pub const STOCK_SALE_PAID: &str = "stock.sale-paid";

/// Stock side: return stock for a cancelled sale.
pub const STOCK_SALE_CANCELLED: &str = "stock.sale-cancelled";

/// Sales side: stock was deducted.
pub const SALES_STOCK_SUCCESS: &str = "sales.stock-success";

/// Sales side: stock deduction was rejected, cancel the sale.
pub const SALES_STOCK_ERROR: &str = "sales.stock-error";

/// Every `(queue, message type)` binding of the saga. Declared by every
/// runtime, so a message published before its consumer first starts is
/// queued for it.
pub const BINDINGS: [(&str, &str); 4] = [
    (STOCK_SALE_PAID, SalePaid::MESSAGE_TYPE),
    (STOCK_SALE_CANCELLED, SaleCancelled::MESSAGE_TYPE),
    (SALES_STOCK_SUCCESS, StockSuccess::MESSAGE_TYPE),
    (SALES_STOCK_ERROR, StockError::MESSAGE_TYPE),
];
