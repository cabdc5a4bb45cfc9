//! Saga message contracts.
//!
//! These four messages are the only surface the two services share. Field
//! names are serialized in camelCase to stay wire compatible with the other
//! consumers of the broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;
use crate::types::{ProductId, SaleId};

/// A product and quantity carried inside saga messages.
///
/// The stock service never reads sales, so every message that may require
/// a stock change brings its own copy of the line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemMessage {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl SaleItemMessage {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Published by the sales service when a sale is marked paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePaid {
    pub sale_id: SaleId,
    pub correlation_id: Uuid,
    pub items: Vec<SaleItemMessage>,
}

impl SalePaid {
    pub fn new(sale_id: SaleId, items: Vec<SaleItemMessage>) -> Self {
        Self {
            sale_id,
            correlation_id: Uuid::new_v4(),
            items,
        }
    }
}

impl Message for SalePaid {
    const MESSAGE_TYPE: &'static str = "SalePaid";

    fn correlation_key(&self) -> String {
        self.sale_id.to_string()
    }
}

/// Published by the sales service when a sale whose stock was already
/// requested gets cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleCancelled {
    pub sale_id: SaleId,
    pub cancelled_at: DateTime<Utc>,
    pub items: Vec<SaleItemMessage>,
}

impl SaleCancelled {
    pub fn new(sale_id: SaleId, items: Vec<SaleItemMessage>) -> Self {
        Self {
            sale_id,
            cancelled_at: Utc::now(),
            items,
        }
    }
}

impl Message for SaleCancelled {
    const MESSAGE_TYPE: &'static str = "SaleCancelled";

    fn correlation_key(&self) -> String {
        self.sale_id.to_string()
    }
}

/// Published by the stock service once every item of a paid sale was deducted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockSuccess {
    pub sale_id: SaleId,
    pub processed_at: DateTime<Utc>,
}

impl StockSuccess {
    pub fn new(sale_id: SaleId) -> Self {
        Self {
            sale_id,
            processed_at: Utc::now(),
        }
    }
}

impl Message for StockSuccess {
    const MESSAGE_TYPE: &'static str = "StockSuccess";

    fn correlation_key(&self) -> String {
        self.sale_id.to_string()
    }
}

/// Published by the stock service when the deduction for a paid sale was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockError {
    pub sale_id: SaleId,
    pub reason: String,
}

impl StockError {
    pub fn new(sale_id: SaleId, reason: impl Into<String>) -> Self {
        Self {
            sale_id,
            reason: reason.into(),
        }
    }
}

impl Message for StockError {
    const MESSAGE_TYPE: &'static str = "StockError";

    fn correlation_key(&self) -> String {
        self.sale_id.to_string()
    }
}
