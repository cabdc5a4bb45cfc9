//! Product persistence.
//!
//! A [`ProductTx`] locks every product row it reads through
//! [`ProductTx::lock_product`] until it commits or is dropped, so two
//! adjustments of the same product never interleave their
//! read-modify-write. Outbox, inbox and journal writes ride the same
//! transaction.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use common::{Page, PageRequest, ProductId, SaleId};
use messaging::{InboxGuard, OutboxSource, OutboxWriter};

pub use memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;

use crate::error::Result;
use crate::journal::SaleDeduction;
use crate::product::{NewProduct, Product};

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ProductTx>>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists products by ascending id.
    async fn list_products(&self, request: PageRequest) -> Result<Page<Product>>;

    fn outbox_source(&self) -> Arc<dyn OutboxSource>;
}

#[async_trait]
pub trait ProductTx: OutboxWriter + InboxGuard + Send {
    async fn insert_product(&mut self, product: NewProduct) -> Result<Product>;

    /// Reads a product and holds its lock for the rest of the transaction.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Overwrites the quantity of a product previously locked by this transaction.
    async fn set_quantity(&mut self, id: ProductId, quantity: i64) -> Result<()>;

    async fn load_deduction(&mut self, sale_id: SaleId) -> Result<Option<SaleDeduction>>;

    /// Inserts or replaces the journal entry for `deduction.sale_id`.
    async fn save_deduction(&mut self, deduction: &SaleDeduction) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
