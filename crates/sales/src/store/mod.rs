//! Sale persistence.
//!
//! Writes go through a [`SaleTx`], which also stages outbox and inbox
//! records so that a sale change, the message announcing it and the marker
//! of the message that caused it commit together. Dropping a transaction
//! without committing discards everything it staged.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use common::{Page, PageRequest, SaleId};
use messaging::{InboxGuard, OutboxSource, OutboxWriter};

pub use memory::InMemorySaleStore;
pub use postgres::PostgresSaleStore;

use crate::error::Result;
use crate::sale::Sale;

#[async_trait]
pub trait SaleStore: Send + Sync {
    /// Starts a unit of work.
    async fn begin(&self) -> Result<Box<dyn SaleTx>>;

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>>;

    /// Lists sales by ascending id.
    async fn list_sales(&self, request: PageRequest) -> Result<Page<Sale>>;

    /// The outbox this store writes to, for the relay.
    fn outbox_source(&self) -> Arc<dyn OutboxSource>;
}

#[async_trait]
pub trait SaleTx: OutboxWriter + InboxGuard + Send {
    async fn load_sale(&mut self, id: SaleId) -> Result<Option<Sale>>;

    /// Inserts a new sale, assigning its id and first version.
    async fn insert_sale(&mut self, sale: &mut Sale) -> Result<SaleId>;

    /// Writes the sale if its stored version still equals `sale.version()`,
    /// then advances the version. Fails with `ConcurrencyConflict` otherwise.
    async fn update_sale(&mut self, sale: &mut Sale) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
