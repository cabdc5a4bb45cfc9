use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, Page, PageRequest, ProductId, SaleId, SaleItemMessage};
use messaging::postgres::{inbox_contains, insert_inbox_record, insert_outbox_record};
use messaging::{
    InboxGuard, InboxRecord, MessageId, OutboxRecord, OutboxSource, OutboxWriter, PostgresOutbox,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::{ProductStore, ProductTx};
use crate::error::{LedgerError, Result};
use crate::journal::{DeductionState, SaleDeduction};
use crate::product::{NewProduct, Product};

/// PostgreSQL-backed product store.
#[derive(Clone)]
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the stock database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/stock").run(&self.pool).await
    }
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        quantity: row.try_get("quantity")?,
    })
}

fn row_to_deduction(row: &PgRow) -> Result<SaleDeduction> {
    let state: String = row.try_get("state")?;
    let state = DeductionState::parse(&state)
        .ok_or_else(|| LedgerError::Validation(format!("Unknown deduction state {state}")))?;
    let items: serde_json::Value = row.try_get("items")?;
    let items: Vec<SaleItemMessage> =
        serde_json::from_value(items).map_err(messaging::MessagingError::from)?;

    Ok(SaleDeduction {
        sale_id: SaleId::new(row.try_get("sale_id")?),
        state,
        items,
        updated_at: row.try_get("updated_at")?,
    })
}

const SELECT_PRODUCT: &str = r#"
    SELECT id, name, description, unit_price_cents, quantity
    FROM products
"#;

#[async_trait]
impl ProductStore for PostgresProductStore {
    async fn begin(&self) -> Result<Box<dyn ProductTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresProductTx { tx }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("{SELECT_PRODUCT} WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn list_products(&self, request: PageRequest) -> Result<Page<Product>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(&format!(
            "{SELECT_PRODUCT} ORDER BY id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(request.page_size()))
        .bind(request.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let products = rows.iter().map(row_to_product).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(products, request, total as u64))
    }

    fn outbox_source(&self) -> Arc<dyn OutboxSource> {
        Arc::new(PostgresOutbox::new(self.pool.clone()))
    }
}

struct PostgresProductTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ProductTx for PostgresProductTx {
    async fn insert_product(&mut self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (name, description, unit_price_cents, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price.cents())
        .bind(product.quantity)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(product.into_product(ProductId::new(id)))
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("{SELECT_PRODUCT} WHERE id = $1 FOR UPDATE"))
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn set_quantity(&mut self, id: ProductId, quantity: i64) -> Result<()> {
        let result = sqlx::query("UPDATE products SET quantity = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("products_quantity_check")
                {
                    return LedgerError::Validation(format!(
                        "Quantity of product {id} cannot become negative"
                    ));
                }
                LedgerError::Database(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::ProductNotFound(id));
        }
        Ok(())
    }

    async fn load_deduction(&mut self, sale_id: SaleId) -> Result<Option<SaleDeduction>> {
        let row = sqlx::query(
            r#"
            SELECT sale_id, state, items, updated_at
            FROM sale_deductions
            WHERE sale_id = $1
            FOR UPDATE
            "#,
        )
        .bind(sale_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_deduction).transpose()
    }

    async fn save_deduction(&mut self, deduction: &SaleDeduction) -> Result<()> {
        let items = serde_json::to_value(&deduction.items).map_err(messaging::MessagingError::from)?;
        sqlx::query(
            r#"
            INSERT INTO sale_deductions (sale_id, state, items, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sale_id)
            DO UPDATE SET state = EXCLUDED.state, items = EXCLUDED.items, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(deduction.sale_id.as_i64())
        .bind(deduction.state.as_str())
        .bind(items)
        .bind(deduction.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxWriter for PostgresProductTx {
    async fn enqueue(&mut self, record: OutboxRecord) -> messaging::Result<()> {
        insert_outbox_record(&mut *self.tx, &record).await
    }
}

#[async_trait]
impl InboxGuard for PostgresProductTx {
    async fn already_processed(
        &mut self,
        consumer: &str,
        message_id: MessageId,
    ) -> messaging::Result<bool> {
        inbox_contains(&mut *self.tx, consumer, message_id).await
    }

    async fn record_processed(&mut self, record: InboxRecord) -> messaging::Result<()> {
        insert_inbox_record(&mut *self.tx, &record).await
    }
}
