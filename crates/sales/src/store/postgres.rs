use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, Money, Page, PageRequest, ProductId, SaleId, Version};
use messaging::postgres::{inbox_contains, insert_inbox_record, insert_outbox_record};
use messaging::{
    InboxGuard, InboxRecord, MessageId, OutboxRecord, OutboxSource, OutboxWriter, PostgresOutbox,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::{SaleStore, SaleTx};
use crate::error::{Result, SaleError};
use crate::sale::{Sale, SaleItem, SaleStatus};

/// PostgreSQL-backed sale store.
#[derive(Clone)]
pub struct PostgresSaleStore {
    pool: PgPool,
}

impl PostgresSaleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the sales database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/sales").run(&self.pool).await
    }
}

fn row_to_item(row: &PgRow) -> Result<(SaleId, SaleItem)> {
    Ok((
        SaleId::new(row.try_get("sale_id")?),
        SaleItem::new(
            ProductId::new(row.try_get("product_id")?),
            row.try_get("quantity")?,
            Money::from_cents(row.try_get("unit_price_cents")?),
        ),
    ))
}

fn row_to_sale(row: &PgRow, items: Vec<SaleItem>) -> Result<Sale> {
    let status: i16 = row.try_get("status")?;
    let status = SaleStatus::from_ordinal(status)
        .ok_or_else(|| SaleError::Validation(format!("Unknown stored sale status {status}")))?;

    Ok(Sale::restore(
        SaleId::new(row.try_get("id")?),
        CustomerId::new(row.try_get("customer_id")?),
        row.try_get("created_at")?,
        status,
        items,
        Version::new(row.try_get("version")?),
    ))
}

/// Loads sales and their items for the given rows, preserving row order.
async fn hydrate<'e, E>(executor: E, rows: Vec<PgRow>) -> Result<Vec<Sale>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = rows
        .iter()
        .map(|row| row.try_get::<i64, _>("id"))
        .collect::<std::result::Result<_, _>>()?;

    let item_rows = sqlx::query(
        r#"
        SELECT sale_id, product_id, quantity, unit_price_cents
        FROM sale_items
        WHERE sale_id = ANY($1)
        ORDER BY id ASC
        "#,
    )
    .bind(&ids)
    .fetch_all(executor)
    .await?;

    let mut items: HashMap<SaleId, Vec<SaleItem>> = HashMap::new();
    for row in &item_rows {
        let (sale_id, item) = row_to_item(row)?;
        items.entry(sale_id).or_default().push(item);
    }

    rows.iter()
        .map(|row| -> Result<Sale> {
            let id = SaleId::new(row.try_get("id")?);
            row_to_sale(row, items.remove(&id).unwrap_or_default())
        })
        .collect()
}

const SELECT_SALE: &str = r#"
    SELECT id, customer_id, created_at, status, version
    FROM sales
"#;

#[async_trait]
impl SaleStore for PostgresSaleStore {
    async fn begin(&self) -> Result<Box<dyn SaleTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresSaleTx { tx }))
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>> {
        let row = sqlx::query(&format!("{SELECT_SALE} WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(hydrate(&self.pool, vec![row]).await?.pop())
    }

    async fn list_sales(&self, request: PageRequest) -> Result<Page<Sale>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(&format!("{SELECT_SALE} ORDER BY id ASC LIMIT $1 OFFSET $2"))
            .bind(i64::from(request.page_size()))
            .bind(request.offset() as i64)
            .fetch_all(&self.pool)
            .await?;
        let sales = hydrate(&self.pool, rows).await?;
        Ok(Page::new(sales, request, total as u64))
    }

    fn outbox_source(&self) -> Arc<dyn OutboxSource> {
        Arc::new(PostgresOutbox::new(self.pool.clone()))
    }
}

struct PostgresSaleTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SaleTx for PostgresSaleTx {
    async fn load_sale(&mut self, id: SaleId) -> Result<Option<Sale>> {
        let row = sqlx::query(&format!("{SELECT_SALE} WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(hydrate(&mut *self.tx, vec![row]).await?.pop())
    }

    async fn insert_sale(&mut self, sale: &mut Sale) -> Result<SaleId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sales (customer_id, created_at, status, total_cents, version)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(sale.customer_id().as_i64())
        .bind(sale.created_at())
        .bind(sale.status().ordinal())
        .bind(sale.total().cents())
        .bind(Version::first().as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        for item in sale.items() {
            sqlx::query(
                r#"
                INSERT INTO sale_items (sale_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id)
            .bind(item.product_id.as_i64())
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        let id = SaleId::new(id);
        sale.assign_id(id);
        sale.set_version(Version::first());
        Ok(id)
    }

    async fn update_sale(&mut self, sale: &mut Sale) -> Result<()> {
        let id = sale
            .id()
            .ok_or_else(|| SaleError::Validation("Cannot update an unsaved sale".to_string()))?;
        let expected = sale.version();

        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = $2, total_cents = $3, version = version + 1
            WHERE id = $1 AND version = $4
            "#,
        )
        .bind(id.as_i64())
        .bind(sale.status().ordinal())
        .bind(sale.total().cents())
        .bind(expected.as_i64())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SaleError::ConcurrencyConflict {
                sale_id: id,
                expected,
            });
        }
        sale.set_version(expected.next());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxWriter for PostgresSaleTx {
    async fn enqueue(&mut self, record: OutboxRecord) -> messaging::Result<()> {
        insert_outbox_record(&mut *self.tx, &record).await
    }
}

#[async_trait]
impl InboxGuard for PostgresSaleTx {
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
