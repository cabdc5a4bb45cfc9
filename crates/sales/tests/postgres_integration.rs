//! PostgreSQL sale store integration tests
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p sales --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use common::{CustomerId, Money, PageRequest, ProductId, SaleId, SalePaid, Version};
use messaging::{
    Envelope, InboxGuard, InboxRecord, MessageId, OutboxRecord, OutboxSource, OutboxWriter,
};
use sales::{PostgresSaleStore, Sale, SaleError, SaleStatus, SaleStore};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();
static NEXT_CUSTOMER: AtomicI64 = AtomicI64::new(1);

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresSaleStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_store() -> PostgresSaleStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();
    PostgresSaleStore::new(pool)
}

fn new_sale() -> Sale {
    let customer = CustomerId::new(NEXT_CUSTOMER.fetch_add(1, Ordering::Relaxed));
    let mut sale = Sale::new(customer);
    sale.add_item(ProductId::new(1), 3, Money::from_cents(1000))
        .unwrap();
    sale.add_item(ProductId::new(2), 1, Money::from_cents(250))
        .unwrap();
    sale
}

async fn saved_sale(store: &PostgresSaleStore) -> SaleId {
    let mut sale = new_sale();
    let mut tx = store.begin().await.unwrap();
    let id = tx.insert_sale(&mut sale).await.unwrap();
    tx.commit().await.unwrap();
    id
}

async fn pending_ids(store: &PostgresSaleStore) -> Vec<MessageId> {
    store
        .outbox_source()
        .fetch_pending(1000)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn insert_and_load_sale_with_items() {
    let store = get_store().await;
    let mut sale = new_sale();

    let mut tx = store.begin().await.unwrap();
    let id = tx.insert_sale(&mut sale).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(sale.id(), Some(id));
    assert_eq!(sale.version(), Version::first());

    let loaded = store.get_sale(id).await.unwrap().unwrap();
    assert_eq!(loaded.status(), SaleStatus::PendingPayment);
    assert_eq!(loaded.customer_id(), sale.customer_id());
    assert_eq!(loaded.total().cents(), 3250);
    assert_eq!(loaded.items(), sale.items());
    assert_eq!(loaded.version(), Version::first());

    let mut tx = store.begin().await.unwrap();
    let in_tx = tx.load_sale(id).await.unwrap().unwrap();
    assert_eq!(in_tx.items().len(), 2);

    assert!(store.get_sale(SaleId::new(i64::MAX)).await.unwrap().is_none());
    let page = store.list_sales(PageRequest::default()).await.unwrap();
    assert!(page.total_count >= 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn stale_version_update_is_a_conflict() {
    let store = get_store().await;
    let id = saved_sale(&store).await;

    let mut first = store.begin().await.unwrap();
    let mut second = store.begin().await.unwrap();
    let mut winner = first.load_sale(id).await.unwrap().unwrap();
    let mut loser = second.load_sale(id).await.unwrap().unwrap();

    winner.mark_paid().unwrap();
    first.update_sale(&mut winner).await.unwrap();
    first.commit().await.unwrap();
    assert_eq!(winner.version(), Version::first().next());

    loser.cancel().unwrap();
    let result = second.update_sale(&mut loser).await;
    assert!(matches!(
        result,
        Err(SaleError::ConcurrencyConflict { sale_id, expected })
            if sale_id == id && expected == Version::first()
    ));
    drop(second);

    let stored = store.get_sale(id).await.unwrap().unwrap();
    assert_eq!(stored.status(), SaleStatus::Paid);
    assert_eq!(stored.version(), Version::first().next());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn committed_change_carries_its_outbox_and_inbox_records() {
    let store = get_store().await;
    let id = saved_sale(&store).await;
    let trigger = Envelope::builder()
        .message_type("StockSuccess")
        .correlation_key(id.to_string())
        .payload_raw(serde_json::json!({}))
        .try_build()
        .unwrap();

    let mut tx = store.begin().await.unwrap();
    let mut sale = tx.load_sale(id).await.unwrap().unwrap();
    assert!(!tx.already_processed("sales", trigger.message_id).await.unwrap());
    sale.mark_paid().unwrap();
    tx.update_sale(&mut sale).await.unwrap();
    let record = OutboxRecord::for_message(&SalePaid::new(id, sale.item_messages())).unwrap();
    let record_id = record.id;
    tx.enqueue(record).await.unwrap();
    tx.record_processed(InboxRecord::for_envelope("sales", &trigger))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert!(pending_ids(&store).await.contains(&record_id));
    let mut tx = store.begin().await.unwrap();
    assert!(tx.already_processed("sales", trigger.message_id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn rolled_back_change_leaves_no_outbox_row() {
    let store = get_store().await;
    let id = saved_sale(&store).await;

    let mut tx = store.begin().await.unwrap();
    let mut sale = tx.load_sale(id).await.unwrap().unwrap();
    sale.mark_paid().unwrap();
    tx.update_sale(&mut sale).await.unwrap();
    let record = OutboxRecord::for_message(&SalePaid::new(id, sale.item_messages())).unwrap();
    let record_id = record.id;
    tx.enqueue(record).await.unwrap();
    drop(tx);

    assert!(!pending_ids(&store).await.contains(&record_id));
    let stored = store.get_sale(id).await.unwrap().unwrap();
    assert_eq!(stored.status(), SaleStatus::PendingPayment);
    assert_eq!(stored.version(), Version::first());
}
