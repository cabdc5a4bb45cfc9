//! PostgreSQL product store integration tests
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p stock --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use common::{Money, PageRequest, ProductId, SaleId, SaleItemMessage, StockSuccess};
use messaging::{Envelope, InboxGuard, InboxRecord, OutboxRecord, OutboxSource, OutboxWriter};
use sqlx::PgPool;
use stock::{
    DeductionState, Direction, LedgerError, NewProduct, PostgresProductStore, ProductService,
    ProductStore, SaleDeduction, ledger,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresProductStore::new(pool.clone())
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

async fn get_store() -> PostgresProductStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();
    PostgresProductStore::new(pool)
}

async fn create(service: &ProductService, quantity: i64) -> ProductId {
    service
        .create_product(NewProduct::new("Widget", Money::from_cents(1500), quantity))
        .await
        .unwrap()
        .id
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn create_get_and_list_products() {
    let service = ProductService::new(Arc::new(get_store().await));
    let id = create(&service, 7).await;

    let product = service.get_product(id).await.unwrap();
    assert_eq!(product.quantity, 7);
    assert_eq!(product.unit_price, Money::from_cents(1500));

    let page = service.list_products(PageRequest::default()).await.unwrap();
    assert!(page.total_count >= 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn update_stock_never_goes_negative() {
    let service = ProductService::new(Arc::new(get_store().await));
    let id = create(&service, 2).await;

    assert_eq!(service.update_stock(id, -2).await.unwrap(), 0);
    assert!(matches!(
        service.update_stock(id, -1).await,
        Err(LedgerError::InsufficientStock { .. })
    ));
    assert!(matches!(
        service.update_stock(ProductId::new(i64::MAX), 1).await,
        Err(LedgerError::ProductNotFound(_))
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn concurrent_deductions_never_oversell() {
    let service = ProductService::new(Arc::new(get_store().await));
    let id = create(&service, 5).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.update_stock(id, -1).await }));
    }
    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(service.get_product(id).await.unwrap().quantity, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn rejected_batch_changes_nothing() {
    let store = get_store().await;
    let service = ProductService::new(Arc::new(store.clone()));
    let plenty = create(&service, 10).await;
    let scarce = create(&service, 1).await;

    let items = vec![
        SaleItemMessage::new(plenty, 4),
        SaleItemMessage::new(scarce, 2),
    ];
    let mut tx = store.begin().await.unwrap();
    let result = ledger::adjust_batch(&mut *tx, &items, Direction::Deduct).await;
    assert!(matches!(result, Err(LedgerError::InsufficientStock { .. })));
    drop(tx);

    assert_eq!(service.get_product(plenty).await.unwrap().quantity, 10);
    assert_eq!(service.get_product(scarce).await.unwrap().quantity, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn batch_commits_with_journal_outbox_and_inbox() {
    let store = get_store().await;
    let service = ProductService::new(Arc::new(store.clone()));
    let id = create(&service, 10).await;
    let sale_id = SaleId::new(id.as_i64());
    let items = vec![SaleItemMessage::new(id, 3)];

    let trigger = Envelope::builder()
        .message_type("SalePaid")
        .correlation_key(sale_id.to_string())
        .payload_raw(serde_json::json!({}))
        .try_build()
        .unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(!tx.already_processed("stock", trigger.message_id).await.unwrap());
    ledger::adjust_batch(&mut *tx, &items, Direction::Deduct)
        .await
        .unwrap();
    tx.save_deduction(&SaleDeduction::deducted(sale_id, items.clone()))
        .await
        .unwrap();
    tx.enqueue(OutboxRecord::for_message(&StockSuccess::new(sale_id)).unwrap())
        .await
        .unwrap();
    tx.record_processed(InboxRecord::for_envelope("stock", &trigger))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(service.get_product(id).await.unwrap().quantity, 7);

    let mut tx = store.begin().await.unwrap();
    assert!(tx.already_processed("stock", trigger.message_id).await.unwrap());
    let mut entry = tx.load_deduction(sale_id).await.unwrap().unwrap();
    assert_eq!(entry.state, DeductionState::Deducted);
    assert_eq!(entry.items, items);
    entry.mark_returned();
    tx.save_deduction(&entry).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let entry = tx.load_deduction(sale_id).await.unwrap().unwrap();
    assert_eq!(entry.state, DeductionState::Returned);

    let pending = store
        .outbox_source()
        .fetch_pending(100)
        .await
        .unwrap();
    assert!(
        pending
            .iter()
            .any(|r| r.message_type == "StockSuccess" && r.correlation_key == sale_id.to_string())
    );
}
