//! PostgreSQL transport integration tests
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p messaging --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use messaging::{Envelope, MessageTransport, MessagingError, PostgresTransport};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

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
            PostgresTransport::new(pool.clone())
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

async fn get_transport() -> PostgresTransport {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();
    PostgresTransport::new(pool)
}

/// Queue and message type names unique to one test.
fn names() -> (String, String) {
    let suffix = Uuid::new_v4().simple().to_string();
    (format!("queue-{suffix}"), format!("Type{suffix}"))
}

fn envelope(message_type: &str) -> Envelope {
    Envelope::builder()
        .message_type(message_type)
        .correlation_key("1")
        .payload_raw(serde_json::json!({"saleId": 1}))
        .try_build()
        .unwrap()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn publish_routes_to_bound_queues() {
    let transport = get_transport().await;
    let (queue, message_type) = names();
    let other = format!("{queue}-other");
    transport.bind(&queue, &message_type).await.unwrap();
    transport.bind(&queue, &message_type).await.unwrap();
    transport.bind(&other, &message_type).await.unwrap();

    let sent = envelope(&message_type);
    transport.publish(&sent).await.unwrap();

    let first = transport.receive(&queue).await.unwrap().unwrap();
    let second = transport.receive(&other).await.unwrap().unwrap();
    assert_eq!(first.envelope.message_id, sent.message_id);
    assert_eq!(second.envelope.message_id, sent.message_id);
    assert_ne!(first.id, second.id);
    assert_eq!(first.delivery_count, 1);

    assert!(transport.receive(&queue).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn unbound_message_type_is_refused() {
    let transport = get_transport().await;
    let (queue, message_type) = names();
    let sent = envelope(&message_type);

    let result = transport.publish(&sent).await;
    assert!(matches!(result, Err(MessagingError::NoRoute(t)) if t == message_type));
    assert!(transport.receive(&queue).await.unwrap().is_none());

    transport.bind(&queue, &message_type).await.unwrap();
    transport.publish(&sent).await.unwrap();
    let delivery = transport.receive(&queue).await.unwrap().unwrap();
    assert_eq!(delivery.envelope.message_id, sent.message_id);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn ack_removes_and_release_redelivers() {
    let transport = get_transport().await;
    let (queue, message_type) = names();
    transport.bind(&queue, &message_type).await.unwrap();
    transport.publish(&envelope(&message_type)).await.unwrap();
    transport.publish(&envelope(&message_type)).await.unwrap();

    let first = transport.receive(&queue).await.unwrap().unwrap();
    transport.release(&first).await.unwrap();
    let again = transport.receive(&queue).await.unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.delivery_count, 2);
    transport.ack(&again).await.unwrap();

    let second = transport.receive(&queue).await.unwrap().unwrap();
    assert_ne!(second.id, first.id);
    transport.ack(&second).await.unwrap();
    assert!(transport.receive(&queue).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn expired_lease_is_redelivered() {
    let transport = get_transport()
        .await
        .with_lease(Duration::from_millis(200));
    let (queue, message_type) = names();
    transport.bind(&queue, &message_type).await.unwrap();
    transport.publish(&envelope(&message_type)).await.unwrap();

    let leased = transport.receive(&queue).await.unwrap().unwrap();
    assert!(transport.receive(&queue).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let redelivered = transport.receive(&queue).await.unwrap().unwrap();
    assert_eq!(redelivered.id, leased.id);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn park_and_redrive() {
    let transport = get_transport().await;
    let (queue, message_type) = names();
    transport.bind(&queue, &message_type).await.unwrap();
    let sent = envelope(&message_type);
    transport.publish(&sent).await.unwrap();

    let delivery = transport.receive(&queue).await.unwrap().unwrap();
    transport.park(&delivery, "handler gave up").await.unwrap();
    assert!(transport.receive(&queue).await.unwrap().is_none());

    let parked = transport.parked(&queue).await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].queue, queue);
    assert_eq!(parked[0].reason, "handler gave up");
    assert_eq!(parked[0].envelope.message_id, sent.message_id);

    assert_eq!(transport.redrive(&queue).await.unwrap(), 1);
    assert!(transport.parked(&queue).await.unwrap().is_empty());
    let back = transport.receive(&queue).await.unwrap().unwrap();
    assert_eq!(back.envelope.message_id, sent.message_id);
}
