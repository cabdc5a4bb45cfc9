//! PostgreSQL implementations.
//!
//! Outbox and inbox tables live in each service's own database and are
//! written through that service's transaction, so this module exposes them
//! as free functions over a connection. The transport owns a separate
//! broker database.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::envelope::{Envelope, MessageId};
use crate::error::{MessagingError, Result};
use crate::inbox::InboxRecord;
use crate::outbox::{OutboxRecord, OutboxSource, OutboxStatus};
use crate::transport::{Delivery, DeliveryId, MessageTransport, ParkedMessage, error_queue};

/// Inserts a pending outbox record through the caller's transaction.
pub async fn insert_outbox_record(conn: &mut PgConnection, record: &OutboxRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox (id, message_type, correlation_key, payload, headers, status, attempts, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(&record.message_type)
    .bind(&record.correlation_key)
    .bind(&record.payload)
    .bind(serde_json::to_value(&record.headers)?)
    .bind(record.status.as_str())
    .bind(record.attempts)
    .bind(record.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Returns true if the inbox already holds `(consumer, message_id)`.
pub async fn inbox_contains(
    conn: &mut PgConnection,
    consumer: &str,
    message_id: MessageId,
) -> Result<bool> {
    let found: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM inbox WHERE consumer = $1 AND message_id = $2")
            .bind(consumer)
            .bind(message_id.as_uuid())
            .fetch_optional(conn)
            .await?;
    Ok(found.is_some())
}

/// Inserts an inbox record through the caller's transaction.
pub async fn insert_inbox_record(conn: &mut PgConnection, record: &InboxRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO inbox (consumer, message_id, message_type, processed_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&record.consumer)
    .bind(record.message_id.as_uuid())
    .bind(&record.message_type)
    .bind(record.processed_at)
    .execute(conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.constraint() == Some("inbox_pkey")
        {
            return MessagingError::DuplicateInboxRecord {
                consumer: record.consumer.clone(),
                message_id: record.message_id,
            };
        }
        MessagingError::Database(e)
    })?;
    Ok(())
}

/// Relay-facing view of a service's outbox table.
#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: PgRow) -> Result<OutboxRecord> {
        let headers_json: serde_json::Value = row.try_get("headers")?;
        let headers: HashMap<String, String> = serde_json::from_value(headers_json)?;
        let status: String = row.try_get("status")?;

        Ok(OutboxRecord {
            id: MessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
            message_type: row.try_get("message_type")?,
            correlation_key: row.try_get("correlation_key")?,
            payload: row.try_get("payload")?,
            headers,
            status: OutboxStatus::parse(&status).unwrap_or(OutboxStatus::Pending),
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            sent_at: row.try_get("sent_at")?,
        })
    }
}

#[async_trait]
impl OutboxSource for PostgresOutbox {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, message_type, correlation_key, payload, headers, status, attempts,
                   last_error, created_at, sent_at
            FROM outbox
            WHERE status = 'pending'
            ORDER BY seq ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn mark_sent(&self, id: MessageId, sent_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE outbox SET status = 'sent', sent_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(sent_at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MessagingError::OutboxRecordNotFound(id));
        }
        Ok(())
    }

    async fn record_failure(&self, id: MessageId, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MessagingError::OutboxRecordNotFound(id));
        }
        Ok(())
    }
}

/// Durable transport backed by a broker database.
///
/// Each bound queue gets its own row per published message. Consumers lease
/// rows with `FOR UPDATE SKIP LOCKED`; a lease that is not settled before it
/// expires makes the row visible again, giving at-least-once delivery.
#[derive(Clone)]
pub struct PostgresTransport {
    pool: PgPool,
    lease: Duration,
}

impl PostgresTransport {
    /// Lease applied when none is configured.
    pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: Self::DEFAULT_LEASE,
        }
    }

    /// Sets how long a received message stays invisible to other consumers.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the broker database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/broker").run(&self.pool).await
    }

    fn row_to_delivery(row: PgRow) -> Result<Delivery> {
        let envelope: serde_json::Value = row.try_get("envelope")?;
        Ok(Delivery {
            id: DeliveryId::new(row.try_get("id")?),
            queue: row.try_get("queue")?,
            envelope: serde_json::from_value(envelope)?,
            delivery_count: row.try_get("delivery_count")?,
        })
    }

    async fn settle(&self, delivery: &Delivery, sql: &str) -> Result<()> {
        let result = sqlx::query(sql)
            .bind(delivery.id.as_i64())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MessagingError::UnknownDelivery(delivery.id));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageTransport for PostgresTransport {
    async fn bind(&self, queue: &str, message_type: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO broker_bindings (queue, message_type)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(queue)
        .bind(message_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn publish(&self, envelope: &Envelope) -> Result<()> {
        let envelope_json = serde_json::to_value(envelope)?;
        let result = sqlx::query(
            r#"
            INSERT INTO broker_messages (queue, message_id, message_type, envelope)
            SELECT queue, $1, $2, $3
            FROM broker_bindings
            WHERE message_type = $2
            "#,
        )
        .bind(envelope.message_id.as_uuid())
        .bind(&envelope.message_type)
        .bind(envelope_json)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MessagingError::NoRoute(envelope.message_type.clone()));
        }
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let row = sqlx::query(
            r#"
            UPDATE broker_messages
            SET state = 'in_flight',
                delivery_count = delivery_count + 1,
                locked_until = now() + make_interval(secs => $2)
            WHERE id = (
                SELECT id FROM broker_messages
                WHERE queue = $1
                  AND (state = 'ready' OR (state = 'in_flight' AND locked_until < now()))
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, queue, envelope, delivery_count
            "#,
        )
        .bind(queue)
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_delivery).transpose()
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.settle(
            delivery,
            "DELETE FROM broker_messages WHERE id = $1 AND state = 'in_flight'",
        )
        .await
    }

    async fn release(&self, delivery: &Delivery) -> Result<()> {
        self.settle(
            delivery,
            r#"
            UPDATE broker_messages
            SET state = 'ready', locked_until = NULL
            WHERE id = $1 AND state = 'in_flight'
            "#,
        )
        .await
    }

    async fn park(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE broker_messages
            SET state = 'parked', queue = $2, parked_reason = $3, parked_at = now(), locked_until = NULL
            WHERE id = $1 AND state = 'in_flight'
            "#,
        )
        .bind(delivery.id.as_i64())
        .bind(error_queue(&delivery.queue))
        .bind(reason)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MessagingError::UnknownDelivery(delivery.id));
        }

        tracing::warn!(
            queue = %delivery.queue,
            message_id = %delivery.envelope.message_id,
            reason,
            "Message parked"
        );
        Ok(())
    }

    async fn parked(&self, queue: &str) -> Result<Vec<ParkedMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, envelope, parked_reason, parked_at
            FROM broker_messages
            WHERE queue = $1 AND state = 'parked'
            ORDER BY id ASC
            "#,
        )
        .bind(error_queue(queue))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<ParkedMessage> {
                let envelope: serde_json::Value = row.try_get("envelope")?;
                let reason: Option<String> = row.try_get("parked_reason")?;
                let parked_at: Option<DateTime<Utc>> = row.try_get("parked_at")?;
                Ok(ParkedMessage {
                    id: DeliveryId::new(row.try_get("id")?),
                    queue: queue.to_string(),
                    envelope: serde_json::from_value(envelope)?,
                    reason: reason.unwrap_or_default(),
                    parked_at: parked_at.unwrap_or_else(Utc::now),
                })
            })
            .collect()
    }

    async fn redrive(&self, queue: &str) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE broker_messages
            SET queue = $1, state = 'ready', delivery_count = 0,
                parked_reason = NULL, parked_at = NULL
            WHERE queue = $2 AND state = 'parked'
            "#,
        )
        .bind(queue)
        .bind(error_queue(queue))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }
}
