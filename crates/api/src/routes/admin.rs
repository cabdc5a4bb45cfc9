//! Operator endpoints for parked messages.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use messaging::{MessageTransport, ParkedMessage};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Transport plus the queues this process consumes.
#[derive(Clone)]
pub struct QueueAdmin {
    pub transport: Arc<dyn MessageTransport>,
    pub queues: Vec<String>,
}

impl QueueAdmin {
    pub fn new(transport: Arc<dyn MessageTransport>, queues: Vec<String>) -> Self {
        Self { transport, queues }
    }

    fn check_queue(&self, queue: &str) -> Result<(), ApiError> {
        if self.queues.iter().any(|q| q == queue) {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("Queue not found: {queue}")))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkedMessageResponse {
    pub delivery_id: i64,
    pub message_id: String,
    pub message_type: String,
    pub correlation_key: String,
    pub payload: serde_json::Value,
    pub reason: String,
    pub parked_at: DateTime<Utc>,
}

impl From<ParkedMessage> for ParkedMessageResponse {
    fn from(parked: ParkedMessage) -> Self {
        Self {
            delivery_id: parked.id.as_i64(),
            message_id: parked.envelope.message_id.to_string(),
            message_type: parked.envelope.message_type,
            correlation_key: parked.envelope.correlation_key,
            payload: parked.envelope.payload,
            reason: parked.reason,
            parked_at: parked.parked_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedriveResponse {
    pub redriven: usize,
}

/// GET /api/admin/queues/{queue}/parked
#[tracing::instrument(skip(admin))]
pub async fn parked(
    State(admin): State<QueueAdmin>,
    Path(queue): Path<String>,
) -> Result<Json<Vec<ParkedMessageResponse>>, ApiError> {
    admin.check_queue(&queue)?;
    let parked = admin.transport.parked(&queue).await?;
    Ok(Json(parked.into_iter().map(Into::into).collect()))
}

/// POST /api/admin/queues/{queue}/redrive — move parked messages back onto the queue.
#[tracing::instrument(skip(admin))]
pub async fn redrive(
    State(admin): State<QueueAdmin>,
    Path(queue): Path<String>,
) -> Result<Json<RedriveResponse>, ApiError> {
    admin.check_queue(&queue)?;
    let redriven = admin.transport.redrive(&queue).await?;
    tracing::info!(%queue, redriven, "Parked messages redriven");
    Ok(Json(RedriveResponse { redriven }))
}
