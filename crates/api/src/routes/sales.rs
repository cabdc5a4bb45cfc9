//! Sale endpoints: creation, queries and saga triggers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CustomerId, Money, Page, PageRequest, ProductId, SaleId, Version};
use saga::SagaCoordinator;
use sales::{CreateSale, Sale, SaleItem, SaleItemRequest, SaleStatus};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    pub customer_id: CustomerId,
    pub items: Vec<SaleItemRequest>,
    /// Defaults to `PendingPayment`.
    pub initial_status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub new_status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSalesQuery {
    pub page_number: Option<i64>,
    pub page_size: Option<i64>,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub id: Option<SaleId>,
    pub customer_id: CustomerId,
    pub created_at: DateTime<Utc>,
    pub status: SaleStatus,
    pub total: Money,
    pub items: Vec<SaleItemResponse>,
    pub version: Version,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemResponse {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl From<&SaleItem> for SaleItemResponse {
    fn from(item: &SaleItem) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal(),
        }
    }
}

impl From<Sale> for SaleResponse {
    fn from(sale: Sale) -> Self {
        Self {
            id: sale.id(),
            customer_id: sale.customer_id(),
            created_at: sale.created_at(),
            status: sale.status(),
            total: sale.total(),
            items: sale.items().iter().map(SaleItemResponse::from).collect(),
            version: sale.version(),
        }
    }
}

fn parse_status(value: &str) -> Result<SaleStatus, ApiError> {
    value.parse().map_err(ApiError::BadRequest)
}

// -- Handlers --

/// POST /api/sales — create a sale, optionally already paid or shipped.
#[tracing::instrument(skip(coordinator, req), fields(customer_id = %req.customer_id))]
pub async fn create(
    State(coordinator): State<SagaCoordinator>,
    Json(req): Json<CreateSaleRequest>,
) -> Result<(StatusCode, Json<SaleResponse>), ApiError> {
    let initial_status = match req.initial_status.as_deref() {
        Some(value) => parse_status(value)?,
        None => SaleStatus::PendingPayment,
    };

    let sale = coordinator
        .create_sale(CreateSale::new(req.customer_id, req.items), initial_status)
        .await?;

    Ok((StatusCode::CREATED, Json(sale.into())))
}

/// GET /api/sales/{id}
#[tracing::instrument(skip(coordinator))]
pub async fn get(
    State(coordinator): State<SagaCoordinator>,
    Path(id): Path<i64>,
) -> Result<Json<SaleResponse>, ApiError> {
    let sale = coordinator.get_sale(SaleId::new(id)).await?;
    Ok(Json(sale.into()))
}

/// GET /api/sales?pageNumber=&pageSize=
#[tracing::instrument(skip(coordinator, query))]
pub async fn list(
    State(coordinator): State<SagaCoordinator>,
    Query(query): Query<ListSalesQuery>,
) -> Result<Json<Page<SaleResponse>>, ApiError> {
    let request = PageRequest::new(
        query.page_number.unwrap_or(1),
        query
            .page_size
            .unwrap_or(i64::from(PageRequest::DEFAULT_PAGE_SIZE)),
    );
    let page = coordinator.list_sales(request).await?;
    Ok(Json(page.map(SaleResponse::from)))
}

/// PATCH /api/sales/{id}/status — move a sale forward to `newStatus`.
#[tracing::instrument(skip(coordinator, req), fields(new_status = %req.new_status))]
pub async fn update_status(
    State(coordinator): State<SagaCoordinator>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<SaleResponse>, ApiError> {
    let target = parse_status(&req.new_status)?;
    let sale = coordinator.update_status(SaleId::new(id), target).await?;
    Ok(Json(sale.into()))
}

/// PUT /api/sales/{id}/cancel
#[tracing::instrument(skip(coordinator))]
pub async fn cancel(
    State(coordinator): State<SagaCoordinator>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    coordinator.cancel_sale(SaleId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
