//! Product catalogue and stock endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Page, PageRequest, ProductId};
use serde::{Deserialize, Serialize};
use stock::{NewProduct, Product, ProductService};

use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStockRequest {
    /// Signed delta; negative deducts.
    pub transaction_amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStockResponse {
    pub product_id: ProductId,
    pub new_quantity: i64,
}

/// POST /api/products
#[tracing::instrument(skip(products, req))]
pub async fn create(
    State(products): State<ProductService>,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = products.create_product(req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/products/{id}
#[tracing::instrument(skip(products))]
pub async fn get(
    State(products): State<ProductService>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(products.get_product(ProductId::new(id)).await?))
}

/// GET /api/products?page=&pageSize=
#[tracing::instrument(skip(products, query))]
pub async fn list(
    State(products): State<ProductService>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<Page<Product>>, ApiError> {
    let request = PageRequest::new(
        query.page.unwrap_or(1),
        query
            .page_size
            .unwrap_or(i64::from(PageRequest::DEFAULT_PAGE_SIZE)),
    );
    Ok(Json(products.list_products(request).await?))
}

/// PATCH /api/products/{id}/stock — apply a signed stock delta.
#[tracing::instrument(skip(products, req), fields(delta = req.transaction_amount))]
pub async fn update_stock(
    State(products): State<ProductService>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStockRequest>,
) -> Result<Json<UpdateStockResponse>, ApiError> {
    let product_id = ProductId::new(id);
    let new_quantity = products
        .update_stock(product_id, req.transaction_amount)
        .await?;
    Ok(Json(UpdateStockResponse {
        product_id,
        new_quantity,
    }))
}
