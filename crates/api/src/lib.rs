//! HTTP API for the sales and stock services.
//!
//! Serves the sale and product endpoints of whichever services this process
//! hosts, operator endpoints for parked messages, health and Prometheus
//! metrics. Every request carries an `x-correlation-id` header.

pub mod config;
pub mod error;
pub mod routes;
pub mod services;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::routing::{get, patch, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaCoordinator;
use stock::ProductService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use routes::admin::QueueAdmin;

pub use config::{Config, ConfigError, ServiceRole};
pub use error::ApiError;
pub use services::{Services, StartupError};

/// Header carrying the request correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Route state for the services hosted by this process.
#[derive(Clone, Default)]
pub struct AppParts {
    pub sales: Option<SagaCoordinator>,
    pub products: Option<ProductService>,
    pub admin: Option<QueueAdmin>,
}

/// Creates the Axum application router for the hosted services.
pub fn create_app(parts: AppParts, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let mut hosted = Vec::new();
    if parts.sales.is_some() {
        hosted.push("sales");
    }
    if parts.products.is_some() {
        hosted.push("stock");
    }
    let health_router = Router::new()
        .route("/health", get(routes::health::check))
        .with_state(hosted);

    let mut app = Router::new().merge(health_router).merge(metrics_router);

    if let Some(coordinator) = parts.sales {
        app = app.merge(
            Router::new()
                .route(
                    "/api/sales",
                    post(routes::sales::create).get(routes::sales::list),
                )
                .route("/api/sales/{id}", get(routes::sales::get))
                .route("/api/sales/{id}/status", patch(routes::sales::update_status))
                .route("/api/sales/{id}/cancel", put(routes::sales::cancel))
                .with_state(coordinator),
        );
    }

    if let Some(products) = parts.products {
        app = app.merge(
            Router::new()
                .route(
                    "/api/products",
                    post(routes::products::create).get(routes::products::list),
                )
                .route("/api/products/{id}", get(routes::products::get))
                .route(
                    "/api/products/{id}/stock",
                    patch(routes::products::update_stock),
                )
                .with_state(products),
        );
    }

    if let Some(admin) = parts.admin {
        app = app.merge(
            Router::new()
                .route(
                    "/api/admin/queues/{queue}/parked",
                    get(routes::admin::parked),
                )
                .route(
                    "/api/admin/queues/{queue}/redrive",
                    post(routes::admin::redrive),
                )
                .with_state(admin),
        );
    }

    let correlation_header = HeaderName::from_static(CORRELATION_ID_HEADER);

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(
        TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let correlation_id = request
                .headers()
                .get(CORRELATION_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                correlation_id,
            )
        }),
    )
    .layer(PropagateRequestIdLayer::new(correlation_header.clone()))
    .layer(SetRequestIdLayer::new(correlation_header, MakeRequestUuid))
}
