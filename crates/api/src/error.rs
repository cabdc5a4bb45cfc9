//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use messaging::MessagingError;
use saga::SagaError;
use sales::{SaleError, StockClientError};
use stock::LedgerError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    Sale(SaleError),
    Stock(LedgerError),
    Saga(SagaError),
    Messaging(MessagingError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Sale(err) => (sale_status(&err), err.to_string()),
            ApiError::Stock(err) => (ledger_status(&err), err.to_string()),
            ApiError::Saga(err) => (saga_status(&err), err.to_string()),
            ApiError::Messaging(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        } else {
            tracing::warn!(%status, error = %message, "request rejected");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn sale_status(err: &SaleError) -> StatusCode {
    match err {
        SaleError::Validation(_) => StatusCode::BAD_REQUEST,
        SaleError::NotFound(_) | SaleError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        SaleError::InvalidState { .. } | SaleError::ConcurrencyConflict { .. } => {
            StatusCode::CONFLICT
        }
        SaleError::StockClient(err) => stock_client_status(err),
        SaleError::Messaging(_) | SaleError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn stock_client_status(err: &StockClientError) -> StatusCode {
    match err {
        StockClientError::NotFound(_) => StatusCode::NOT_FOUND,
        StockClientError::InsufficientStock(_) => StatusCode::CONFLICT,
        StockClientError::Unavailable(_) | StockClientError::CircuitOpen => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InsufficientStock { .. } => StatusCode::CONFLICT,
        LedgerError::Messaging(_) | LedgerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::CompensationFailure { .. } | SagaError::Messaging(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        SagaError::Sale(err) => sale_status(err),
        SagaError::Ledger(err) => ledger_status(err),
    }
}

impl From<SaleError> for ApiError {
    fn from(err: SaleError) -> Self {
        ApiError::Sale(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Stock(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<MessagingError> for ApiError {
    fn from(err: MessagingError) -> Self {
        ApiError::Messaging(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{ProductId, SaleId, Version};
    use sales::SaleStatus;

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            sale_status(&SaleError::Validation("empty".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            sale_status(&SaleError::NotFound(SaleId::new(1))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            sale_status(&SaleError::InvalidState {
                current: SaleStatus::PendingPayment,
                action: "ship",
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            sale_status(&SaleError::ConcurrencyConflict {
                sale_id: SaleId::new(1),
                expected: Version::initial(),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ledger_status(&LedgerError::InsufficientStock {
                product_id: ProductId::new(1),
                available: 0,
                requested: 1,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            saga_status(&SagaError::from(StockClientError::CircuitOpen)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            saga_status(&SagaError::Ledger(LedgerError::ProductNotFound(ProductId::new(9)))),
            StatusCode::NOT_FOUND
        );
    }
}
