use std::time::Duration;

use async_trait::async_trait;
use common::{Money, ProductId};
use messaging::RetryPolicy;
use messaging::retry::retry_with_predicate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    CircuitBreaker, CircuitBreakerConfig, ProductStockInfo, StockClient, StockClientError,
};

/// Configuration for [`HttpStockClient`].
#[derive(Debug, Clone)]
pub struct StockClientConfig {
    /// Base URL of the stock service, e.g. `http://stock:8080`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Waits between retries of unavailable reads.
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
}

impl Default for StockClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::intervals([Duration::from_millis(200), Duration::from_millis(400)]),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductStockResponse {
    id: ProductId,
    unit_price: Money,
    quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdjustStockRequest {
    transaction_amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustStockResponse {
    new_quantity: i64,
}

/// Stock client over the stock service's HTTP API.
///
/// Every call has a timeout. Timeouts, connection errors and 5xx answers
/// feed the circuit breaker; while the circuit is open calls fail immediately
/// with `CircuitOpen`. Reads are retried per the configured policy.
///
/// Stock adjustments are at most once: a timed out PATCH may still have been
/// applied, so it is never resent and the caller sees `Unavailable`.
#[derive(Clone)]
pub struct HttpStockClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl HttpStockClient {
    pub fn new(config: StockClientConfig) -> Result<Self, StockClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StockClientError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            breaker: CircuitBreaker::new(config.breaker),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn product_url(&self, product_id: ProductId) -> String {
        format!("{}/api/products/{}", self.base_url, product_id)
    }

    /// Runs one attempt through the breaker, classifying the outcome.
    async fn guarded<T, F, Fut>(&self, attempt: F) -> Result<T, StockClientError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, StockClientError>>,
    {
        if !self.breaker.try_acquire().await {
            return Err(StockClientError::CircuitOpen);
        }
        let result = attempt().await;
        match &result {
            Err(StockClientError::Unavailable(_)) => self.breaker.record_failure().await,
            _ => self.breaker.record_success().await,
        }
        result
    }

    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        retry: &RetryPolicy,
        attempt: F,
    ) -> Result<T, StockClientError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, StockClientError>>,
    {
        let result = retry_with_predicate(
            retry,
            || self.guarded(&attempt),
            |e: &StockClientError| matches!(e, StockClientError::Unavailable(_)),
        )
        .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(StockClientError::NotFound(_)) => "not_found",
            Err(StockClientError::InsufficientStock(_)) => "insufficient_stock",
            Err(StockClientError::Unavailable(_)) => "unavailable",
            Err(StockClientError::CircuitOpen) => "circuit_open",
        };
        metrics::counter!("stock_client_requests_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        result
    }
}

fn transport_error(e: reqwest::Error) -> StockClientError {
    StockClientError::Unavailable(e.to_string())
}

fn unexpected_status(status: StatusCode) -> StockClientError {
    StockClientError::Unavailable(format!("unexpected status {status}"))
}

#[async_trait]
impl StockClient for HttpStockClient {
    #[tracing::instrument(skip(self))]
    async fn get_product_stock(
        &self,
        product_id: ProductId,
    ) -> Result<ProductStockInfo, StockClientError> {
        let url = &self.product_url(product_id);
        self.call("get_product_stock", &self.retry, move || async move {
            let response = self.client.get(url).send().await.map_err(transport_error)?;
            match response.status() {
                StatusCode::OK => {
                    let body: ProductStockResponse =
                        response.json().await.map_err(transport_error)?;
                    Ok(ProductStockInfo {
                        product_id: body.id,
                        unit_price: body.unit_price,
                        quantity_on_hand: body.quantity,
                    })
                }
                StatusCode::NOT_FOUND => Err(StockClientError::NotFound(product_id)),
                status => Err(unexpected_status(status)),
            }
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<i64, StockClientError> {
        let url = format!("{}/stock", self.product_url(product_id));
        let url = &url;
        let request = &AdjustStockRequest {
            transaction_amount: delta,
        };
        let once = RetryPolicy::none();
        self.call("adjust_stock", &once, move || async move {
            let response = self
                .client
                .patch(url)
                .json(request)
                .send()
                .await
                .map_err(transport_error)?;
            match response.status() {
                StatusCode::OK => {
                    let body: AdjustStockResponse =
                        response.json().await.map_err(transport_error)?;
                    Ok(body.new_quantity)
                }
                StatusCode::NOT_FOUND => Err(StockClientError::NotFound(product_id)),
                StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                    Err(StockClientError::InsufficientStock(product_id))
                }
                status => Err(unexpected_status(status)),
            }
        })
        .await
    }
}
