//! Wiring of stores, transport and saga runtime per service role.

use std::sync::Arc;

use messaging::{InMemoryTransport, MessageTransport, PostgresTransport, RelayConfig};
use saga::{LocalStockClient, RuntimeConfig, SagaCoordinator, SagaRuntime};
use sales::{
    HttpStockClient, InMemorySaleStore, PostgresSaleStore, SaleService, SaleStore, StockClient,
    StockClientConfig, StockClientError,
};
use sqlx::PgPool;
use sqlx::migrate::MigrateError;
use stock::{InMemoryProductStore, PostgresProductStore, ProductService, ProductStore};
use thiserror::Error;

use crate::AppParts;
use crate::config::{Config, ServiceRole};
use crate::routes::admin::QueueAdmin;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] MigrateError),

    #[error("Stock client setup failed: {0}")]
    StockClient(#[from] StockClientError),
}

/// Everything one process hosts: HTTP state and the saga runtime.
pub struct Services {
    pub parts: AppParts,
    pub runtime: SagaRuntime,
}

impl Services {
    /// Both services on in-memory stores and transport, with the sales
    /// service reading stock in process.
    pub fn in_memory(config: RuntimeConfig) -> Self {
        let transport: Arc<dyn MessageTransport> = Arc::new(InMemoryTransport::new());
        let sale_store: Arc<dyn SaleStore> = Arc::new(InMemorySaleStore::new());
        let product_store: Arc<dyn ProductStore> = Arc::new(InMemoryProductStore::new());
        Self::assemble(transport, Some(sale_store), Some(product_store), None, config)
    }

    /// Connects and migrates the stores `config` asks for.
    ///
    /// Stores without a database URL fall back to memory, which only makes
    /// sense for the `all` role.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let transport: Arc<dyn MessageTransport> = match &config.broker_database_url {
            Some(url) => {
                let transport = PostgresTransport::new(PgPool::connect(url).await?);
                transport.run_migrations().await?;
                Arc::new(transport)
            }
            None => Arc::new(InMemoryTransport::new()),
        };

        let product_store: Option<Arc<dyn ProductStore>> = if config.role.hosts_stock() {
            Some(match &config.stock_database_url {
                Some(url) => {
                    let store = PostgresProductStore::new(PgPool::connect(url).await?);
                    store.run_migrations().await?;
                    Arc::new(store)
                }
                None => Arc::new(InMemoryProductStore::new()),
            })
        } else {
            None
        };

        let sale_store: Option<Arc<dyn SaleStore>> = if config.role.hosts_sales() {
            Some(match &config.sales_database_url {
                Some(url) => {
                    let store = PostgresSaleStore::new(PgPool::connect(url).await?);
                    store.run_migrations().await?;
                    Arc::new(store)
                }
                None => Arc::new(InMemorySaleStore::new()),
            })
        } else {
            None
        };

        let remote_stock: Option<Arc<dyn StockClient>> = if config.role == ServiceRole::Sales {
            Some(Arc::new(HttpStockClient::new(StockClientConfig {
                base_url: config.stock_service_url.clone(),
                timeout: config.stock_client_timeout,
                ..StockClientConfig::default()
            })?))
        } else {
            None
        };

        let runtime_config = RuntimeConfig {
            relay: RelayConfig {
                poll_interval: config.outbox_poll_interval,
                ..RelayConfig::default()
            },
            ..RuntimeConfig::default()
        };

        Ok(Self::assemble(
            transport,
            sale_store,
            product_store,
            remote_stock,
            runtime_config,
        ))
    }

    fn assemble(
        transport: Arc<dyn MessageTransport>,
        sale_store: Option<Arc<dyn SaleStore>>,
        product_store: Option<Arc<dyn ProductStore>>,
        remote_stock: Option<Arc<dyn StockClient>>,
        config: RuntimeConfig,
    ) -> Self {
        let mut builder = SagaRuntime::builder(transport.clone(), config);

        let mut products = None;
        if let Some(store) = product_store {
            builder = builder.with_stock(store.clone());
            products = Some(ProductService::new(store));
        }

        let mut sales = None;
        if let Some(store) = sale_store {
            let local = products
                .clone()
                .map(|p| Arc::new(LocalStockClient::new(p)) as Arc<dyn StockClient>);
            match remote_stock.or(local) {
                Some(stock) => {
                    builder = builder.with_sales(store.clone());
                    sales = Some(SagaCoordinator::new(SaleService::new(store, stock)));
                }
                None => tracing::warn!("Sales store configured without a stock client"),
            }
        }

        let runtime = builder.build();
        let queues = runtime.queues().into_iter().map(str::to_string).collect();

        Self {
            parts: AppParts {
                sales,
                products,
                admin: Some(QueueAdmin::new(transport, queues)),
            },
            runtime,
        }
    }
}
