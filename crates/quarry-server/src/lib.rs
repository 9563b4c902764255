//! HTTP surface of Quarry

mod cors;
mod error;
mod health;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use quarry_analyst::Analyst;
use quarry_catalog::DatasetCatalog;
use quarry_config::{Config, ServerConfig};
use quarry_llm::CompletionClient;
use quarry_store::SqliteStore;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a backend, the dataset catalog or the store cannot
    /// be initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let client = CompletionClient::from_config(&config.llm)?;

        let catalog = match &config.analyst.catalog {
            Some(path) => DatasetCatalog::load(path)?,
            None => DatasetCatalog::empty(),
        };

        let store = SqliteStore::connect(&config.store).await?;

        tracing::info!(
            backends = client.dispatcher().len(),
            datasets = catalog.len(),
            "analyst ready"
        );

        let analyst = Analyst::new(client, Arc::new(store), Arc::new(catalog), &config.analyst)?;

        Ok(Self::with_analyst(&config.server, analyst))
    }

    /// Build the router around an already assembled analyst
    pub fn with_analyst(config: &ServerConfig, analyst: Analyst) -> Self {
        let listen_address = config
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let mut app = Router::new();

        // Health check
        if config.health.enabled {
            app = app.merge(
                Router::new()
                    .route(&config.health.path, axum::routing::get(health::health_handler))
                    .with_state(analyst.clone()),
            );
        }

        app = app.merge(routes::analytics_router(analyst));

        // Tracing
        app = app.layer(TraceLayer::new_for_http());

        // CORS
        if let Some(ref cors_config) = config.cors {
            app = app.layer(cors::cors_layer(cors_config));
        }

        Self {
            router: app,
            listen_address,
        }
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
