use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use moot_core::config::GatewayConfig;
use moot_engine::RunEngine;

use crate::routes;
use crate::state::AppState;

/// Build the axum router: the `/ws` run channel plus the HTTP side-channel.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(routes::ws_handler))
        // REST API
        .route("/api/health", get(routes::health))
        .route("/api/capabilities", get(routes::capabilities))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// WebSocket + HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    engine: Arc<RunEngine>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, engine: Arc<RunEngine>) -> Self {
        Self { config, engine }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.bind).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            engine: self.engine.clone(),
        });
        let app = router(state);

        info!(bind = %listener.local_addr()?, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
