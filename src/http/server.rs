//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the health and pipeline handlers
//! - Wire up middleware (request ID, tracing, request timeout)
//! - Serve on a listener until shutdown
//! - Apply route table updates from the config watcher

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::health::HealthChecker;
use crate::http::request::{MakeRequestUuidV4, X_REQUEST_ID};
use crate::lifecycle::shutdown::wait_for;
use crate::pipeline::{BuildError, Pipeline};
use crate::proxy::{HyperUpstream, Upstream};
use crate::routing::RouteTable;
use crate::security::store::{build_store, CounterStore};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub health: Arc<HealthChecker>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    pipeline: Arc<Pipeline>,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a server with the hyper upstream client and the configured
    /// counter store.
    pub fn new(config: GatewayConfig) -> Result<Self, BuildError> {
        let upstream: Arc<dyn Upstream> = Arc::new(HyperUpstream::new(&config.timeouts));
        let store = build_store(&config.rate_limit)?;
        Self::with_parts(config, upstream, store)
    }

    /// Create a server over explicit collaborators.
    pub fn with_parts(
        config: GatewayConfig,
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, BuildError> {
        let pipeline = Arc::new(Pipeline::new(&config, Arc::clone(&upstream), store)?);
        let state = AppState {
            pipeline: Arc::clone(&pipeline),
            health: Arc::new(HealthChecker::new(upstream)),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            pipeline,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route(&config.health.path, get(health_handler).fallback(health_method_not_allowed))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            health_path = %self.config.health.path,
            "HTTP server starting"
        );

        let pipeline = Arc::clone(&self.pipeline);
        let mut reload_shutdown = shutdown.resubscribe();
        let reloader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => {
                            pipeline.update_routes(RouteTable::from_config(&config.routes));
                            tracing::info!("Reloaded routes; other settings apply on restart");
                        }
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Pipeline entry for every non-health path.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    // Absent when the router is driven without a socket
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    state.pipeline.handle(request, client).await
}

/// Gateway health: one flag per backend, no auth, no rate limiting.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let routes = state.pipeline.forwarder().routes();
    Json(state.health.check_all(&routes).await)
}

async fn health_method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}
