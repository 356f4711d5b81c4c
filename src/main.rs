//! API Gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────▶ http server (request id, trace, timeout)
//!               │
//!               ▼
//!           pipeline: method allow-list → body → transform
//!                     → auth → rate limit → trace context
//!               │
//!               ▼
//!           forwarder: route → cache → circuit breaker
//!                      → retry loop → upstream client ──────▶ Backend
//!               │
//!     ◀──────  response (backend status + JSON body, or {"detail"})
//!
//!     Cross-cutting: config (+ hot reload), observability,
//!                    lifecycle (signals, graceful shutdown)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_gateway::config::loader::{load, ConfigError};
use api_gateway::config::validation::validate_config;
use api_gateway::config::watcher::ConfigWatcher;
use api_gateway::lifecycle::signals::spawn_signal_listener;
use api_gateway::observability::logging::{bootstrap_subscriber, init_logging};
use api_gateway::observability::metrics::init_metrics;
use api_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "Authenticating, rate-limiting API gateway", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults plus environment overrides when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address (e.g. 127.0.0.1:8000).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // The configured subscriber needs the config, so loading logs to stderr
    let mut config = tracing::subscriber::with_default(bootstrap_subscriber(std::io::stderr), || {
        load(args.config.as_deref())
    })?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        rate = %config.rate_limit.rate,
        store = ?config.rate_limit.store,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address, metrics disabled"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher handle must outlive the server for events to keep flowing
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
