//! Configuration file watcher for hot reload.
//!
//! Every modify/create event re-runs the full load (file, environment,
//! validation). Only configurations that pass are forwarded; the server
//! swaps in their route table and keeps everything else.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load, ConfigError};
use crate::config::schema::GatewayConfig;

/// Watches one configuration file and publishes validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for reloaded configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Events stop as soon as the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let watched = path.clone();

        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                tracing::info!(path = %path.display(), "Config file changed");
                if let Err(e) = reload(&path, &update_tx) {
                    tracing::error!(error = %e, "Reload rejected, keeping current configuration");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Config watch error"),
        };

        let mut watcher = RecommendedWatcher::new(
            handler,
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %watched.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Load `path` and publish the result. A closed receiver is not an error.
pub fn reload(path: &Path, tx: &mpsc::UnboundedSender<GatewayConfig>) -> Result<(), ConfigError> {
    let config = load(Some(path))?;
    tracing::debug!(routes = config.routes.len(), "Publishing reloaded configuration");
    let _ = tx.send(config);
    Ok(())
}
