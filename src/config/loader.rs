//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::schema::{GatewayConfig, RateSpec, StoreKind};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Env { key: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the effective configuration: file (or defaults), then environment
/// overrides, then a generated secret if none was supplied, then validation.
pub fn load(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    ensure_jwt_secret(&mut config);

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply the deployment environment variables on top of `config`.
///
/// `lookup` abstracts the environment so overrides can be exercised without
/// mutating process state.
pub fn apply_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("SERVICE_A_URL") {
        set_route(config, "service-a", |r| r.url = url);
    }
    if let Some(url) = lookup("SERVICE_B_URL") {
        set_route(config, "service-b", |r| r.url = url);
    }
    if let Some(path) = lookup("HEALTH_CHECK_SERVICE_A") {
        set_route(config, "service-a", |r| r.health_path = path);
    }
    if let Some(path) = lookup("HEALTH_CHECK_SERVICE_B") {
        set_route(config, "service-b", |r| r.health_path = path);
    }

    if let Some(port) = lookup("PORT") {
        let port: u16 = port.trim().parse().map_err(|_| ConfigError::Env {
            key: "PORT",
            message: format!("'{}' is not a valid port", port),
        })?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    if let Some(debug) = lookup("DEBUG") {
        if debug.trim().eq_ignore_ascii_case("true") {
            config.observability.log_level = "debug".to_string();
        }
    }

    if let Some(secret) = lookup("JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(algorithm) = lookup("JWT_ALGORITHM") {
        config.auth.jwt_algorithm = algorithm;
    }

    if let Some(rate) = lookup("RATE_LIMIT") {
        config.rate_limit.rate = rate
            .parse::<RateSpec>()
            .map_err(|message| ConfigError::Env { key: "RATE_LIMIT", message })?;
    }

    if let Some(redis_url) = lookup("REDIS_URL") {
        config.rate_limit.redis_url = redis_url;
        config.rate_limit.store = StoreKind::Redis;
    }

    if let Some(path) = lookup("HEALTH_CHECK_PATH") {
        config.health.path = path;
    }

    Ok(())
}

fn set_route<F>(config: &mut GatewayConfig, name: &str, apply: F)
where
    F: FnOnce(&mut crate::config::RouteConfig),
{
    match config.routes.iter_mut().find(|r| r.name == name) {
        Some(route) => apply(route),
        None => tracing::warn!(route = name, "Override targets an unknown route, ignoring"),
    }
}

/// Without a configured secret no token can ever verify; generate one so the
/// process still starts, and say so loudly.
pub fn ensure_jwt_secret(config: &mut GatewayConfig) {
    if config.auth.jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET not set, generated a random per-process secret");
        config.auth.jwt_secret = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(43)
            .map(char::from)
            .collect();
    }
}
