//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, Mode};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

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

/// Load, override and validate configuration. `None` starts from defaults.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };
    finish(config, |key| std::env::var(key).ok())
}

/// Parse configuration text and finish it like `load_config`, with an explicit
/// environment lookup.
pub fn load_from_str<F>(content: &str, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config: GatewayConfig = toml::from_str(content)?;
    finish(config, env)
}

fn finish<F>(mut config: GatewayConfig, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, env);
    validate_config(&config).map_err(ConfigError::Validation)?;
    ensure_secret(&mut config);
    Ok(config)
}

/// Overlay `GATEWAY_*` variables on top of file values.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = env("GATEWAY_MODE") {
        match v.to_ascii_lowercase().as_str() {
            "production" => config.mode = Mode::Production,
            "development" => config.mode = Mode::Development,
            other => tracing::warn!(value = %other, "Ignoring unknown GATEWAY_MODE"),
        }
    }
    if let Some(v) = env("GATEWAY_BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = env("GATEWAY_JWT_SECRET") {
        config.auth.jwt_secret = v;
    }
    if let Some(v) = env("GATEWAY_DATABASE_URL") {
        config.database.url = v;
    }
    if let Some(v) = env("GATEWAY_REDIS_URL") {
        config.redis.url = v;
    }
    if let Some(v) = env("GATEWAY_LOG_LEVEL") {
        config.observability.log_level = v;
    }
}

/// Development mode may run without a configured secret; it gets a random
/// one that dies with the process. Production never reaches this branch
/// because validation rejects it.
fn ensure_secret(config: &mut GatewayConfig) {
    if config.auth.jwt_secret.trim().is_empty() {
        let bytes: [u8; 32] = rand::random();
        config.auth.jwt_secret = hex::encode(bytes);
        tracing::warn!("auth.jwt_secret is empty; using an ephemeral development secret");
    }
}
