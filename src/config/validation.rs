//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, rate > 0, addresses parse)
//! - Refuse production configs that would run with an empty secret
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, Mode};
use crate::security::token::parse_hmac_algorithm;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.read_secs", timeouts.read_secs),
        ("timeouts.write_secs", timeouts.write_secs),
        ("timeouts.shutdown_grace_secs", timeouts.shutdown_grace_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if parse_hmac_algorithm(&config.auth.jwt_algorithm).is_none() {
        errors.push(ValidationError::new(
            "auth.jwt_algorithm",
            format!("'{}' is not one of HS256, HS384, HS512", config.auth.jwt_algorithm),
        ));
    }
    if config.auth.token_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.token_ttl_secs", "must be greater than zero"));
    }
    if config.mode == Mode::Production && config.auth.jwt_secret.trim().is_empty() {
        errors.push(ValidationError::new(
            "auth.jwt_secret",
            "must be set in production mode",
        ));
    }

    if config.nonce.window_secs == 0 || config.nonce.ttl_secs == 0 {
        errors.push(ValidationError::new(
            "nonce",
            "window_secs and ttl_secs must be greater than zero",
        ));
    }
    if config.signature.max_body_bytes == 0 {
        errors.push(ValidationError::new("signature.max_body_bytes", "must be greater than zero"));
    }
    if config.rate_limit.requests_per_second == 0 {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_second",
            "must be greater than zero",
        ));
    }
    if config.rate_limit.burst_size == 0 {
        errors.push(ValidationError::new("rate_limit.burst_size", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be 'pretty' or 'json'",
        ));
    }

    for (i, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("routes[{}].name", i), "must not be empty"));
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(
                format!("routes[{}].path_prefix", i),
                "must start with '/'",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
