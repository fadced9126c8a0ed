//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Deployment mode. Production refuses to start with unsafe defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub mode: Mode,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Connection and shutdown timeouts.
    pub timeouts: TimeoutConfig,

    /// Bearer token settings.
    pub auth: AuthConfig,

    /// Replay protection settings.
    pub nonce: NonceConfig,

    /// Body signature settings.
    pub signature: SignatureConfig,

    /// Per-caller rate limiting.
    pub rate_limit: RateLimitConfig,

    pub database: DatabaseConfig,

    pub redis: RedisConfig,

    pub cors: CorsConfig,

    pub security_headers: SecurityHeadersConfig,

    pub observability: ObservabilityConfig,

    pub audit: AuditConfig,

    /// Route policies, checked by descending priority.
    pub routes: Vec<RouteConfig>,

    /// Policy applied when no route matches.
    pub default_policy: PolicyConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            auth: AuthConfig::default(),
            nonce: NonceConfig::default(),
            signature: SignatureConfig::default(),
            rate_limit: RateLimitConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            cors: CorsConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
            observability: ObservabilityConfig::default(),
            audit: AuditConfig::default(),
            routes: default_routes(),
            default_policy: PolicyConfig {
                login: true,
                ..PolicyConfig::default()
            },
        }
    }
}

fn default_routes() -> Vec<RouteConfig> {
    vec![RouteConfig {
        name: "ping".to_string(),
        path_prefix: "/ping".to_string(),
        host: None,
        methods: vec!["GET".to_string()],
        priority: 100,
        policy: PolicyConfig::default(),
    }]
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to receive a request body, in seconds.
    pub read_secs: u64,

    /// Time allowed to produce a response, in seconds.
    pub write_secs: u64,

    /// How long in-flight requests may run after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 15,
            write_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

/// Bearer token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens. Required in production.
    pub jwt_secret: String,

    /// One of HS256, HS384, HS512.
    pub jwt_algorithm: String,

    /// Lifetime of issued tokens in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_algorithm: "HS256".to_string(),
            token_ttl_secs: 86_400,
        }
    }
}

/// Replay protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NonceConfig {
    /// Maximum distance between client timestamp and server time.
    pub window_secs: u64,

    /// Minimum lifetime of a recorded nonce. A claim is kept longer when its
    /// timestamp stays inside the window beyond this.
    pub ttl_secs: u64,

    pub key_prefix: String,

    /// Sweep interval for the in-memory cache.
    pub purge_interval_secs: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            ttl_secs: 60,
            key_prefix: "Nonce_".to_string(),
            purge_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Largest body the signature stage will buffer.
    pub max_body_bytes: usize,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Refill rate per caller, in tokens per second.
    pub requests_per_second: u32,

    /// Burst capacity per caller.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 100,
            burst_size: 50,
        }
    }
}

/// Database configuration. An empty url selects the in-memory store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    /// Create missing tables at startup.
    pub ensure_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            connect_timeout_secs: 5,
            ensure_schema: true,
        }
    }
}

/// Shared cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis url. Empty means no shared cache is configured.
    pub url: String,

    /// Use a process-local cache when no url is set (single-instance deployments).
    pub memory_fallback: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// Empty list allows any origin.
    pub allowed_origins: Vec<String>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: Vec::new(),
            max_age_secs: 172_800,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    pub enabled: bool,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Operation log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Paths never recorded. A trailing `*` matches by prefix.
    pub skip: Vec<String>,

    /// Request params longer than this are truncated.
    pub max_params_bytes: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            skip: vec!["/ping".to_string()],
            max_params_bytes: 4096,
        }
    }
}

/// Route configuration binding a request pattern to a stage policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Host header to match (exact match).
    #[serde(default)]
    pub host: Option<String>,

    /// Methods to match. Empty matches any method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    #[serde(default)]
    pub policy: PolicyConfig,
}

/// How the signature stage treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    #[default]
    Off,
    /// Verify only when `X-Signature` is present.
    Optional,
    /// Reject requests without `X-Signature`.
    Required,
}

/// Which stages guard a route.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    pub nonce: bool,
    pub signature: SignatureMode,
    pub api_key: bool,
    pub rate_limit: bool,
    pub login: bool,
    pub permission: bool,
    pub audit: bool,
}

