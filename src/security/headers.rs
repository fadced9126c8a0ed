//! Response hardening headers and CORS.
//!
//! # Responsibilities
//! - Add security response headers when enabled
//! - Build the CORS layer from configuration
//!
//! # Design Decisions
//! - Headers are set only when the handler did not set them already
//! - An empty origin list allows any origin

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{CorsConfig, SecurityHeadersConfig};

const SECURITY_HEADERS: &[(HeaderName, &str)] = &[
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::CACHE_CONTROL, "no-store"),
];

/// Headers clients may send through CORS preflight.
const ALLOWED_HEADERS: &[&str] = &[
    "content-type",
    "authorization",
    "x-token",
    "x-api-key",
    "x-app-id",
    "x-signature",
    "x-nonce",
    "x-timestamp",
    "x-trace-id",
];

pub fn apply_security_headers(router: Router, config: &SecurityHeadersConfig) -> Router {
    if !config.enabled {
        return router;
    }
    SECURITY_HEADERS.iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::if_not_present(
            name.clone(),
            HeaderValue::from_static(value),
        ))
    })
}

pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let headers: Vec<HeaderName> = ALLOWED_HEADERS
        .iter()
        .map(|h| HeaderName::from_static(h))
        .collect();

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(headers)
        .expose_headers([HeaderName::from_static("x-trace-id")])
        .max_age(Duration::from_secs(config.max_age_secs));

    if config.allowed_origins.is_empty() || config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    cors
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_security_headers_added() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let router = apply_security_headers(router, &SecurityHeadersConfig { enabled: true });

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_preflight_allows_signature_headers() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&CorsConfig::default()));

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header("origin", "https://console.example")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "x-signature")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
