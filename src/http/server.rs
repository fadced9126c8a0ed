//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every endpoint
//! - Wire up middleware (trace ids, tracing spans, CORS, security headers, timeouts)
//! - Attach the authentication pipeline to matched routes
//! - Bind to the listener and drain in-flight requests on shutdown
//!
//! # Layer order (outermost first)
//! ```text
//! security headers → trace_middleware → TraceLayer → CORS → timeouts
//!     → router → pipeline_middleware (route_layer) → handler
//! ```

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::http::request::{install_panic_hook, trace_middleware};
use crate::http::state::GatewayState;
use crate::lifecycle::Shutdown;
use crate::observability::tracing::request_span;
use crate::pipeline::composer::pipeline_middleware;
use crate::security::headers::{apply_security_headers, cors_layer};

/// HTTP server for the admin gateway.
pub struct GatewayServer {
    router: Router,
    state: Arc<GatewayState>,
}

impl GatewayServer {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self::with_routes(state, Router::new())
    }

    /// Build a server that also serves `extra` behind the same pipeline.
    pub fn with_routes(state: Arc<GatewayState>, extra: Router<Arc<GatewayState>>) -> Self {
        let router = Self::build_router(state.clone(), extra);
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: Arc<GatewayState>, extra: Router<Arc<GatewayState>>) -> Router {
        let config = state.config.clone();
        install_panic_hook();

        let mut app = admin::routes()
            .merge(extra)
            .route_layer(from_fn_with_state(state.clone(), pipeline_middleware))
            .fallback(admin::handlers::not_found)
            .with_state(state)
            .layer(RequestBodyTimeoutLayer::new(Duration::from_secs(
                config.timeouts.read_secs,
            )))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.write_secs)));

        if config.cors.enabled {
            app = app.layer(cors_layer(&config.cors));
        }

        let app = app
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(from_fn(trace_middleware));

        apply_security_headers(app, &config.security_headers)
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Once `shutdown` triggers, the listener stops accepting and in-flight
    /// requests get `timeouts.shutdown_grace_secs` to finish.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let grace = Duration::from_secs(self.state.config.timeouts.shutdown_grace_secs);
        tracing::info!(
            address = %addr,
            mode = self.state.config.mode.as_str(),
            routes = self.state.routes.routes().len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        let mut stop_accepting = shutdown.subscribe();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                stop_accepting.recv().await;
                tracing::info!("Stopped accepting connections; draining");
            })
            .into_future();

        let mut deadline = shutdown.subscribe();
        let grace_elapsed = async move {
            deadline.recv().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = server => result?,
            _ = grace_elapsed => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Grace period elapsed; abandoning in-flight requests"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
