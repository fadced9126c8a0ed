//! Shared harness for integration tests: a real gateway on an ephemeral port
//! with in-memory store and nonce cache.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use admin_gateway::cache::{MemoryNonceCache, NonceCache};
use admin_gateway::config::{GatewayConfig, PolicyConfig, RouteConfig, SignatureMode};
use admin_gateway::http::{Envelope, GatewayServer, GatewayState, RequestContext};
use admin_gateway::lifecycle::Shutdown;
use admin_gateway::store::{App, AppStatus, GatewayStore, Grant, MemoryStore};
use sdk_rust::{AppCredentials, GatewayClient};

pub const ORDERS: &str = "/api/v1/orders";
pub const ECHO: &str = "/api/v1/echo";
pub const SLOW: &str = "/api/v1/slow";
pub const NOTES: &str = "/api/v1/notes";
pub const JWT_SECRET: &str = "integration-secret";

pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub state: Arc<GatewayState>,
    pub shutdown: Shutdown,
    /// Number of times a business handler ran.
    pub hits: Arc<AtomicUsize>,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestGateway {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn token(&self, user: &str) -> String {
        self.state.tokens.issue(user).unwrap()
    }

    /// Client for `app` carrying a bearer token for `user-1`.
    pub fn client(&self, app: &str) -> GatewayClient {
        GatewayClient::new(&self.url())
            .with_app(credentials(app))
            .with_token(self.token("user-1"))
    }
}

pub fn credentials(app: &str) -> AppCredentials {
    AppCredentials {
        app_id: app.to_string(),
        api_key: format!("key-{}", app),
        secret: format!("secret-{}", app),
    }
}

fn route(name: &str, prefix: &str, priority: u32, policy: PolicyConfig) -> RouteConfig {
    RouteConfig {
        name: name.to_string(),
        path_prefix: prefix.to_string(),
        host: None,
        methods: Vec::new(),
        priority,
        policy,
    }
}

pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst_size = 100;
    config.timeouts.shutdown_grace_secs = 5;
    config.cors.enabled = false;

    config.routes.push(route(
        "orders",
        ORDERS,
        50,
        PolicyConfig {
            nonce: true,
            signature: SignatureMode::Required,
            api_key: true,
            rate_limit: true,
            login: true,
            permission: true,
            audit: true,
        },
    ));
    config.routes.push(route(
        "echo",
        ECHO,
        40,
        PolicyConfig {
            signature: SignatureMode::Optional,
            api_key: true,
            rate_limit: true,
            ..PolicyConfig::default()
        },
    ));
    config.routes.push(route("slow", SLOW, 40, PolicyConfig::default()));
    config.routes.push(route(
        "notes",
        NOTES,
        40,
        PolicyConfig {
            audit: true,
            ..PolicyConfig::default()
        },
    ));
    config
}

fn app(uuid: &str, status: AppStatus) -> App {
    App {
        uuid: uuid.to_string(),
        name: format!("{} service", uuid),
        api_key: format!("key-{}", uuid),
        secret_key: format!("secret-{}", uuid),
        owner_uuid: "owner-1".to_string(),
        status,
    }
}

fn seed(store: &MemoryStore) {
    store.insert_app(app("app-1", AppStatus::Enabled));
    store.insert_app(app("app-2", AppStatus::Enabled));
    store.insert_app(app("app-off", AppStatus::Disabled));

    store.insert_grant(Grant::new("app-1", ORDERS, "GET"));
    store.insert_grant(Grant::new("app-1", ORDERS, "POST"));
    store.insert_grant(Grant::new("app-2", ORDERS, "GET"));
    store.insert_grant(Grant::new("app-off", ORDERS, "GET"));
}

fn business_routes(hits: Arc<AtomicUsize>) -> Router<Arc<GatewayState>> {
    let counted = move |ctx: RequestContext| {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Envelope::success(json!({
                "caller_id": ctx.caller_id(),
                "subject_id": ctx.subject_id(),
            }))
        }
    };

    Router::new()
        .route(ORDERS, get(counted.clone()).post(counted.clone()))
        .route(ECHO, get(counted.clone()).post(counted.clone()))
        .route(NOTES, post(counted))
        .route(
            SLOW,
            get(|| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Envelope::success("done")
            }),
        )
}

pub async fn spawn(config: GatewayConfig) -> TestGateway {
    let store = Arc::new(MemoryStore::new());
    seed(&store);

    let dyn_store: Arc<dyn GatewayStore> = store.clone();
    let cache: Arc<dyn NonceCache> = Arc::new(MemoryNonceCache::new());
    let state = Arc::new(GatewayState::new(config, dyn_store, Some(cache)));

    let hits = Arc::new(AtomicUsize::new(0));
    let server = GatewayServer::with_routes(state.clone(), business_routes(hits.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));

    TestGateway {
        addr,
        store,
        state,
        shutdown,
        hits,
        handle,
    }
}
