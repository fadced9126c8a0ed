//! End-to-end pipeline tests against a live gateway.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use sdk_rust::client::decode;
use sdk_rust::{Envelope, GatewayClient};

mod common;
use common::{spawn, test_config, ECHO, NOTES, ORDERS};

type Reply = (StatusCode, Envelope<Value>);

async fn post_order(client: &GatewayClient) -> Reply {
    client
        .call(Method::POST, ORDERS, Some(&json!({"sku": "A-1", "qty": 2})))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_fully_authenticated_request_reaches_handler() {
    let gw = spawn(test_config()).await;

    let (status, env) = post_order(&gw.client("app-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(env.code, 200);
    assert!(!env.trace_id.is_empty());
    let data = env.data.unwrap();
    assert_eq!(data["caller_id"], "app-1");
    assert_eq!(data["subject_id"], "user-1");
    assert_eq!(gw.hits(), 1);

    let logs = gw.store.op_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].trace_id, env.trace_id);
    assert_eq!(logs[0].caller_id.as_deref(), Some("app-1"));
    assert_eq!(logs[0].subject_id.as_deref(), Some("user-1"));
    assert_eq!(logs[0].code, 200);
    assert!(logs[0].params.contains("A-1"));
}

#[tokio::test]
async fn test_trace_id_header_matches_envelope() {
    let gw = spawn(test_config()).await;
    let client = gw.client("app-1");

    let mut request = client.prepare(Method::GET, ORDERS, None).unwrap();
    request.set_header("x-trace-id", "it-trace-42").unwrap();
    request.set_header("x-api-key", "wrong").unwrap();
    let response = client.execute(request).await.unwrap();

    assert_eq!(response.headers()["x-trace-id"], "it-trace-42");
    let (status, env): Reply = decode(response).await.unwrap();
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(env.trace_id, "it-trace-42");
    assert!(env.data.is_none());
}

#[tokio::test]
async fn test_missing_token_is_401() {
    let gw = spawn(test_config()).await;
    let client = GatewayClient::new(&gw.url()).with_app(common::credentials("app-1"));

    let (status, env) = post_order(&client).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(env.message, "token is missing");
    assert_eq!(gw.hits(), 0);
    assert!(gw.store.op_logs().is_empty());
}

#[tokio::test]
async fn test_garbage_token_is_401() {
    let gw = spawn(test_config()).await;
    let client = GatewayClient::new(&gw.url())
        .with_app(common::credentials("app-1"))
        .with_token("not.a.jwt");

    let (status, env) = post_order(&client).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(env.message, "token is invalid");
    assert_eq!(gw.hits(), 0);
}

#[tokio::test]
async fn test_tampered_signature_is_403() {
    let gw = spawn(test_config()).await;
    let client = gw.client("app-1");

    let mut request = client
        .prepare(Method::POST, ORDERS, Some(&json!({"sku": "A-1"})))
        .unwrap();
    request.body = br#"{"sku":"B-2"}"#.to_vec();
    let (status, env): Reply = decode(client.execute(request).await.unwrap()).await.unwrap();

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(env.message, "signature is invalid");
    assert_eq!(gw.hits(), 0);
}

#[tokio::test]
async fn test_required_signature_missing_is_403() {
    let gw = spawn(test_config()).await;
    let client = gw.client("app-1").without_signature();

    let (status, env) = post_order(&client).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(env.message, "signature is required");
}

#[tokio::test]
async fn test_optional_signature_skipped_when_absent() {
    let gw = spawn(test_config()).await;
    let client = gw.client("app-1").without_signature();

    let (status, env) = client
        .call::<Value>(Method::POST, ECHO, Some(&json!({"x": 1})))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(env.data.unwrap()["caller_id"], "app-1");
}

#[tokio::test]
async fn test_replayed_nonce_is_403_and_handler_runs_once() {
    let gw = spawn(test_config()).await;
    let client = gw.client("app-1");

    let request = client.prepare(Method::GET, ORDERS, None).unwrap();
    let (first, _): Reply = decode(client.execute(request.clone()).await.unwrap())
        .await
        .unwrap();
    let (second, env): Reply = decode(client.execute(request).await.unwrap()).await.unwrap();

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::FORBIDDEN);
    assert_eq!(env.message, "nonce has already been used");
    assert_eq!(gw.hits(), 1);
}

#[tokio::test]
async fn test_stale_or_garbled_timestamp() {
    let gw = spawn(test_config()).await;
    let client = gw.client("app-1");
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();

    let mut request = client.prepare(Method::GET, ORDERS, None).unwrap();
    request.set_header("x-timestamp", &(now - 3600).to_string()).unwrap();
    let (status, env): Reply = decode(client.execute(request).await.unwrap()).await.unwrap();
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(env.message, "timestamp expired");

    let mut request = client.prepare(Method::GET, ORDERS, None).unwrap();
    request.set_header("x-timestamp", "yesterday").unwrap();
    let (status, _): Reply = decode(client.execute(request).await.unwrap()).await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(gw.hits(), 0);
}

#[tokio::test]
async fn test_unknown_api_key_is_403() {
    let gw = spawn(test_config()).await;
    let client = gw.client("app-1");

    let mut request = client.prepare(Method::GET, ECHO, None).unwrap();
    request.headers.remove("x-signature");
    request.set_header("x-api-key", "key-nobody").unwrap();
    let (status, env): Reply = decode(client.execute(request).await.unwrap()).await.unwrap();

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(env.message, "api key is invalid");
}

#[tokio::test]
async fn test_disabled_app_is_rejected() {
    let gw = spawn(test_config()).await;

    let (status, env) = gw
        .client("app-off")
        .get::<Value>(ORDERS)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(env.message, "app is invalid");
    assert_eq!(gw.hits(), 0);
}

#[tokio::test]
async fn test_missing_grant_is_403() {
    let gw = spawn(test_config()).await;

    // app-2 holds GET but not POST on orders.
    let (status, env) = post_order(&gw.client("app-2")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(env.message, "permission denied");

    let (status, _) = gw.client("app-2").get::<Value>(ORDERS).await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_per_caller() {
    let mut config = test_config();
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst_size = 2;
    let gw = spawn(config).await;

    let one = gw.client("app-1");
    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(one.get::<Value>(ECHO).await.unwrap().0);
    }
    assert_eq!(statuses[..2], [StatusCode::OK, StatusCode::OK]);
    assert_eq!(statuses[2], StatusCode::TOO_MANY_REQUESTS);

    // A different caller has its own bucket.
    let (status, _) = gw.client("app-2").get::<Value>(ECHO).await.unwrap();
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let (status, _) = one.get::<Value>(ECHO).await.unwrap();
    assert_eq!(status, StatusCode::OK);

    // One second of refill buys exactly one request.
    let (status, env) = one.get::<Value>(ECHO).await.unwrap();
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(env.code, 429);
}

#[tokio::test]
async fn test_expired_token_never_reaches_handler() {
    let gw = spawn(test_config()).await;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let lifetime = gw.state.config.auth.token_ttl_secs;
    let expired = gw.state.tokens.issue_at("user-1", now - lifetime - 120).unwrap();
    let client = GatewayClient::new(&gw.url())
        .with_app(common::credentials("app-1"))
        .with_token(expired);

    let (status, env) = post_order(&client).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(env.code, 401);
    assert_eq!(env.message, "token has expired");
    assert_eq!(gw.hits(), 0);
}

#[tokio::test]
async fn test_rate_limit_holds_under_concurrency() {
    let mut config = test_config();
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst_size = 5;
    let gw = spawn(config).await;

    let started = Instant::now();
    let mut tasks = Vec::new();
    for _ in 0..30 {
        let client = gw.client("app-1");
        tasks.push(tokio::spawn(async move {
            client.get::<Value>(ECHO).await.unwrap().0
        }));
    }

    let mut ok = 0u64;
    for task in tasks {
        let status = task.await.unwrap();
        if status == StatusCode::OK {
            ok += 1;
        } else {
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        }
    }
    let elapsed = started.elapsed().as_secs_f64();

    assert!(ok >= 5);
    assert!((ok as f64) <= 5.0 + elapsed.ceil());
    assert_eq!(gw.hits() as u64, ok);
}

#[tokio::test]
async fn test_concurrent_replays_admit_exactly_one() {
    let gw = spawn(test_config()).await;
    let client = std::sync::Arc::new(gw.client("app-1"));
    let request = client.prepare(Method::GET, ORDERS, None).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let client = client.clone();
        let request = request.clone();
        tasks.push(tokio::spawn(async move {
            client.execute(request).await.unwrap().status()
        }));
    }

    let mut ok = 0;
    for task in tasks {
        if task.await.unwrap() == StatusCode::OK {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(gw.hits(), 1);
}

#[tokio::test]
async fn test_public_ping_and_unknown_path() {
    let gw = spawn(test_config()).await;
    let client = GatewayClient::new(&gw.url());

    let (status, env) = client.get::<Value>("/ping").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(env.data.unwrap(), "pong");

    let (status, env) = client.get::<Value>("/no/such/thing").await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(env.code, 404);
}

#[tokio::test]
async fn test_missing_nonce_cache_is_503() {
    use admin_gateway::store::MemoryStore;
    use admin_gateway::{GatewayServer, GatewayState, Shutdown};
    use std::sync::Arc;

    let state = Arc::new(GatewayState::new(
        test_config(),
        Arc::new(MemoryStore::new()),
        None,
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(GatewayServer::new(state).run(listener, Shutdown::new()));

    let (status, env) = GatewayClient::new(&url).get::<Value>(ORDERS).await.unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(env.code, 503);
}

#[tokio::test]
async fn test_audit_does_not_cap_unsigned_bodies() {
    let gw = spawn(test_config()).await;
    let max = gw.state.config.signature.max_body_bytes;
    let note = "x".repeat(max + 512 * 1024);
    let body = serde_json::to_vec(&json!({ "note": note })).unwrap();

    let response = reqwest::Client::new()
        .post(format!("{}{}", gw.url(), NOTES))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(gw.hits(), 1);
    let logs = gw.store.op_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].path, NOTES);
    assert_eq!(logs[0].params, "");
}

#[tokio::test]
async fn test_audit_captures_small_unsigned_bodies() {
    let gw = spawn(test_config()).await;

    let response = reqwest::Client::new()
        .post(format!("{}{}", gw.url(), NOTES))
        .json(&json!({ "note": "short" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let logs = gw.store.op_logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].params.contains("short"));
}
