//! Request entry: trace ids, client address, recovery boundary.
//!
//! # Responsibilities
//! - Propagate an inbound `X-Trace-ID` or generate one (UUID v4)
//! - Make the trace id visible to envelopes rendered anywhere downstream
//! - Catch panics from stages and handlers, answering with an Internal envelope
//! - Wrap bare framework error responses (timeouts, 405, 413) in an envelope
//! - Echo the trace id as a response header
//!
//! # Design Decisions
//! - Outermost layer, so every response passes through it
//! - Inbound ids are accepted only when short and plainly formatted

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::context::TraceId;
use crate::http::response::{with_trace_id, Envelope, EnvelopeMeta};
use crate::observability::metrics;

pub const X_TRACE_ID: &str = "x-trace-id";

const MAX_TRACE_ID_LEN: usize = 128;

/// Inbound trace id, if it is safe to echo back.
fn inbound_trace_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(X_TRACE_ID)?.to_str().ok()?.trim();
    let plain = !value.is_empty()
        && value.len() <= MAX_TRACE_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    plain.then(|| value.to_string())
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that keeps the backtrace of the latest panic on the
/// panicking thread, for the recovery boundary to log. Idempotent.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_panic_backtrace() -> String {
    PANIC_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "unavailable".to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

pub async fn trace_middleware(mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    let trace_id = inbound_trace_id(request.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let log_method = method.clone();
    let log_trace_id = trace_id.clone();

    let mut response = with_trace_id(trace_id.clone(), async move {
        match AssertUnwindSafe(next.run(request)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                tracing::error!(
                    trace_id = %log_trace_id,
                    panic = %panic_message(panic.as_ref()),
                    backtrace = %take_panic_backtrace(),
                    method = %log_method,
                    path = %path,
                    "Request handler panicked"
                );
                ApiError::internal("Internal Server Error").into_response()
            }
        }
    })
    .await;

    let status = response.status();
    if (status.is_client_error() || status.is_server_error())
        && response.extensions().get::<EnvelopeMeta>().is_none()
    {
        let (mut parts, _) = response.into_parts();
        let envelope = Envelope::<()> {
            trace_id: trace_id.clone(),
            code: status.as_u16(),
            message: status.canonical_reason().unwrap_or("Error").to_string(),
            data: None,
        }
        .into_response();
        let (env_parts, env_body) = envelope.into_parts();
        parts.headers.remove(axum::http::header::CONTENT_LENGTH);
        for (name, value) in env_parts.headers.iter() {
            parts.headers.insert(name.clone(), value.clone());
        }
        parts.extensions.extend(env_parts.extensions);
        response = Response::from_parts(parts, env_body);
    }

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(X_TRACE_ID, value);
    }

    metrics::record_request(method.as_str(), response.status().as_u16(), started.elapsed());
    response
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer.
pub fn client_ip(parts: &Parts) -> Option<IpAddr> {
    let header_ip = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tower::ServiceExt;
    use tracing_subscriber::fmt::MakeWriter;

    async fn boom() -> Envelope<&'static str> {
        panic!("stage exploded")
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { Envelope::success("fine") }))
            .route("/boom", get(boom))
            .route("/bare", get(|| async { StatusCode::IM_A_TEAPOT }))
            .layer(axum::middleware::from_fn(trace_middleware))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_inbound_trace_id_propagates() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/ok")
                    .header(X_TRACE_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[X_TRACE_ID], "abc-123");
        let json = body_json(response).await;
        assert_eq!(json["trace_id"], "abc-123");
        assert_eq!(json["data"], "fine");
    }

    #[tokio::test]
    async fn test_generates_trace_id_when_absent_or_unsafe() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/ok")
                    .header(X_TRACE_ID, "<script>")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let header = response.headers()[X_TRACE_ID].to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(body_json(response).await["trace_id"], header);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_envelope() {
        let response = app()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let trace = response.headers()[X_TRACE_ID].to_str().unwrap().to_string();
        let json = body_json(response).await;
        assert_eq!(json["code"], 500);
        assert_eq!(json["trace_id"], trace);
        assert!(!json["message"].as_str().unwrap().contains("exploded"));
    }

    #[tokio::test]
    async fn test_panic_log_carries_trace_id_and_backtrace() {
        install_panic_hook();
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/boom")
                    .header(X_TRACE_ID, "panic-trace-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let output = logs.contents();
        assert!(output.contains("Request handler panicked"));
        assert!(output.contains("trace_id=panic-trace-7"));
        assert!(output.contains("stage exploded"));
        assert!(output.contains("backtrace="));
        assert!(!output.contains("backtrace=unavailable"));
    }

    #[tokio::test]
    async fn test_bare_errors_are_enveloped() {
        let response = app()
            .oneshot(Request::builder().uri("/bare").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(body_json(response).await["code"], 418);

        let response = app()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/ok")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let json = body_json(response).await;
        assert_eq!(json["code"], 405);
        assert_eq!(json["message"], "Method Not Allowed");
    }

    #[test]
    fn test_client_ip_precedence() {
        let (mut parts, _) = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap()
            .into_parts();
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_ip(&parts), "203.0.113.7".parse().ok());

        parts.headers.clear();
        assert_eq!(client_ip(&parts), "127.0.0.1".parse().ok());
    }
}
