use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::metrics;
use crate::rate_limit::RateDecision;
use crate::state::AppState;
use crate::usage::{self, RequestEvent};

/// Client identifier used for accounting and rate limiting: the peer
/// address when the server was started with connect info.
pub fn client_ip<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// =============================================================================
// Request ID
// =============================================================================

pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    // Preserve an incoming request id, otherwise generate one
    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(req_id_value) = req_id_value else {
        return next.run(req).await;
    };

    // Downstream access (trace span)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

// =============================================================================
// Usage accounting
// =============================================================================

/// Times the request, records HTTP metrics and hands the request event to
/// the usage accountant in a background task.
pub async fn usage_accounting(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let ip = client_ip(&req);
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    metrics::record_http_request(&method, &path, status, elapsed);

    if state.usage.is_enabled() && !usage::is_exempt(&path) {
        let event = RequestEvent::new(&method, &path, status, elapsed.as_secs_f64() * 1000.0, &ip);
        let accountant = state.usage.clone();
        tokio::spawn(async move {
            accountant.record(&event).await;
        });
    }

    response
}

// =============================================================================
// Rate limiting
// =============================================================================

pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.rate_limiter.is_enabled() || usage::is_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    let client = client_ip(&req);
    match state.rate_limiter.check(&client).await {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::Limited {
            window,
            retry_after,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            Json(json!({
                "detail": format!("Rate limit exceeded: too many requests per {}", window.label())
            })),
        )
            .into_response(),
    }
}

// =============================================================================
// Security headers
// =============================================================================

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("content-security-policy", "default-src 'self'"),
];

pub async fn security_headers(req: Request<Body>, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKv;
    use crate::config::AppConfig;
    use axum::{Router, middleware::from_fn, middleware::from_fn_with_state, routing::get};
    use rollcall_notifications::LogSmsAdapter;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn limited_state(per_minute: u64) -> AppState {
        let mut config = AppConfig::default();
        config.rate_limit.per_minute = per_minute;
        AppState::new(
            config,
            rollcall_db_memory::create_memory_store(),
            Arc::new(MemoryKv::new()),
            Arc::new(LogSmsAdapter),
        )
    }

    fn limited_router(state: AppState) -> Router {
        Router::new()
            .route("/students", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(from_fn_with_state(state, rate_limit))
            .layer(from_fn(security_headers))
    }

    fn request(path: &str) -> Request<Body> {
        let mut req = Request::builder().uri(path).body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 20], 4000))));
        req
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_over_threshold() {
        let app = limited_router(limited_state(2));

        for _ in 0..2 {
            let res = app.clone().oneshot(request("/students")).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        let res = app.clone().oneshot(request("/students")).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[header::RETRY_AFTER], "60");
        assert_eq!(res.headers()["x-frame-options"], "DENY");

        // Exempt paths bypass the limiter.
        let res = app.oneshot(request("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_request_id_generated_or_propagated() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn(request_id));

        let res = app.clone().oneshot(request("/")).await.unwrap();
        let generated = res.headers()["x-request-id"].to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&generated).is_ok());

        let mut req = request("/");
        req.headers_mut()
            .insert("x-request-id", HeaderValue::from_static("req-42"));
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.headers()["x-request-id"], "req-42");
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut req = Request::new(());
        assert_eq!(client_ip(&req), "unknown");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5000))));
        assert_eq!(client_ip(&req), "10.0.0.7");
    }
}
