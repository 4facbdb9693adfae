use std::future::Future;
use std::net::SocketAddr;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{admin, config::AppConfig, handlers, middleware as app_middleware, state::AppState};

pub struct RollcallServer {
    addr: SocketAddr,
    state: AppState,
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let request_timeout = state.config.request_timeout();

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/readiness", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        // Students
        .route(
            "/students",
            get(handlers::students::list_students).post(handlers::students::create_student),
        )
        .route(
            "/students/{code}",
            get(handlers::students::get_student)
                .put(handlers::students::update_student)
                .delete(handlers::students::delete_student),
        )
        // Attendance
        .route("/attendance/mark", post(handlers::attendance::mark_attendance))
        .route("/attendance", get(handlers::attendance::list_attendance))
        // Usage statistics
        .route("/stats/today", get(handlers::stats::today))
        .route("/stats/slowest", get(handlers::stats::slowest))
        .route("/stats/recent", get(handlers::stats::recent))
        .route("/stats/endpoints/{date}", get(handlers::stats::endpoints_for_date))
        .merge(admin::admin_routes())
        // Middleware stack, innermost first:
        // rate limit -> usage accounting -> security headers -> limits -> cors -> trace -> request id
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::usage_accounting,
        ))
        .layer(middleware::from_fn(app_middleware::security_headers))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .with_state(state)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    state: Option<AppState>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            state: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use prebuilt state instead of connecting the configured backends.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub async fn build(self) -> anyhow::Result<RollcallServer> {
        let state = match self.state {
            Some(state) => state,
            None => AppState::from_config(self.config).await?,
        };
        Ok(RollcallServer {
            addr: self.addr,
            state,
        })
    }
}

impl RollcallServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        serve_with_shutdown(listener, self.state, shutdown_signal()).await
    }
}

/// Serves the application on an already bound listener until `signal`
/// resolves, then closes the document store.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: AppState,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = state.store.clone();
    let app = build_app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await?;
    store.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
