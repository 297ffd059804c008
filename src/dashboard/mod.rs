//! # Dashboard — HTTP API, Cron Trigger, and Live Updates
//!
//! Runs an Axum HTTP server exposing:
//!
//! - the batch price-check trigger (`/api/cron/check-price`), authenticated
//!   with the `CRON_SECRET` bearer credential and called by an external timer;
//! - the owner-facing product API (`/api/products`), authenticated with
//!   Supabase JWTs;
//! - the owner-scoped activity feeds and WebSocket channel that tell open
//!   dashboards to reload (the cron secret reads the operator-wide feed);
//! - health, readiness, and Prometheus endpoints for the orchestrator.
//!
//! Every request passes through the metrics middleware (request id, tracing
//! span, latency histogram), `TraceLayer`, a body limit, and a deadline.

pub(crate) mod middleware_auth;
mod routes_cron;
mod routes_health;
mod routes_notifications;
mod routes_products;
mod websocket;

use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{delete, get};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use crate::config::Settings;
use crate::db::Database;
use crate::events::EventBus;
use crate::fetcher::ProductFetcher;
use crate::notifier::PriceAlertNotifier;
use crate::prom_metrics;
use crate::store::AdminStore;

/// Credentials checked by the server itself.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Bearer credential for the cron trigger. Unset means the trigger refuses all calls.
    pub cron_secret: Option<String>,
    /// HS256 key for Supabase JWTs. Unset means no request is authenticated.
    pub jwt_secret: Option<String>,
}

pub struct AppState {
    pub db: Database,
    pub admin: Arc<dyn AdminStore>,
    pub fetcher: Arc<dyn ProductFetcher>,
    pub notifier: Arc<dyn PriceAlertNotifier>,
    pub settings: Settings,
    pub secrets: Secrets,
    pub event_bus: Arc<EventBus>,
    pub prom_metrics: prom_metrics::Metrics,
    /// Held for the duration of a batch run; overlapping triggers are refused.
    pub batch_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(
        db: Database,
        admin: Arc<dyn AdminStore>,
        fetcher: Arc<dyn ProductFetcher>,
        notifier: Arc<dyn PriceAlertNotifier>,
        settings: Settings,
        secrets: Secrets,
    ) -> Arc<Self> {
        Arc::new(AppState {
            db,
            admin,
            fetcher,
            notifier,
            settings,
            secrets,
            event_bus: Arc::new(EventBus::new()),
            prom_metrics: prom_metrics::Metrics::new(),
            batch_lock: tokio::sync::Mutex::new(()),
        })
    }
}

/// Middleware that records HTTP request duration into the Prometheus histogram,
/// generates (or propagates) a request ID for correlation, and wraps the
/// request in a tracing span using `.instrument()` for proper async propagation.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %raw_path,
    );
    let mut response = next.run(req).instrument(span).await;

    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(start.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Normalize URL path to collapse high-cardinality segments (UUIDs, numeric IDs)
/// into placeholders, preventing histogram label explosion.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if uuid::Uuid::parse_str(seg).is_ok() {
                ":uuid".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.settings.server.request_timeout_secs);
    Router::new()
        .route("/ws", get(websocket::handler_ws))
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        .route(
            "/api/cron/check-price",
            get(routes_cron::handler_check_price_info).post(routes_cron::handler_check_price),
        )
        .route(
            "/api/products",
            get(routes_products::handler_list_products).post(routes_products::handler_add_product),
        )
        .route(
            "/api/products/{id}",
            delete(routes_products::handler_delete_product),
        )
        .route(
            "/api/products/{id}/history",
            get(routes_products::handler_price_history),
        )
        .route(
            "/api/notifications",
            get(routes_notifications::handler_notification_feed),
        )
        .route("/api/events", get(routes_notifications::handler_event_log))
        .fallback(routes_health::handler_not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .with_state(state)
}

pub async fn run(state: Arc<AppState>, port: u16) -> Result<()> {
    if state.secrets.cron_secret.is_none() {
        warn!("CRON_SECRET not set; the price-check trigger will refuse every call");
    }
    if state.secrets.jwt_secret.is_none() {
        warn!("SUPABASE_JWT_SECRET not set; product API requests will be unauthorized");
    }
    let app = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "pricewatch server running");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
