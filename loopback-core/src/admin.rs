use crate::actor::WeakInterceptorHandle;
use crate::frames::CacheSnapshot;
use crate::Result;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::info;

/// Shared state for metrics
#[derive(Debug, Default)]
pub struct Metrics {
    pub events_processed: AtomicU64,
    pub requests_dispatched: AtomicU64,
    // Interception outcome metrics
    pub static_interceptions: AtomicU64,
    pub dynamic_interceptions: AtomicU64,
    pub handler_declines: AtomicU64,
    pub handler_faults: AtomicU64,
    pub scope_skips: AtomicU64,
    // Frame origin cache gauges
    pub tracked_tabs: AtomicU64,
    pub tracked_frames: AtomicU64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        let dispatched = self.requests_dispatched.load(Ordering::Relaxed);
        let static_hits = self.static_interceptions.load(Ordering::Relaxed);
        let dynamic_hits = self.dynamic_interceptions.load(Ordering::Relaxed);

        let interception_rate = if dispatched > 0 {
            ((static_hits + dynamic_hits) as f64 / dispatched as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            requests_dispatched: dispatched,
            interception: InterceptionMetrics {
                static_hits,
                dynamic_hits,
                handler_declines: self.handler_declines.load(Ordering::Relaxed),
                handler_faults: self.handler_faults.load(Ordering::Relaxed),
                scope_skips: self.scope_skips.load(Ordering::Relaxed),
                interception_rate,
            },
            cache: CacheMetrics {
                tracked_tabs: self.tracked_tabs.load(Ordering::Relaxed),
                tracked_frames: self.tracked_frames.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub requests_dispatched: u64,
    pub interception: InterceptionMetrics,
    pub cache: CacheMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterceptionMetrics {
    pub static_hits: u64,
    pub dynamic_hits: u64,
    pub handler_declines: u64,
    pub handler_faults: u64,
    pub scope_skips: u64,
    pub interception_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub tracked_tabs: u64,
    pub tracked_frames: u64,
}

#[derive(Clone)]
struct AdminState {
    metrics: Arc<Metrics>,
    interceptor: Option<WeakInterceptorHandle>,
}

/// Build the admin router.
///
/// `/frames` is only routed when an interceptor handle is supplied, which
/// callers do in debug mode. The handle is weak so open admin connections
/// never keep the interceptor running.
pub fn admin_router(metrics: Arc<Metrics>, interceptor: Option<WeakInterceptorHandle>) -> Router {
    let expose_frames = interceptor.is_some();
    let state = AdminState {
        metrics,
        interceptor,
    };

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    let router = if expose_frames {
        router.route("/frames", get(frames_handler))
    } else {
        router
    };

    router.with_state(state)
}

/// Serve the admin API until `shutdown` resolves and open connections finish
pub async fn start_admin_server<F>(
    port: u16,
    metrics: Arc<Metrics>,
    interceptor: Option<WeakInterceptorHandle>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = admin_router(metrics, interceptor);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting Admin API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        crate::error::InterceptorError::Network(format!("Failed to bind admin port {}: {}", port, e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::InterceptorError::Network(format!("Admin server failed: {}", e)))?;

    info!("Admin API stopped");
    Ok(())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn metrics_handler(State(state): State<AdminState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn frames_handler(
    State(state): State<AdminState>,
) -> std::result::Result<Json<CacheSnapshot>, StatusCode> {
    let Some(weak) = state.interceptor else {
        return Err(StatusCode::NOT_FOUND);
    };
    let interceptor = weak.upgrade().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    interceptor
        .snapshot()
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}
