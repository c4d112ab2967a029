//! HTTP exposition of collected counters.
//!
//! `GET /metrics` returns the Prometheus text format; `GET /health` returns
//! a small JSON status document.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{Router, get};
use ifx_collector::{Connector, MetricsHandler, ScrapeEngine};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::{ExporterError, ExporterResult};

/// Shared state behind the HTTP handlers.
pub struct ExporterState<K: Connector> {
    engine: Arc<ScrapeEngine<K>>,
    handler: MetricsHandler,
    on_pull: bool,
    started: Instant,
}

impl<K: Connector> ExporterState<K> {
    /// Creates state serving `engine`.
    ///
    /// When `on_pull` is set every `/metrics` request runs one cycle before
    /// encoding.
    pub fn new(engine: Arc<ScrapeEngine<K>>, on_pull: bool) -> Self {
        let handler = MetricsHandler::new(engine.pull());
        Self {
            engine,
            handler,
            on_pull,
            started: Instant::now(),
        }
    }

    /// Returns the scrape engine.
    pub fn engine(&self) -> &Arc<ScrapeEngine<K>> {
        &self.engine
    }
}

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Scrape cycles completed so far.
    pub cycles_completed: u64,
    /// Instances dropped after exhausting their connection attempts.
    pub excluded: Vec<String>,
}

/// Create the exporter router.
pub fn create_router<K: Connector + 'static>(state: Arc<ExporterState<K>>) -> Router {
    Router::new()
        .route("/metrics", get(metrics::<K>))
        .route("/health", get(health::<K>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Handle GET /metrics.
async fn metrics<K: Connector + 'static>(
    State(state): State<Arc<ExporterState<K>>>,
) -> ExporterResult<Response> {
    if state.on_pull {
        let engine = Arc::clone(&state.engine);
        let stats = tokio::task::spawn_blocking(move || engine.run_cycle())
            .await
            .map_err(|e| ExporterError::CycleAborted(e.to_string()))?;
        debug!(live = stats.live, "pull-triggered cycle finished");
    }

    let response = state.handler.handle();
    debug!(samples = response.samples, "rendered metrics");
    Ok(([(header::CONTENT_TYPE, response.content_type)], response.body).into_response())
}

/// Handle GET /health.
async fn health<K: Connector + 'static>(
    State(state): State<Arc<ExporterState<K>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        cycles_completed: state.engine.cycles_completed(),
        excluded: state.engine.connections().excluded(),
    })
}

/// Metrics server for one scrape engine.
pub struct ExporterServer<K: Connector> {
    state: Arc<ExporterState<K>>,
}

impl<K: Connector + 'static> ExporterServer<K> {
    /// Creates a server over `engine`.
    pub fn new(engine: Arc<ScrapeEngine<K>>, on_pull: bool) -> Self {
        Self {
            state: Arc::new(ExporterState::new(engine, on_pull)),
        }
    }

    /// Returns the router this server serves.
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Serve until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> ExporterResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ExporterError::BindFailed(addr, e))?;

        info!(addr = %addr, "metrics server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ExporterError::Internal(e.to_string()))?;

        info!("metrics server shut down");
        Ok(())
    }
}
