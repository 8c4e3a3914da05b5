//! HTTP server for health, catalog and metrics endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use fedcat_core::health::{ComponentStatus, HealthCheck, HealthStatus};
use fedcat_core::metrics::CatalogMetrics;
use fedcat_core::CatalogDispatcher;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, OnceCell};
use tracing::{error, info};

/// Shared state for HTTP endpoints.
///
/// The servers come up before the connectors do; `dispatcher` is set once
/// the registry is built and stays set.
pub struct ServerState {
    pub health: Arc<HealthCheck>,
    pub metrics: Arc<CatalogMetrics>,
    pub dispatcher: OnceCell<Arc<CatalogDispatcher>>,
}

/// Health response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentStatusResponse>,
}

/// Component status response.
#[derive(Debug, Serialize)]
pub struct ComponentStatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&ComponentStatus> for ComponentStatusResponse {
    fn from(status: &ComponentStatus) -> Self {
        let (status, message) = match status {
            ComponentStatus::Healthy => ("healthy", None),
            ComponentStatus::Degraded(msg) => ("degraded", Some(msg.clone())),
            ComponentStatus::Unhealthy(msg) => ("unhealthy", Some(msg.clone())),
            ComponentStatus::Unknown => ("unknown", None),
        };
        ComponentStatusResponse {
            status: status.to_string(),
            message,
        }
    }
}

/// Start the health and metrics servers; returns when either stops or shutdown is signalled.
pub async fn start_server(
    state: Arc<ServerState>,
    health_port: u16,
    metrics_port: u16,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let health_addr = SocketAddr::from(([0, 0, 0, 0], health_port));
    let health_router = Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/catalogs", get(catalogs_handler))
        .with_state(Arc::clone(&state));

    let health_listener = match tokio::net::TcpListener::bind(health_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port = health_port, "Failed to bind health server");
            return;
        }
    };
    info!(port = health_port, "Health server started");

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], metrics_port));
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::clone(&state));

    let metrics_listener = match tokio::net::TcpListener::bind(metrics_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port = metrics_port, "Failed to bind metrics server");
            return;
        }
    };
    info!(port = metrics_port, "Metrics server started");

    let health_server = async {
        axum::serve(health_listener, health_router)
            .await
            .map_err(|e| error!(error = %e, "Health server error"))
    };

    let metrics_server = async {
        axum::serve(metrics_listener, metrics_router)
            .await
            .map_err(|e| error!(error = %e, "Metrics server error"))
    };

    tokio::select! {
        _ = health_server => {}
        _ = metrics_server => {}
        _ = shutdown_rx.recv() => {
            info!("HTTP servers shutting down");
        }
    }
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let report = state.health.report();
    let response = HealthResponse {
        status: report.status.as_str().to_string(),
        ready: report.ready && state.dispatcher.initialized(),
        uptime_seconds: report.uptime_seconds,
        components: report
            .components
            .iter()
            .map(|(k, v)| (k.clone(), ComponentStatusResponse::from(v)))
            .collect(),
    };
    (status_code(report.status), Json(response))
}

/// Liveness: the process is up and nothing is unhealthy.
async fn healthz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    status_code(state.health.overall_status())
}

/// Readiness: the connector registry is built and serving.
async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.dispatcher.initialized() && state.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn catalogs_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.dispatcher.get() {
        Some(dispatcher) => (StatusCode::OK, Json(dispatcher.manager().catalogs())).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.export_prometheus_text(),
    )
}
