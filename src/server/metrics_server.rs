// src/server/metrics_server.rs

use crate::core::metrics::gather_metrics;
use crate::core::state::ClusterState;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the /metrics endpoint, refreshing the
/// dynamic gauges before gathering the full text-format registry.
async fn metrics_handler(state: Arc<ClusterState>) -> impl IntoResponse {
    let smap = state.smap.current();
    crate::core::metrics::SMAP_VERSION.set(smap.version as i64);
    crate::core::metrics::IS_PRIMARY.set(if state.is_primary() { 1 } else { 0 });
    crate::core::metrics::NODES_ONLINE.set((smap.proxies.len() + smap.targets.len()) as i64);
    let rebalancing = state.xactions.running_of_kind(crate::core::xaction::XactKind::Rebalance).is_some();
    crate::core::metrics::REBALANCE_IN_PROGRESS.set(if rebalancing { 1 } else { 0 });

    let body = gather_metrics();
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body)
}

/// Runs a simple HTTP server exposing Prometheus metrics on /metrics.
pub async fn run(state: Arc<ClusterState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = state.config.metrics.port;
    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Prometheus metrics server listening on http://{addr}/metrics");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on port {port}: {e}");
            return;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await
        .unwrap();
}
