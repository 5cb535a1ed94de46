// src/server/context.rs

use crate::core::state::ClusterState;
use axum_server::tls_rustls::RustlsConfig;
use std::net::TcpListener;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ClusterState>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub tls_config: Option<RustlsConfig>,
}
