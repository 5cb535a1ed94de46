// src/server/initialization.rs

//! Handles server initialization: state bootstrap, TLS setup, and binding
//! the listener. Mirrors the teacher's `RawConfig`-resolved-`Config` ->
//! `ServerState::initialize` -> listener-bind sequence.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::membership::client::node_identity_to_snode;
use crate::core::state::ClusterState;
use anyhow::Result;
use axum_server::tls_rustls::RustlsConfig;
use std::net::TcpListener;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Initializes all server components before starting the main loop.
pub async fn setup(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let tls_config = setup_tls(&config).await?;

    let my_node = node_identity_to_snode(&config.node);
    let is_primary = config.primary.bootstrap_url.is_none();
    if is_primary {
        info!(node_id = my_node.id, "no bootstrap primary configured; starting as the founding primary");
    } else {
        info!(
            node_id = my_node.id,
            bootstrap_url = config.primary.bootstrap_url.as_deref().unwrap_or(""),
            "joining an existing cluster"
        );
    }

    let listener = TcpListener::bind((config.host.as_str(), config.port))?;
    listener.set_nonblocking(true)?;
    info!("cplaned listening on {}:{}", config.host, config.port);

    let state = ClusterState::bootstrap(config, my_node, is_primary, log_reload_handle);

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        tls_config,
    })
}

/// Loads the TLS certificate and key if TLS is enabled.
async fn setup_tls(config: &Config) -> Result<Option<RustlsConfig>> {
    if config.tls.enabled {
        info!("TLS is enabled. Loading certificate and key.");
        let tls = RustlsConfig::from_pem_file(&config.tls.cert_path, &config.tls.key_path).await?;
        Ok(Some(tls))
    } else {
        Ok(None)
    }
}

fn log_startup_info(config: &Config) {
    info!(node_id = config.node.id, node_type = %config.node.node_type, "control plane configuration loaded");
    if !config.tls.enabled {
        tracing::warn!("TLS is disabled; intra-cluster traffic is plaintext");
    }
}
