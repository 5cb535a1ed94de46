// src/server/spawner.rs

//! Spawns the control plane's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::membership::{client, join};
use tracing::info;

/// Spawns all background tasks into the provided `JoinSet`.
pub async fn spawn_all(ctx: &mut ServerContext) -> anyhow::Result<()> {
    let state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    if state.config.metrics.enabled {
        let metrics_state = state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run(metrics_state, shutdown_rx).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    if state.is_primary() {
        join::replay_registration_pool(state).await;

        let sweep_state = state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            client::keepalive_sweep(sweep_state, shutdown_rx).await;
            Ok(())
        });
    } else if let Some(bootstrap_url) = state.config.primary.bootstrap_url.clone() {
        let join_state = state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            client::run(join_state, bootstrap_url, shutdown_rx).await;
            Ok(())
        });
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
