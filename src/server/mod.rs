// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

mod context;
mod initialization;
mod metrics_server;
mod spawner;

const GRACEFUL_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config, log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>) -> Result<()> {
    let mut ctx = initialization::setup(config, log_reload_handle).await?;

    spawner::spawn_all(&mut ctx).await?;

    let app = crate::core::http::router(ctx.state.clone());
    let handle = axum_server::Handle::new();
    let shutdown_tx = ctx.shutdown_tx.clone();

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        await_shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(());
        signal_handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_GRACE));
    });

    let result = match ctx.tls_config {
        Some(tls) => {
            axum_server::from_tcp_rustls(ctx.listener, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            axum_server::from_tcp(ctx.listener)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };
    result.map_err(Into::into)
}

#[cfg(unix)]
async fn await_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }
}

#[cfg(windows)]
async fn await_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl-C received");
}
