// src/core/membership/client.rs

//! The outbound half of the membership protocol: a non-primary node's
//! startup self-join against the configured bootstrap primary, and the
//! periodic keepalive loop that follows once joined. The inbound handling
//! of these same calls lives in [`super::join`].

use crate::core::meta::{NetAddr, Snode};
use crate::core::state::ClusterState;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const JOIN_RETRY_BACKOFF: Duration = Duration::from_secs(2);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct JoinResponse {
    #[serde(rename = "daemon-id")]
    #[allow(dead_code)]
    daemon_id: String,
}

fn my_snode(state: &ClusterState) -> Snode {
    node_identity_to_snode(&state.config.node)
}

/// Builds the Snode descriptor for this process from its static config.
/// Also used at bootstrap time, before a `ClusterState` exists.
pub fn node_identity_to_snode(node: &crate::config::NodeIdentity) -> Snode {
    Snode {
        id: node.id.clone(),
        node_type: node.node_type,
        public_addr: NetAddr {
            host: node.public_addr.host.clone(),
            port: node.public_addr.port,
        },
        control_addr: NetAddr {
            host: node.control_addr.host.clone(),
            port: node.control_addr.port,
        },
        data_addr: NetAddr {
            host: node.data_addr.host.clone(),
            port: node.data_addr.port,
        },
        flags: Default::default(),
    }
}

/// Retries `self-join` against `bootstrap_url` until it succeeds or shutdown
/// is signalled, then hands off into the periodic keepalive loop.
pub async fn run(state: Arc<ClusterState>, bootstrap_url: String, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        let node = my_snode(&state);
        let url = format!("{bootstrap_url}/v1/cluster/self-join");
        let body = serde_json::json!({
            "id": node.id,
            "type": node.node_type,
            "public_addr": node.public_addr,
            "control_addr": node.control_addr,
            "data_addr": node.data_addr,
        });
        match state
            .client
            .call_json::<_, JoinResponse>(Method::POST, &url, Some(&body), JOIN_TIMEOUT, &[])
            .await
        {
            Ok(_) => {
                info!(bootstrap_url, "self-join accepted");
                state.set_ready(true);
                break;
            }
            Err(e) => {
                warn!(bootstrap_url, error = %e, "self-join failed; retrying");
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(JOIN_RETRY_BACKOFF) => {},
            _ = shutdown_rx.recv() => return,
        }
    }

    keepalive_loop(state, shutdown_rx).await;
}

/// Periodically pings the primary so it doesn't reap this node from
/// `last_heard`. Uses the fast-path header form described in §4.4.2; a
/// fresh Smap pulled down via metasync naturally keeps `caller-smap-ver`
/// in sync without this loop needing to track it explicitly.
async fn keepalive_loop(state: Arc<ClusterState>, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        let interval = state.global_config.current().timeouts.max_keepalive / 3;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = shutdown_rx.recv() => return,
        }

        let Some(primary_url) = state.primary_url() else {
            continue;
        };
        let url = format!("{primary_url}/v1/cluster/keepalive");
        let smap = state.smap.current();
        let headers = [
            ("caller-id", state.my_id.clone()),
            ("caller-smap-ver", smap.version.to_string()),
            ("caller-smap-uuid", smap.uuid.clone()),
        ];
        if let Err(e) = state
            .client
            .call_status::<()>(Method::POST, &url, None, KEEPALIVE_TIMEOUT, &headers)
            .await
        {
            error!(primary_url, error = %e, "keepalive to primary failed");
        }
    }
}

/// Reaps nodes the primary hasn't heard from within the configured
/// keepalive deadline. Runs only on the primary.
pub async fn keepalive_sweep(state: Arc<ClusterState>, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        let deadline = state.global_config.current().timeouts.max_keepalive;
        tokio::select! {
            _ = tokio::time::sleep(deadline / 2) => {},
            _ = shutdown_rx.recv() => return,
        }
        if !state.is_primary() {
            continue;
        }
        let smap = state.smap.current();
        let stale: Vec<String> = smap
            .proxies
            .keys()
            .chain(smap.targets.keys())
            .filter(|id| id.as_str() != state.my_id)
            .filter(|id| {
                state
                    .last_heard
                    .get(id.as_str())
                    .map(|t| t.elapsed() > deadline)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        for id in stale {
            warn!(node_id = id, "no keepalive within deadline; flagging for operator attention");
        }
    }
}

