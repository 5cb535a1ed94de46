// src/core/http/mod.rs

//! Router assembly for the control plane's external HTTP interface (§6).

pub mod cluster_delete;
pub mod cluster_get;
pub mod cluster_post;
pub mod cluster_put;
pub mod daemon;
pub mod metasync;
pub mod middleware;
pub mod xactions;

use crate::core::state::ClusterState;
use axum::Router;
use axum::routing::{delete, get, post, put};
use std::sync::Arc;

/// Everything an operator or admin tool addresses. Non-primary forwarding
/// and the readiness gate both apply here.
fn external_routes(state: Arc<ClusterState>) -> Router {
    Router::new()
        .route("/v1/cluster", get(cluster_get::get_cluster).put(cluster_put::put_cluster).delete(cluster_delete::delete_cluster))
        .route("/v1/cluster/{op}", post(cluster_post::post_cluster_op))
        .route("/v1/cluster/proxy/{id}", put(cluster_put::put_set_primary))
        .route("/v1/cluster/daemon/{id}", delete(cluster_delete::delete_daemon))
        .route("/v1/daemon", put(daemon::put_daemon))
        .route("/v1/daemon/force-join", post(daemon::post_force_join))
        .route("/v1/xactions", get(xactions::get_xactions).put(xactions::put_xactions))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_ready))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::forward_non_primary))
        .with_state(state)
}

/// Internal node-to-node wire traffic (§4.3's metasync push). Exempt from
/// both the non-primary-forward and readiness gates: metasync is how a
/// node not yet primary-ready receives the revisions that make it ready,
/// and it flows primary-to-peer, not peer-to-primary.
fn internal_routes(state: Arc<ClusterState>) -> Router {
    Router::new()
        .route("/v1/metasync", put(metasync::put_metasync))
        .with_state(state)
}

pub fn router(state: Arc<ClusterState>) -> Router {
    external_routes(state.clone()).merge(internal_routes(state))
}
