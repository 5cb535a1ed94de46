// src/core/metrics.rs

//! Process metrics exposed on the dedicated metrics listener (see
//! `server::metrics_server`). Gauges and counters mirror the health signals
//! an operator dashboards against: membership size, primary status,
//! in-flight rebalance, and request/push volumes.

use lazy_static::lazy_static;
use prometheus::{
    IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder, register_int_counter,
    register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    pub static ref SMAP_VERSION: IntGauge =
        register_int_gauge!("cplane_smap_version", "Current Smap version").unwrap();

    pub static ref IS_PRIMARY: IntGauge =
        register_int_gauge!("cplane_is_primary", "1 if this process is the cluster primary").unwrap();

    pub static ref NODES_ONLINE: IntGauge =
        register_int_gauge!("cplane_nodes_online", "Count of proxies+targets currently in Smap").unwrap();

    pub static ref REBALANCE_IN_PROGRESS: IntGauge = register_int_gauge!(
        "cplane_rebalance_in_progress",
        "1 if a rebalance xaction is currently running"
    )
    .unwrap();

    pub static ref JOIN_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        Opts::new("cplane_join_requests_total", "Join requests handled, by kind and outcome"),
        &["kind", "outcome"]
    )
    .unwrap();

    pub static ref KEEPALIVE_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        Opts::new("cplane_keepalive_requests_total", "Keepalive requests handled, by path taken"),
        &["path"]
    )
    .unwrap();

    pub static ref METASYNC_PUSHES_TOTAL: IntCounter = register_int_counter!(
        "cplane_metasync_pushes_total",
        "Metasync push attempts (one per recipient per sync/notify call)"
    )
    .unwrap();

    pub static ref METASYNC_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "cplane_metasync_failures_total",
        "Metasync pushes that exhausted retries without acknowledgement"
    )
    .unwrap();

    pub static ref NODE_REMOVALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        Opts::new("cplane_node_removals_total", "Nodes removed from Smap, by reason"),
        &["reason"]
    )
    .unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text
/// format. The `register_*!` macros above register into the process-wide
/// default registry on first access to each `lazy_static`, so there is no
/// separate init step -- the first request that touches any gauge/counter
/// (directly, or via this function observing them) is sufficient.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
