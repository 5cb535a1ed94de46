// src/core/membership/gfn.rs

//! Early get-from-neighbour (GFN): pre-announces an upcoming Smap change to
//! every current target so in-flight reads don't race a map update, then
//! retracts the announcement once the change is committed.

use crate::core::action_msg::{Action, ActionMsg};
use crate::core::errors::{ClusterError, Result};
use crate::core::meta::Smap;
use crate::core::net::Recipients;
use crate::core::state::ClusterState;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const GFN_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the precondition to skip GFN is met: no active targets at all,
/// or the only active target is the one joining/leaving (no one to ask).
pub fn should_skip(smap: &Smap, affected_target_id: &str) -> bool {
    let active = smap.active_target_ids();
    active.is_empty() || (active.len() == 1 && active.contains(affected_target_id))
}

/// Pre-announces `start-gfn` to every active target, keyed by the affected
/// target's id, carrying only the current Smap version. Failures here are
/// fatal to the enclosing join/removal attempt (per §4.4.2, to avoid a
/// silent inconsistency window).
pub async fn start(state: &Arc<ClusterState>, affected_target_id: &str) -> Result<bool> {
    let smap = state.smap.current();
    if should_skip(&smap, affected_target_id) {
        return Ok(false);
    }

    let https = state.global_config.current().https;
    let targets: Vec<_> = smap.targets.values().cloned().collect();
    let recipients = crate::core::net::Broadcaster::select(
        Recipients::AllTargets,
        &[],
        &targets,
        None,
    );

    let msg = ActionMsg::new(Action::StartGfn)
        .with_name(affected_target_id)
        .with_value(serde_json::to_value(smap.version_stub()).unwrap_or_default());

    let results = state
        .broadcaster
        .fanout(Method::PUT, "/v1/daemon", &msg, &recipients, GFN_CALL_TIMEOUT, https)
        .await;

    if let Some(failure) = crate::core::net::Broadcaster::first_failure(&results) {
        return Err(ClusterError::TransportRetriable {
            node: failure.node_id.clone(),
            detail: "start-gfn not acknowledged".to_string(),
        });
    }
    Ok(true)
}

/// Retracts a previously issued `start-gfn`. Non-fatal: a target that
/// misses `stop-gfn` simply times its GFN window out on its own.
pub async fn stop(state: &Arc<ClusterState>, affected_target_id: &str) {
    let smap = state.smap.current();
    let https = state.global_config.current().https;
    let targets: Vec<_> = smap.targets.values().cloned().collect();
    let recipients = crate::core::net::Broadcaster::select(
        Recipients::AllTargets,
        &[],
        &targets,
        None,
    );
    let msg = ActionMsg::new(Action::StopGfn).with_name(affected_target_id);

    let results = state
        .broadcaster
        .fanout(Method::PUT, "/v1/daemon", &msg, &recipients, GFN_CALL_TIMEOUT, https)
        .await;
    if let Some(failure) = crate::core::net::Broadcaster::first_failure(&results) {
        warn!(node_id = failure.node_id, "stop-gfn not acknowledged by at least one target");
    }
}
