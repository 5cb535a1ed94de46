// src/core/http/daemon.rs

//! PUT /v1/daemon (admin action targeted at this single node) and
//! POST /v1/daemon/force-join (prepare-phase reachability confirmation for
//! the forced-primary protocol), per §6.

use crate::core::action_msg::{Action, ActionMsg};
use crate::core::errors::{ClusterError, Result};
use crate::core::meta::Smap;
use crate::core::state::ClusterState;
use axum::Json;
use axum::extract::State;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Actions that legitimately arrive here target a node other than the
/// primary itself (GFN pre-announcement, lifecycle directives on this
/// process as a fellow cluster member). This crate models only the proxy
/// role, so target-directed actions (`start-gfn`/`stop-gfn`) are simply
/// acknowledged; proxy-directed lifecycle actions are logged.
pub async fn put_daemon(State(state): State<Arc<ClusterState>>, Json(msg): Json<ActionMsg>) -> Result<Json<serde_json::Value>> {
    match msg.action {
        Action::StartGfn | Action::StopGfn => {
            info!(target = ?msg.name, action = %msg.action, "GFN directive noted (target-side data path is out of scope)");
        }
        Action::ShutdownCluster | Action::DecommissionCluster => {
            info!(node_id = state.my_id, action = %msg.action, "cluster lifecycle directive received; process shutdown orchestration is out of scope of the control plane core");
        }
        Action::StartMaintenance | Action::ShutdownNode | Action::DecommissionNode | Action::StopMaintenance => {
            info!(target = ?msg.name, action = %msg.action, "maintenance directive noted for this node");
        }
        other => {
            warn!(action = %other, "unexpected action on /v1/daemon");
        }
    }
    Ok(Json(json!({})))
}

/// Confirms this member can reach the proposed new primary before the
/// current primary commits to the merge.
pub async fn post_force_join(State(state): State<Arc<ClusterState>>, Json(msg): Json<ActionMsg>) -> Result<Json<serde_json::Value>> {
    let new_smap: Smap = msg
        .value
        .ok_or_else(|| ClusterError::validation("force-join requires the new Smap in 'value'"))
        .and_then(|v| serde_json::from_value(v).map_err(|e| ClusterError::validation(format!("invalid Smap: {e}"))))?;

    let Some(new_primary) = new_smap.primary() else {
        return Err(ClusterError::validation("new Smap has no primary"));
    };

    let https = state.global_config.current().https;
    let url = format!("{}/v1/cluster?what=sysinfo", new_primary.control_url(https));
    state
        .client
        .call_status(Method::GET, &url, None::<&()>, HEALTH_PING_TIMEOUT, &[])
        .await
        .map_err(|e| ClusterError::TransportRetriable {
            node: new_primary.id.clone(),
            detail: format!("cannot reach proposed new primary: {e}"),
        })?;

    Ok(Json(json!({ "reachable": true })))
}
