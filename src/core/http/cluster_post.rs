// src/core/http/cluster_post.rs

//! POST /v1/cluster/<op> -- admin-join, self-join, keepalive[/sid], per
//! §4.4.1 and the path table in §6.

use crate::core::errors::{ClusterError, Result};
use crate::core::membership::join;
use crate::core::meta::Snode;
use crate::core::state::ClusterState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Serialize)]
pub struct JoinResponse {
    #[serde(rename = "daemon-id")]
    pub daemon_id: String,
    #[serde(rename = "rebalance-id", skip_serializing_if = "Option::is_none")]
    pub rebalance_id: Option<String>,
}

fn caller_id(headers: &HeaderMap) -> Option<String> {
    headers.get("caller-id").and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn caller_smap_ver(headers: &HeaderMap) -> Option<String> {
    headers.get("caller-smap-ver").and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// The uuid of the cluster the caller currently believes it belongs to, if
/// it has one (e.g. a node rejoining after a restart). Absent for a
/// brand-new candidate that has never joined any cluster.
fn caller_smap_uuid(headers: &HeaderMap) -> Option<String> {
    headers.get("caller-smap-uuid").and_then(|v| v.to_str().ok()).map(str::to_string)
}

pub async fn post_cluster_op(
    State(state): State<Arc<ClusterState>>,
    Path(op): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>> {
    match op.as_str() {
        "confirm-snode" => {
            // admin-join trusts a candidate's own report of itself over
            // whatever descriptor the caller supplied; this is that report.
            // Flags carry over from the current Smap entry, if any, so a
            // re-confirming node doesn't appear to shed maintenance state.
            let node = state.config.node.clone();
            let flags = state.smap.current().get(&node.id).map(|existing| existing.flags).unwrap_or_default();
            let authoritative = Snode {
                id: node.id,
                node_type: node.node_type,
                public_addr: node.public_addr,
                control_addr: node.control_addr,
                data_addr: node.data_addr,
                flags,
            };
            Ok(Json(serde_json::to_value(authoritative).unwrap_or_default()))
        }
        "admin-join" => {
            let claimed: Snode = serde_json::from_slice(&body)
                .map_err(|e| ClusterError::validation(format!("invalid node descriptor: {e}")))?;
            let outcome = join::admin_join(&state, claimed, caller_smap_uuid(&headers)).await?;
            crate::core::metrics::JOIN_REQUESTS_TOTAL.with_label_values(&["admin-join", "ok"]).inc();
            Ok(Json(serde_json::to_value(JoinResponse {
                daemon_id: outcome.daemon_id,
                rebalance_id: outcome.rebalance_id,
            })
            .unwrap_or_default()))
        }
        "self-join" => {
            let node: Snode = serde_json::from_slice(&body)
                .map_err(|e| ClusterError::validation(format!("invalid node descriptor: {e}")))?;
            let interrupted = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("interrupted").or_else(|| v.get("restarted")).and_then(|b| b.as_bool()))
                .unwrap_or(false);
            let outcome = join::self_join(&state, node, interrupted, caller_smap_uuid(&headers)).await?;
            crate::core::metrics::JOIN_REQUESTS_TOTAL.with_label_values(&["self-join", "ok"]).inc();
            Ok(Json(serde_json::to_value(JoinResponse {
                daemon_id: outcome.daemon_id,
                rebalance_id: outcome.rebalance_id,
            })
            .unwrap_or_default()))
        }
        op if op == "keepalive" || op.starts_with("keepalive/") => {
            let caller = caller_id(&headers).ok_or_else(|| ClusterError::validation("missing 'caller-id' header"))?;
            if join::keepalive_fast_path(&state, &caller, caller_smap_ver(&headers).as_deref()) {
                crate::core::metrics::KEEPALIVE_REQUESTS_TOTAL.with_label_values(&["fast"]).inc();
                return Ok(Json(json!({})));
            }
            crate::core::metrics::KEEPALIVE_REQUESTS_TOTAL.with_label_values(&["slow"]).inc();
            let node: Snode = serde_json::from_slice(&body)
                .map_err(|e| ClusterError::validation(format!("invalid node descriptor: {e}")))?;
            let outcome = join::keepalive_slow_path(&state, node, caller_smap_uuid(&headers)).await?;
            Ok(Json(serde_json::to_value(JoinResponse {
                daemon_id: outcome.daemon_id,
                rebalance_id: outcome.rebalance_id,
            })
            .unwrap_or_default()))
        }
        other => Err(ClusterError::validation(format!("unknown join op '{other}'"))),
    }
}
