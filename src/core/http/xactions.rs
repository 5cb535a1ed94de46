// src/core/http/xactions.rs

//! PUT/GET /v1/xactions -- the dedicated xaction-management surface listed
//! in §6 alongside (and overlapping with) the `xact-start`/`xact-stop`
//! actions on PUT /v1/cluster and the `what=xaction(s)` queries on
//! GET /v1/cluster.

use crate::core::action_msg::{Action, ActionMsg};
use crate::core::errors::{ClusterError, Result};
use crate::core::membership::maintenance;
use crate::core::state::ClusterState;
use crate::core::xaction::{XactKind, XactSnapshot};
use axum::Json;
use axum::extract::{Query, State};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn parse_kind(msg: &ActionMsg) -> Result<XactKind> {
    match msg.value.as_ref().and_then(|v| v.get("kind")).and_then(|v| v.as_str()) {
        Some("rebalance") => Ok(XactKind::Rebalance),
        Some("resilver") => Ok(XactKind::Resilver),
        Some("blob-download") => Ok(XactKind::BlobDownload),
        _ => Err(ClusterError::validation("xact-start requires value.kind ∈ {rebalance, resilver, blob-download}")),
    }
}

pub async fn put_xactions(State(state): State<Arc<ClusterState>>, Json(msg): Json<ActionMsg>) -> Result<Json<serde_json::Value>> {
    match msg.action {
        Action::XactStart => {
            let kind = parse_kind(&msg)?;
            let tag = msg.name.clone().unwrap_or_default();
            let id = state.xactions.start(kind, tag);
            Ok(Json(json!({ "xaction-id": id })))
        }
        Action::XactStop => {
            let id = msg
                .name
                .clone()
                .ok_or_else(|| ClusterError::validation("xact-stop requires a 'name' field"))?;
            if !maintenance::abort_allowed(&state.smap.current()) {
                return Err(ClusterError::Conflict(
                    "cannot abort rebalance while a target is draining".to_string(),
                ));
            }
            state.xactions.abort(&id).map_err(ClusterError::validation)?;
            Ok(Json(json!({})))
        }
        other => Err(ClusterError::validation(format!("action '{other}' is not valid on PUT /v1/xactions"))),
    }
}

pub async fn get_xactions(
    State(state): State<Arc<ClusterState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>> {
    match params.get("id") {
        Some(id) => {
            let snapshot = state
                .xactions
                .snapshot(id)
                .ok_or_else(|| ClusterError::not_found(format!("unknown xaction '{id}'")))?;
            Ok(Json(serde_json::to_value(snapshot).unwrap_or_default()))
        }
        None => {
            let list: Vec<XactSnapshot> = state.xactions.list();
            Ok(Json(serde_json::to_value(list).unwrap_or_default()))
        }
    }
}
