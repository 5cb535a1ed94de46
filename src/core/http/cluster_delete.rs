// src/core/http/cluster_delete.rs

//! DELETE /v1/cluster and DELETE /v1/cluster/daemon/<id> -- self-unregister
//! initiated by a node. The caller must be the node it claims to be: the
//! `caller-id` header must match the path id (when present) or the body.

use crate::core::action_msg::{Action, ActionMsg};
use crate::core::errors::{ClusterError, Result};
use crate::core::meta::ModifyCtx;
use crate::core::net::RevisionPush;
use crate::core::state::ClusterState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde_json::json;
use std::sync::Arc;

pub async fn delete_cluster(State(state): State<Arc<ClusterState>>, headers: HeaderMap) -> Result<Json<serde_json::Value>> {
    let caller = headers
        .get("caller-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ClusterError::validation("missing 'caller-id' header"))?
        .to_string();
    self_remove(&state, &caller).await
}

pub async fn delete_daemon(
    State(state): State<Arc<ClusterState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let caller = headers
        .get("caller-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ClusterError::validation("missing 'caller-id' header"))?;
    if caller != id {
        return Err(ClusterError::validation("caller-id must match the node being unregistered"));
    }
    self_remove(&state, &id).await
}

async fn self_remove(state: &Arc<ClusterState>, node_id: &str) -> Result<Json<serde_json::Value>> {
    let id = node_id.to_string();
    let installed = state
        .smap
        .modify(ModifyCtx::<crate::core::meta::Smap>::new().pre(move |clone| {
            if !clone.contains_id(&id) {
                return Err(ClusterError::not_found(format!("unknown node '{id}'")));
            }
            *clone = clone.with_node_removed(&id);
            Ok(())
        }))
        .await?;

    let mut recipients: Vec<_> = installed.proxies.values().cloned().collect();
    recipients.extend(installed.targets.values().cloned());
    let revisions = vec![RevisionPush {
        kind: "smap",
        version: installed.version,
        uuid: installed.uuid.clone(),
        action: ActionMsg::new(Action::SelfRemove).with_name(node_id),
        payload: serde_json::to_value(&*installed).unwrap_or_default(),
    }];
    let deadline = state.global_config.current().timeouts.max_keepalive;
    let https = state.global_config.current().https;
    state.metasyncer.sync(&recipients, &revisions, deadline, https).await;

    crate::core::metrics::NODE_REMOVALS_TOTAL.with_label_values(&["self-remove"]).inc();
    Ok(Json(json!({})))
}
