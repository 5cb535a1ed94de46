// src/core/membership/maintenance.rs

//! Graceful node removal: StartMaintenance, ShutdownNode, DecommissionNode,
//! and the inverse StopMaintenance, per §4.4.4-4.4.5.

use super::rebalance;
use crate::core::action_msg::{Action, ActionMsg};
use crate::core::errors::{ClusterError, Result};
use crate::core::meta::{ModifyCtx, NodeFlags, Smap};
use crate::core::net::RevisionPush;
use crate::core::state::ClusterState;
use crate::core::xaction::XactKind;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const FINAL_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const HEALTH_PROBE_MAX_ATTEMPTS: u32 = 5;
const HEALTH_PROBE_BASE_BACKOFF: Duration = Duration::from_millis(500);

pub enum RemovalKind {
    StartMaintenance,
    ShutdownNode,
    DecommissionNode,
}

impl RemovalKind {
    fn pre_flags(&self) -> NodeFlags {
        match self {
            RemovalKind::StartMaintenance | RemovalKind::ShutdownNode => NodeFlags::MAINTENANCE,
            RemovalKind::DecommissionNode => NodeFlags::DECOMMISSIONING,
        }
    }

    fn final_action(&self) -> Action {
        match self {
            RemovalKind::StartMaintenance => Action::StartMaintenance,
            RemovalKind::ShutdownNode => Action::ShutdownNode,
            RemovalKind::DecommissionNode => Action::DecommissionNode,
        }
    }
}

/// Forbidding abort of an in-flight rebalance while any target sits in
/// `maint ∧ ¬maintPostReb` or `decomm` -- prevents abandoning a half-drained
/// node. Checked by the xact-stop handler before calling `XactRegistry::abort`.
pub fn abort_allowed(smap: &Smap) -> bool {
    !smap.has_draining_target()
}

/// Runs the full StartMaintenance / ShutdownNode / DecommissionNode flow:
/// set pre-rebalance flags, bump RMD and wait for the rebalance if one is
/// required, issue the final per-node request, then commit the terminal
/// map change (post-rebalance flag, or removal from Smap).
pub async fn graceful_remove(state: &Arc<ClusterState>, target_id: &str, kind: RemovalKind) -> Result<Option<String>> {
    let prev = state.smap.current();
    let Some(target) = prev.get(target_id) else {
        return Err(ClusterError::not_found(format!("unknown node '{target_id}'")));
    };
    if !target.is_target() {
        return Err(ClusterError::validation("graceful removal only applies to targets"));
    }

    let target_id_owned = target_id.to_string();
    let flags = kind.pre_flags();
    let prev_for_post = (*prev).clone();
    let state_for_post = state.clone();
    let rebalance_id_slot = Arc::new(tokio::sync::Mutex::new(None::<String>));
    let rebalance_id_slot_post = rebalance_id_slot.clone();
    let target_id_for_pre = target_id_owned.clone();

    let installed = state
        .smap
        .modify(
            ModifyCtx::<Smap>::new()
                .pre(move |clone: &mut Smap| {
                    let Some(node) = clone.targets.get_mut(&target_id_for_pre) else {
                        return Err(ClusterError::not_found(format!("unknown target '{target_id_for_pre}'")));
                    };
                    node.flags |= flags;
                    Ok(())
                })
                .post(move |installed| async move {
                    let rebalance_id = rebalance::maybe_trigger(
                        &state_for_post,
                        &prev_for_post,
                        installed.as_ref(),
                        false,
                    )
                    .await;
                    *rebalance_id_slot_post.lock().await = rebalance_id;
                }),
        )
        .await?;

    metasync_smap(state, &installed, kind.final_action()).await;

    let rebalance_id = rebalance_id_slot.lock().await.clone();
    if let Some(rid) = &rebalance_id
        && let Some(xaction_id) = state.xactions.running_of_kind(XactKind::Rebalance)
    {
        info!(rebalance_id = rid, xaction_id, "waiting for rebalance before final node request");
        state.xactions.wait_for_finish(&xaction_id).await;
    }

    let final_action = kind.final_action();
    issue_final_request(state, &target_id_owned, final_action).await;

    let final_installed = match kind {
        RemovalKind::DecommissionNode => {
            state
                .smap
                .modify(ModifyCtx::<Smap>::new().pre({
                    let id = target_id_owned.clone();
                    move |clone: &mut Smap| {
                        *clone = clone.with_node_removed(&id);
                        Ok(())
                    }
                }))
                .await?
        }
        RemovalKind::StartMaintenance | RemovalKind::ShutdownNode => {
            state
                .smap
                .modify(ModifyCtx::<Smap>::new().pre({
                    let id = target_id_owned.clone();
                    move |clone: &mut Smap| {
                        if let Some(node) = clone.targets.get_mut(&id) {
                            node.flags |= NodeFlags::MAINT_POST_REBAL;
                        }
                        Ok(())
                    }
                }))
                .await?
        }
    };
    metasync_smap(state, &final_installed, final_action).await;

    Ok(rebalance_id)
}

/// Inverse of StartMaintenance: health-probe the node with retry-on-503
/// backoff, clear the flags, and trigger a rebalance if at least two active
/// targets remain once the flags are cleared.
pub async fn stop_maintenance(state: &Arc<ClusterState>, target_id: &str) -> Result<Option<String>> {
    let prev = state.smap.current();
    let Some(target) = prev.get(target_id) else {
        return Err(ClusterError::not_found(format!("unknown node '{target_id}'")));
    };
    let https = state.global_config.current().https;
    let health_url = format!("{}/v1/daemon?what=health", target.control_addr.url(https));

    let mut attempt = 0;
    loop {
        attempt += 1;
        match state.client.call_status(Method::GET, &health_url, None::<&()>, HEALTH_PROBE_TIMEOUT, &[]).await {
            Ok(status) if status.as_u16() == 503 && attempt < HEALTH_PROBE_MAX_ATTEMPTS => {
                tokio::time::sleep(HEALTH_PROBE_BASE_BACKOFF * attempt).await;
            }
            Ok(status) if status.is_success() => break,
            Ok(status) => {
                return Err(ClusterError::TransportRetriable {
                    node: target_id.to_string(),
                    detail: format!("health probe returned {status}"),
                });
            }
            Err(e) if attempt < HEALTH_PROBE_MAX_ATTEMPTS => {
                warn!(target_id, attempt, error = %e, "health probe failed, retrying");
                tokio::time::sleep(HEALTH_PROBE_BASE_BACKOFF * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }

    let target_id_owned = target_id.to_string();
    let prev_for_post = (*prev).clone();
    let state_for_post = state.clone();
    let rebalance_id_slot = Arc::new(tokio::sync::Mutex::new(None::<String>));
    let rebalance_id_slot_post = rebalance_id_slot.clone();
    let target_id_for_pre = target_id_owned.clone();

    let installed = state
        .smap
        .modify(
            ModifyCtx::<Smap>::new()
                .pre(move |clone: &mut Smap| {
                    if let Some(node) = clone.targets.get_mut(&target_id_for_pre) {
                        node.flags.remove(NodeFlags::MAINTENANCE | NodeFlags::MAINT_POST_REBAL);
                    }
                    Ok(())
                })
                .post(move |installed| async move {
                    if installed.active_target_count() >= 2 {
                        let rebalance_id = rebalance::maybe_trigger(
                            &state_for_post,
                            &prev_for_post,
                            installed.as_ref(),
                            false,
                        )
                        .await;
                        *rebalance_id_slot_post.lock().await = rebalance_id;
                    }
                }),
        )
        .await?;

    metasync_smap(state, &installed, Action::StopMaintenance).await;
    Ok(rebalance_id_slot.lock().await.clone())
}

async fn issue_final_request(state: &Arc<ClusterState>, target_id: &str, action: Action) {
    let Some(target) = state.smap.current().get(target_id).cloned() else {
        return;
    };
    let https = state.global_config.current().https;
    let url = format!("{}/v1/daemon", target.control_addr.url(https));
    let msg = ActionMsg::new(action).with_name(target_id);
    // Connection reset / EOF on the final shutdown/decommission request is
    // the expected outcome, not a failure: the node is going away.
    if let Err(e) = state.client.call_status(Method::PUT, &url, Some(&msg), FINAL_CALL_TIMEOUT, &[]).await {
        info!(target_id, error = %e, "final node request did not complete cleanly (expected for shutdown/decommission)");
    }
}

async fn metasync_smap(state: &Arc<ClusterState>, installed: &Smap, action: Action) {
    let mut recipients: Vec<_> = installed.proxies.values().cloned().collect();
    recipients.extend(installed.targets.values().cloned());
    let revisions = vec![RevisionPush {
        kind: "smap",
        version: installed.version,
        uuid: installed.uuid.clone(),
        action: ActionMsg::new(action),
        payload: serde_json::to_value(installed).unwrap_or_default(),
    }];
    let deadline = state.global_config.current().timeouts.max_keepalive;
    let https = state.global_config.current().https;
    let outcome = state.metasyncer.sync(&recipients, &revisions, deadline, https).await;
    if !outcome.failed_node_ids.is_empty() {
        warn!(failed = ?outcome.failed_node_ids, "metasync not acknowledged by all nodes");
    }
}
