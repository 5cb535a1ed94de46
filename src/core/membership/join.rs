// src/core/membership/join.rs

//! Join state machine: AdminJoin, SelfJoin, and Keepalive (fast + slow
//! path), per §4.4.1.

use super::{gfn, rebalance};
use crate::core::action_msg::{Action, ActionMsg};
use crate::core::errors::{ClusterError, Result};
use crate::core::meta::{ModifyCtx, NodeFlags, Smap, Snode};
use crate::core::net::{Metasyncer, RevisionPush};
use crate::core::state::ClusterState;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CONFIRM_SNODE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct JoinOutcome {
    pub daemon_id: String,
    pub rebalance_id: Option<String>,
}

/// Operator-initiated join: the primary calls the candidate on its control
/// address to obtain its authoritative descriptor (the primary trusts the
/// node's own report of itself, not whatever the caller supplied), then
/// proceeds exactly as a self-join.
pub async fn admin_join(state: &Arc<ClusterState>, claimed: Snode, claimed_cluster_uuid: Option<String>) -> Result<JoinOutcome> {
    let url = format!("{}/v1/cluster/confirm-snode", claimed.control_addr.url(state.global_config.current().https));
    let authoritative: Snode = state
        .client
        .call_json(Method::POST, &url, Some(&claimed), CONFIRM_SNODE_TIMEOUT, &[])
        .await?;
    join_common(state, authoritative, false, false, claimed_cluster_uuid).await
}

/// Node-initiated join at startup. If the primary has not finished
/// bootstrapping, the join is queued in the registration pool instead.
pub async fn self_join(
    state: &Arc<ClusterState>,
    node: Snode,
    interrupted_or_restarted: bool,
    claimed_cluster_uuid: Option<String>,
) -> Result<JoinOutcome> {
    if !state.is_ready() {
        let mut pending = state.registration_pool.pending.lock().await;
        pending.push((node.clone(), claimed_cluster_uuid));
        info!(node_id = node.id, "queued self-join in registration pool; primary not ready");
        return Ok(JoinOutcome {
            daemon_id: node.id,
            rebalance_id: None,
        });
    }
    join_common(state, node, interrupted_or_restarted, false, claimed_cluster_uuid).await
}

/// Replays every self-join queued while the primary was still bootstrapping.
/// Called once after `set_ready(true)`.
pub async fn replay_registration_pool(state: &Arc<ClusterState>) {
    let queued = {
        let mut pending = state.registration_pool.pending.lock().await;
        std::mem::take(&mut *pending)
    };
    for (node, claimed_cluster_uuid) in queued {
        let node_id = node.id.clone();
        if let Err(e) = join_common(state, node, false, false, claimed_cluster_uuid).await {
            warn!(node_id, error = %e, "replayed self-join failed");
        }
    }
}

/// `is_self_update` is set only by `keepalive_slow_path`: the caller already
/// knows `node.id` names an existing descriptor and that it has changed, so
/// the duplicate-id rejection below (meant for a *different* claimant reusing
/// an id) does not apply -- this is the same node reporting a new address.
///
/// `claimed_cluster_uuid`, when present, is the uuid of the cluster the
/// joining node currently believes it belongs to (carried over from a
/// previously-persisted Smap on the candidate's own side, e.g. after a
/// restart). A mismatch against this primary's own Smap uuid means the
/// candidate is trying to join the wrong cluster, and is rejected before any
/// local mutation, mirroring the upstream `validateUUID` cluster-integrity
/// check run on every join/keepalive.
async fn join_common(
    state: &Arc<ClusterState>,
    node: Snode,
    interrupted_or_restarted: bool,
    is_self_update: bool,
    claimed_cluster_uuid: Option<String>,
) -> Result<JoinOutcome> {
    let prev = state.smap.current();

    if let Some(claimed) = claimed_cluster_uuid.as_deref()
        && claimed != prev.uuid
    {
        return Err(ClusterError::ClusterIntegrity {
            local: prev.uuid.clone(),
            remote: claimed.to_string(),
        });
    }

    if !is_self_update
        && let Some(existing) = prev.get(&node.id)
        && existing != &node
    {
        return Err(ClusterError::Conflict(format!("duplicate node ID '{}'", node.id)));
    }
    if let Some(collision) = prev.address_collision(&node) {
        return Err(ClusterError::validation(format!(
            "address collision with existing node '{}'",
            collision.id
        )));
    }

    let is_target = node.is_target();
    let target_id = node.id.clone();

    let gfn_started = if is_target {
        gfn::start(state, &target_id).await?
    } else {
        false
    };

    let mut node_for_pre = node.clone();
    if node_for_pre.is_proxy() {
        node_for_pre.flags |= NodeFlags::IC_MEMBER;
    }

    let prev_for_post = (*prev).clone();
    let rebalance_id_slot: Arc<tokio::sync::Mutex<Option<String>>> = Arc::new(tokio::sync::Mutex::new(None));
    let rebalance_id_slot_post = rebalance_id_slot.clone();
    let state_for_post = state.clone();

    let installed = state
        .smap
        .modify(
            ModifyCtx::<Smap>::new()
                .pre(move |clone: &mut Smap| {
                    *clone = clone.with_node_upserted(node_for_pre.clone());
                    Ok(())
                })
                .post(move |installed| async move {
                    let rebalance_id = rebalance::maybe_trigger(
                        &state_for_post,
                        &prev_for_post,
                        installed.as_ref(),
                        interrupted_or_restarted,
                    )
                    .await;
                    *rebalance_id_slot_post.lock().await = rebalance_id;
                }),
        )
        .await?;

    let rebalance_id = rebalance_id_slot.lock().await.clone();

    let action = if is_target {
        Action::SelfJoinTarget
    } else {
        Action::SelfJoinProxy
    };
    metasync_new_smap(state, &installed, &action, rebalance_id.as_deref()).await;

    if gfn_started {
        gfn::stop(state, &target_id).await;
    }

    Ok(JoinOutcome {
        daemon_id: node.id,
        rebalance_id,
    })
}

/// Pushes the freshly installed Smap (and, if one was bumped in the same
/// operation, the new RMD) to every node in the *new* map.
async fn metasync_new_smap(
    state: &Arc<ClusterState>,
    installed: &Smap,
    action: &Action,
    rebalance_id: Option<&str>,
) {
    let mut recipients: Vec<Snode> = installed.proxies.values().cloned().collect();
    recipients.extend(installed.targets.values().cloned());

    let mut revisions = vec![RevisionPush {
        kind: "smap",
        version: installed.version,
        uuid: installed.uuid.clone(),
        action: ActionMsg::new(*action),
        payload: serde_json::to_value(installed).unwrap_or_default(),
    }];
    if let Some(rid) = rebalance_id {
        let rmd = state.rmd.current();
        revisions.push(RevisionPush {
            kind: "rmd",
            version: rmd.version,
            uuid: rid.to_string(),
            action: ActionMsg::new(Action::BumpMetasync),
            payload: serde_json::to_value(&*rmd).unwrap_or_default(),
        });
    }

    let deadline = state.global_config.current().timeouts.max_keepalive;
    let https = state.global_config.current().https;
    let outcome = state.metasyncer.sync(&recipients, &revisions, deadline, https).await;
    if !outcome.failed_node_ids.is_empty() {
        warn!(failed = ?outcome.failed_node_ids, "metasync of new Smap not acknowledged by all nodes");
    }
}

/// Keepalive fast path: the caller's reported Smap version string matched
/// the primary's -- timestamp "heard from" and return without reading a
/// body. Returns `false` when the slow path must run instead.
pub fn keepalive_fast_path(state: &Arc<ClusterState>, caller_id: &str, caller_smap_ver: Option<&str>) -> bool {
    let current_ver = state.smap.current().version.to_string();
    let matched = caller_smap_ver == Some(current_ver.as_str());
    if matched {
        state.touch_last_heard(caller_id);
    }
    matched
}

/// Keepalive slow path: the node's full descriptor is read and compared
/// against the stored one. Per invariant #4, the map is mutated only if the
/// descriptor actually differs *and* a handshake against the reporting
/// node's own control address confirms it; otherwise only `lastHeard` is
/// bumped.
pub async fn keepalive_slow_path(state: &Arc<ClusterState>, reported: Snode, claimed_cluster_uuid: Option<String>) -> Result<JoinOutcome> {
    let current = state.smap.current();
    match current.get(&reported.id) {
        Some(existing) if existing == &reported => {
            state.touch_last_heard(&reported.id);
            Ok(JoinOutcome {
                daemon_id: reported.id,
                rebalance_id: None,
            })
        }
        Some(_existing) => {
            let url = format!("{}/v1/cluster/confirm-snode", reported.control_addr.url(state.global_config.current().https));
            let authoritative: Snode = state
                .client
                .call_json(Method::POST, &url, Some(&reported), CONFIRM_SNODE_TIMEOUT, &[])
                .await?;
            join_common(state, authoritative, false, true, claimed_cluster_uuid).await
        }
        None => join_common(state, reported, false, false, claimed_cluster_uuid).await,
    }
}
