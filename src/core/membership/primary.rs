// src/core/membership/primary.rs

//! Forced primary change (cluster merge), per §4.4.6. Run by the *current*
//! primary to fold the local cluster into a designated destination
//! primary's cluster, with rollback points up to a declared point of no
//! return.

use crate::core::action_msg::{Action, ActionMsg};
use crate::core::errors::{ClusterError, Result};
use crate::core::meta::{Bmd, CluMeta, GlobalConfig, ModifyCtx, Smap, Snode};
use crate::core::net::{Broadcaster, Recipients, RevisionPush};
use crate::core::state::ClusterState;
use reqwest::Method;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

const FORCE_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const REREGISTER_ATTEMPTS: usize = 3;

pub struct ForcePrimaryRequest {
    pub designee_id: String,
    pub force: bool,
    pub candidate_url: Option<String>,
}

/// Runs the ten-step protocol. On any failure before step 9, local state is
/// rolled back to the pre-protocol backup; after step 9 succeeds the
/// current primary has relinquished primacy and no further rollback is
/// attempted.
pub async fn force_primary_change(state: &Arc<ClusterState>, req: ForcePrimaryRequest) -> Result<()> {
    if !state.try_start_forced_primary() {
        return Err(ClusterError::Conflict("a forced-primary protocol is already in flight".to_string()));
    }
    let result = run_protocol(state, req).await;
    state.finish_forced_primary();
    result
}

async fn run_protocol(state: &Arc<ClusterState>, req: ForcePrimaryRequest) -> Result<()> {
    // Step 1: validate the designee; if unknown locally, require force+url.
    let local_smap = state.smap.current();
    let candidate_url = match local_smap.get(&req.designee_id) {
        Some(node) => node.control_url(state.global_config.current().https),
        None if req.force => req
            .candidate_url
            .clone()
            .ok_or_else(|| ClusterError::validation("force=true requires primary-candidate=<url>"))?,
        None => {
            return Err(ClusterError::validation(format!(
                "unknown primary designee '{}': retry with force=true&primary-candidate=<url>",
                req.designee_id
            )));
        }
    };

    // Step 2: fetch the destination Smap, trying control then public URL.
    let dest_smap: Smap = fetch_with_fallback(state, &candidate_url, "/v1/cluster?what=smap").await?;

    // Step 3: verify the destination agrees the designee is its primary and
    // is electable.
    let designee = dest_smap.get(&req.designee_id).ok_or_else(|| {
        ClusterError::not_found(format!(
            "designee '{}' not present in the destination cluster's Smap",
            req.designee_id
        ))
    })?;
    if dest_smap.primary_id != req.designee_id || !designee.flags.is_electable() {
        return Err(ClusterError::validation(format!(
            "'{}' is not an electable primary of the destination cluster",
            req.designee_id
        )));
    }

    // Step 4: fetch the destination's full cluMeta.
    let dest_clu_meta: CluMeta = fetch_with_fallback(state, &candidate_url, "/v1/cluster?what=clu-meta").await?;

    // Step 5: backup local cluMeta for rollback.
    let backup = state.clu_meta();

    // Step 6: prepare phase -- broadcast force-join with the new Smap to
    // every member of the current cluster; each confirms reachability.
    if let Err(e) = prepare_force_join(state, &local_smap, &dest_smap).await {
        warn!(error = %e, "force-join prepare phase failed; aborting before any local mutation");
        return Err(e);
    }

    // Step 7: metasync the destination's cluMeta to the current cluster so
    // members learn the new uuid/version.
    metasync_clu_meta(state, &local_smap, &dest_clu_meta).await;

    // Step 8: update local in-memory config and BMD to destination values.
    if let Err(e) = adopt_config_and_bmd(state, &dest_clu_meta).await {
        warn!(error = %e, "rolling back config and BMD to pre-protocol backup");
        rollback_config_and_bmd(state, &backup).await;
        return Err(e);
    }

    // Step 9: re-register with the new primary, up to three attempts across
    // alternate URLs.
    if let Err(e) = reregister_with_new_primary(state, &dest_smap, designee).await {
        warn!(error = %e, "re-registration failed; rolling back config, BMD, and Smap");
        rollback_config_and_bmd(state, &backup).await;
        rollback_smap(state, &backup).await;
        return Err(e);
    }

    // Point of no return: primacy is relinquished from here on.
    state.is_primary.store(false, Ordering::Release);

    // Step 10: ask the new primary to bump-metasync, re-publishing
    // everything to the merged fleet.
    let bump_url = format!("{candidate_url}/v1/cluster");
    let msg = ActionMsg::new(Action::BumpMetasync);
    if let Err(e) = state
        .client
        .call_status(Method::PUT, &bump_url, Some(&msg), FORCE_JOIN_TIMEOUT, &[])
        .await
    {
        warn!(error = %e, "bump-metasync request to new primary failed; merge already committed locally");
    }

    info!(designee = req.designee_id, "forced primary change complete");
    Ok(())
}

async fn fetch_with_fallback<R: serde::de::DeserializeOwned>(
    state: &Arc<ClusterState>,
    base_url: &str,
    path: &str,
) -> Result<R> {
    let url = format!("{base_url}{path}");
    state.client.call_json(Method::GET, &url, None::<&()>, HANDSHAKE_TIMEOUT, &[]).await
}

async fn prepare_force_join(state: &Arc<ClusterState>, local_smap: &Smap, dest_smap: &Smap) -> Result<()> {
    let mut recipients: Vec<_> = local_smap.proxies.values().cloned().collect();
    recipients.extend(local_smap.targets.values().cloned());
    let recipient_refs = Broadcaster::select(Recipients::AllNodes, &recipients, &[], None);

    let msg = ActionMsg::new(Action::PrimaryForce).with_value(serde_json::to_value(dest_smap).unwrap_or_default());
    let results = state
        .broadcaster
        .fanout(Method::POST, "/v1/daemon/force-join", &msg, &recipient_refs, FORCE_JOIN_TIMEOUT, state.global_config.current().https)
        .await;
    if let Some(failure) = Broadcaster::first_failure(&results) {
        return Err(ClusterError::TransportRetriable {
            node: failure.node_id.clone(),
            detail: "force-join prepare not confirmed".to_string(),
        });
    }
    Ok(())
}

async fn metasync_clu_meta(state: &Arc<ClusterState>, local_smap: &Smap, dest_clu_meta: &CluMeta) {
    let mut recipients: Vec<_> = local_smap.proxies.values().cloned().collect();
    recipients.extend(local_smap.targets.values().cloned());
    let revisions = vec![RevisionPush {
        kind: "clu-meta",
        version: dest_clu_meta.config.version,
        uuid: dest_clu_meta.bmd.uuid.clone(),
        action: ActionMsg::new(Action::PrimaryForce),
        payload: serde_json::to_value(dest_clu_meta).unwrap_or_default(),
    }];
    let deadline = state.global_config.current().timeouts.max_keepalive;
    let https = state.global_config.current().https;
    let outcome = state.metasyncer.sync(&recipients, &revisions, deadline, https).await;
    if !outcome.failed_node_ids.is_empty() {
        warn!(failed = ?outcome.failed_node_ids, "cluMeta merge metasync not acknowledged by all nodes");
    }
}

async fn adopt_config_and_bmd(state: &Arc<ClusterState>, dest: &CluMeta) -> Result<()> {
    let new_config = dest.config.clone();
    state
        .global_config
        .modify(ModifyCtx::<GlobalConfig>::new().pre(move |clone: &mut GlobalConfig| {
            *clone = new_config.clone();
            Ok(())
        }))
        .await?;
    let new_bmd = dest.bmd.clone();
    state
        .bmd
        .modify(ModifyCtx::<Bmd>::new().pre(move |clone: &mut Bmd| {
            *clone = new_bmd.clone();
            Ok(())
        }))
        .await?;
    Ok(())
}

async fn rollback_config_and_bmd(state: &Arc<ClusterState>, backup: &CluMeta) {
    let config = backup.config.clone();
    let _ = state
        .global_config
        .modify(ModifyCtx::<GlobalConfig>::new().pre(move |clone: &mut GlobalConfig| {
            *clone = config.clone();
            Ok(())
        }))
        .await;
    let bmd = backup.bmd.clone();
    let _ = state
        .bmd
        .modify(ModifyCtx::<Bmd>::new().pre(move |clone: &mut Bmd| {
            *clone = bmd.clone();
            Ok(())
        }))
        .await;
}

async fn rollback_smap(state: &Arc<ClusterState>, backup: &CluMeta) {
    let Some(smap) = backup.smap.clone() else {
        return;
    };
    let result = state
        .smap
        .modify(ModifyCtx::<Smap>::new().pre(move |clone: &mut Smap| {
            *clone = smap.clone();
            Ok(())
        }))
        .await;
    if let Ok(installed) = result {
        let mut recipients: Vec<_> = installed.proxies.values().cloned().collect();
        recipients.extend(installed.targets.values().cloned());
        let revisions = vec![RevisionPush {
            kind: "smap",
            version: installed.version,
            uuid: installed.uuid.clone(),
            action: ActionMsg::new(Action::BumpMetasync),
            payload: serde_json::to_value(&*installed).unwrap_or_default(),
        }];
        let deadline = state.global_config.current().timeouts.max_keepalive;
        let https = state.global_config.current().https;
        state.metasyncer.sync(&recipients, &revisions, deadline, https).await;
    }
}

async fn reregister_with_new_primary(state: &Arc<ClusterState>, dest_smap: &Smap, designee: &Snode) -> Result<()> {
    let https = state.global_config.current().https;
    let urls = [designee.control_url(https), designee.public_addr.url(https)];
    let my_descriptor = {
        let smap = state.smap.current();
        smap.get(&state.my_id).cloned()
    }
    .ok_or_else(|| ClusterError::Fatal("local node descriptor missing from own Smap".to_string()))?;

    let mut attempts = 0;
    let mut last_err = None;
    for url in urls.iter().cycle().take(REREGISTER_ATTEMPTS) {
        attempts += 1;
        let join_url = format!("{url}/v1/cluster/admin-join");
        match state
            .client
            .call_status(Method::POST, &join_url, Some(&my_descriptor), HANDSHAKE_TIMEOUT, &[])
            .await
        {
            Ok(status) if status.is_success() => return Ok(()),
            Ok(status) => last_err = Some(ClusterError::TransportRetriable {
                node: url.to_string(),
                detail: format!("re-registration returned {status}"),
            }),
            Err(e) => last_err = Some(e),
        }
        if attempts >= REREGISTER_ATTEMPTS {
            break;
        }
    }
    let _ = dest_smap;
    Err(last_err.unwrap_or_else(|| ClusterError::Fatal("re-registration exhausted attempts".to_string())))
}
