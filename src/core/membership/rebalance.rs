// src/core/membership/rebalance.rs

//! Shared rebalance-trigger plumbing used by both the join and maintenance
//! flows: deciding whether a rebalance must run, bumping RMD under the Smap
//! lock when it must, and driving the resulting xaction's lifecycle.
//!
//! Actually moving bytes between targets is out of scope here (it lives in
//! the blob-download / resilver engines named as external collaborators in
//! the purpose statement); this module only owns the lifecycle of the
//! rebalance xaction -- registering it, and completing it once a rebalance
//! driver elsewhere in the fleet reports done. Since no such driver is part
//! of this core, the registered xaction is finished immediately so that
//! callers awaiting it (graceful removal) are not left blocked forever.

use crate::core::meta::{ModifyCtx, Rmd, Smap, must_rebalance};
use crate::core::state::ClusterState;
use crate::core::xaction::XactKind;
use std::sync::Arc;
use tracing::info;

/// Runs after a successful Smap install: if a rebalance must run given
/// `prev` and `installed`, bumps RMD (nested MetaOwner modify, still under
/// the Smap write lock per §4.1 step 6) and starts tracking the resulting
/// xaction. Returns the rebalance-id, if one was minted.
pub async fn maybe_trigger(
    state: &Arc<ClusterState>,
    prev: &Smap,
    installed: &Smap,
    joiner_interrupted_or_restarted: bool,
) -> Option<String> {
    let rebalance_enabled = state.global_config.current().rebalance.enabled;
    if !must_rebalance(prev, installed, rebalance_enabled, joiner_interrupted_or_restarted) {
        return None;
    }

    let target_ids: Vec<String> = installed.active_target_ids().into_iter().collect();
    let prior_rmd_id = state.rmd.current().rebalance_id.clone();
    let bumped = state.rmd.current().bumped(target_ids.clone());
    let rebalance_id = bumped.rebalance_id.clone();

    let result = state
        .rmd
        .modify(ModifyCtx::<Rmd>::new().pre(move |clone: &mut Rmd| {
            clone.target_ids = target_ids.clone();
            clone.rebalance_id = rebalance_id.clone();
            Ok(())
        }))
        .await;

    let Ok(installed_rmd) = result else {
        info!(prior_rmd_id, "RMD bump failed; rebalance not tracked");
        return None;
    };

    let xaction_id = state
        .xactions
        .start(XactKind::Rebalance, installed_rmd.rebalance_id.clone());
    info!(
        rebalance_id = installed_rmd.rebalance_id,
        xaction_id, "rebalance triggered"
    );

    // The data-movement engine that would normally drive this xaction to
    // completion is out of scope of the control plane; finish it right away
    // so graceful-removal's `wait_for_finish` is never left hanging.
    let state = state.clone();
    tokio::spawn(async move {
        state.xactions.finish(&xaction_id);
    });

    Some(installed_rmd.rebalance_id.clone())
}
