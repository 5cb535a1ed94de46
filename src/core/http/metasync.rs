// src/core/http/metasync.rs

//! PUT /v1/metasync -- the receive side of `Metasyncer::sync`/`notify`
//! (§4.3). Not part of the operator-facing surface: this is the internal
//! wire endpoint every node exposes so peers can push Smap/RMD/BMD/config
//! revisions. Accepts either a single push (`notify`) or a batch (`sync`,
//! which travels together as one HTTP round trip per recipient) and applies
//! each by kind, skipping any revision whose version is not newer than what
//! is already installed.

use crate::core::action_msg::Action;
use crate::core::errors::Result;
use crate::core::meta::{Bmd, GlobalConfig, Rmd, Smap};
use crate::core::net::metasync::RevisionPush;
use crate::core::state::ClusterState;
use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    Many(Vec<RevisionPush>),
    One(RevisionPush),
}

pub async fn put_metasync(
    State(state): State<Arc<ClusterState>>,
    Json(body): Json<Batch>,
) -> Result<Json<serde_json::Value>> {
    let revisions = match body {
        Batch::Many(revs) => revs,
        Batch::One(rev) => vec![rev],
    };

    for rev in revisions {
        apply_revision(&state, rev).await;
    }

    Ok(Json(json!({})))
}

async fn apply_revision(state: &Arc<ClusterState>, rev: RevisionPush) {
    match rev.kind {
        "smap" => match serde_json::from_value::<Smap>(rev.payload) {
            Ok(smap) => {
                state.smap.adopt_if_newer(smap).await;
            }
            Err(e) => warn!(error = %e, "malformed smap metasync payload"),
        },
        "rmd" => match serde_json::from_value::<Rmd>(rev.payload) {
            Ok(rmd) => {
                state.rmd.adopt_if_newer(rmd).await;
            }
            Err(e) => warn!(error = %e, "malformed rmd metasync payload"),
        },
        "bmd" => match serde_json::from_value::<Bmd>(rev.payload) {
            Ok(bmd) => {
                state.bmd.adopt_if_newer(bmd).await;
            }
            Err(e) => warn!(error = %e, "malformed bmd metasync payload"),
        },
        "config" => match serde_json::from_value::<GlobalConfig>(rev.payload) {
            Ok(cfg) => {
                state.global_config.adopt_if_newer(cfg).await;
            }
            Err(e) => warn!(error = %e, "malformed config metasync payload"),
        },
        "clu-meta" => match serde_json::from_value::<crate::core::meta::CluMeta>(rev.payload) {
            // A `PrimaryForce`-tagged clu-meta push is the forced-primary
            // merge protocol replacing this node's cluster identity
            // wholesale; the foreign-uuid guard `adopt_if_newer` applies to
            // ordinary metasync does not apply here.
            Ok(clu_meta) if rev.action.action == Action::PrimaryForce => {
                if let Some(smap) = clu_meta.smap {
                    state.smap.force_install(smap).await;
                }
                state.bmd.force_install(clu_meta.bmd).await;
                state.global_config.force_install(clu_meta.config).await;
                state.rmd.force_install(clu_meta.rmd).await;
            }
            Ok(clu_meta) => {
                if let Some(smap) = clu_meta.smap {
                    state.smap.adopt_if_newer(smap).await;
                }
                state.bmd.adopt_if_newer(clu_meta.bmd).await;
                state.global_config.adopt_if_newer(clu_meta.config).await;
                state.rmd.adopt_if_newer(clu_meta.rmd).await;
            }
            Err(e) => warn!(error = %e, "malformed clu-meta metasync payload"),
        },
        other => warn!(kind = other, "unknown metasync revision kind"),
    }
}
