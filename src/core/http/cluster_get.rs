// src/core/http/cluster_get.rs

//! GET /v1/cluster?what=... -- query endpoints enumerated in §4.5. Several
//! of these (`smap`, `clu-meta`) double as the wire format fetched by the
//! forced-primary protocol's handshake calls.

use crate::core::errors::{ClusterError, Result};
use crate::core::state::ClusterState;
use crate::core::xaction::XactSnapshot;
use axum::Json;
use axum::extract::{Query, State};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use sysinfo::System;

#[derive(Serialize)]
struct SysInfo {
    node_id: String,
    is_primary: bool,
    ready: bool,
    smap_version: u64,
    proxies: usize,
    targets: usize,
    total_memory_bytes: u64,
    used_memory_bytes: u64,
    cpu_usage_percent: f32,
}

pub async fn get_cluster(
    State(state): State<Arc<ClusterState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>> {
    let what = params.get("what").map(String::as_str).unwrap_or("smap");
    match what {
        "smap" => Ok(Json(serde_json::to_value(&*state.smap.current()).unwrap_or_default())),
        "clu-meta" => Ok(Json(serde_json::to_value(state.clu_meta()).unwrap_or_default())),
        "cluster-config" => Ok(Json(
            serde_json::to_value(state.global_config.current().elided()).unwrap_or_default(),
        )),
        "sysinfo" => {
            let smap = state.smap.current();
            let mut sys = System::new();
            sys.refresh_memory();
            sys.refresh_cpu_usage();
            Ok(Json(serde_json::to_value(SysInfo {
                node_id: state.my_id.clone(),
                is_primary: state.is_primary(),
                ready: state.is_ready(),
                smap_version: smap.version,
                proxies: smap.proxies.len(),
                targets: smap.targets.len(),
                total_memory_bytes: sys.total_memory(),
                used_memory_bytes: sys.used_memory(),
                cpu_usage_percent: sys.global_cpu_usage(),
            })
            .unwrap_or_default()))
        }
        "mountpaths" => Ok(Json(json!({ "mountpaths": [] }))),
        "backend" => {
            let backend = state.global_config.current().backend.clone();
            Ok(Json(serde_json::to_value(backend).unwrap_or_default()))
        }
        "remote-cluster" => Ok(Json(json!({ "remote": [] }))),
        "target-ips" => {
            let smap = state.smap.current();
            let ips = smap
                .targets
                .values()
                .map(|t| t.public_addr.host.clone())
                .collect::<Vec<_>>()
                .join(",");
            Ok(Json(json!({ "target-ips": ips })))
        }
        "xaction" => {
            let id = params.get("id").ok_or_else(|| ClusterError::validation("missing 'id' query parameter"))?;
            let snapshot = state
                .xactions
                .snapshot(id)
                .ok_or_else(|| ClusterError::not_found(format!("unknown xaction '{id}'")))?;
            Ok(Json(serde_json::to_value(snapshot).unwrap_or_default()))
        }
        "xactions" => {
            let list: Vec<XactSnapshot> = state.xactions.list();
            Ok(Json(serde_json::to_value(list).unwrap_or_default()))
        }
        other => Err(ClusterError::validation(format!("unknown 'what' value '{other}'"))),
    }
}
