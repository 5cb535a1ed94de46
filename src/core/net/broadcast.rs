// src/core/net/broadcast.rs

//! Broadcaster: fans a prepared request out to {all proxies, all targets,
//! all nodes, a selected subset}; gathers a result per recipient without
//! short-circuiting on the first failure.

use super::client::IntraClusterClient;
use crate::core::errors::ClusterError;
use crate::core::meta::Snode;
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Global cap on concurrent in-flight broadcast calls, regardless of how
/// many recipients a single fanout targets.
const MAX_BCAST_PARALLEL: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    AllProxies,
    AllTargets,
    AllNodes,
}

#[derive(Debug, Clone)]
pub struct BcastResult {
    pub node_id: String,
    pub status: Option<u16>,
    pub body: Option<String>,
    pub err: Option<ClusterError>,
}

impl BcastResult {
    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }
}

pub struct Broadcaster {
    client: IntraClusterClient,
    parallel_limit: Arc<Semaphore>,
}

impl Broadcaster {
    pub fn new(client: IntraClusterClient) -> Self {
        Self {
            client,
            parallel_limit: Arc::new(Semaphore::new(MAX_BCAST_PARALLEL)),
        }
    }

    /// Selects recipients out of the given node lists. `selected_ids`, when
    /// non-empty, narrows any of the three broad sets to that explicit list.
    pub fn select<'a>(
        recipients: Recipients,
        proxies: &'a [Snode],
        targets: &'a [Snode],
        selected_ids: Option<&[String]>,
    ) -> Vec<&'a Snode> {
        let base: Vec<&Snode> = match recipients {
            Recipients::AllProxies => proxies.iter().collect(),
            Recipients::AllTargets => targets.iter().collect(),
            Recipients::AllNodes => proxies.iter().chain(targets.iter()).collect(),
        };
        match selected_ids {
            Some(ids) if !ids.is_empty() => base
                .into_iter()
                .filter(|n| ids.iter().any(|id| id == &n.id))
                .collect(),
            _ => base,
        }
    }

    /// Fans `body` out as `method path` to every recipient concurrently,
    /// bounded by the global parallelism cap. One recipient's transport
    /// error never cancels the others.
    pub async fn fanout<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        recipients: &[&Snode],
        per_node_timeout: Duration,
        https: bool,
    ) -> Vec<BcastResult> {
        let mut handles = Vec::with_capacity(recipients.len());
        for node in recipients {
            let client = self.client.clone();
            let method = method.clone();
            let url = format!("{}{}", node.control_addr.url(https), path);
            let node_id = node.id.clone();
            let permit = self.parallel_limit.clone();
            let body_json = serde_json::to_value(body).unwrap_or(serde_json::Value::Null);
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                let result = client
                    .call_status(method, &url, Some(&body_json), per_node_timeout, &[])
                    .await;
                match result {
                    Ok(status) => BcastResult {
                        node_id,
                        status: Some(status.as_u16()),
                        body: None,
                        err: if status.as_u16() == 404 {
                            None
                        } else if status.is_success() {
                            None
                        } else {
                            Some(ClusterError::TransportRetriable {
                                node: url.clone(),
                                detail: format!("status {status}"),
                            })
                        },
                    },
                    Err(e) => BcastResult {
                        node_id,
                        status: None,
                        body: None,
                        err: Some(e),
                    },
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for h in handles {
            match h.await {
                Ok(r) => results.push(r),
                Err(join_err) => results.push(BcastResult {
                    node_id: "unknown".to_string(),
                    status: None,
                    body: None,
                    err: Some(ClusterError::Fatal(format!("broadcast task panicked: {join_err}"))),
                }),
            }
        }
        results
    }

    /// The first failure among the results, if any -- the caller decides
    /// whether any failure at all is fatal to the calling operation.
    pub fn first_failure(results: &[BcastResult]) -> Option<&BcastResult> {
        results.iter().find(|r| !r.is_ok())
    }
}
