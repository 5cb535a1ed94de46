// src/core/net/metasync.rs

//! Metasyncer: eventually-consistent fan-out of metadata revisions with
//! at-least-once delivery, bounded staleness, and retry with backoff. The
//! one-shot signals that don't carry a metadata revision (`start-gfn` /
//! `stop-gfn`) go over `Broadcaster::fanout` to `/v1/daemon` instead -- see
//! `membership/gfn.rs`.

use super::client::IntraClusterClient;
use crate::core::action_msg::ActionMsg;
use crate::core::meta::Snode;
use rand::Rng;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// One metadata revision paired with the action message describing why it
/// is being pushed (e.g. `start-gfn`, `keepalive-update`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionPush {
    pub kind: &'static str,
    pub version: u64,
    pub uuid: String,
    pub action: ActionMsg,
    pub payload: serde_json::Value,
}

const MAX_RETRY_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(200);
const MAX_METASYNC_PARALLEL: usize = 64;

pub struct MetasyncOutcome {
    pub failed_node_ids: Vec<String>,
}

pub struct Metasyncer {
    client: IntraClusterClient,
    parallel_limit: Arc<Semaphore>,
}

impl Metasyncer {
    pub fn new(client: IntraClusterClient) -> Self {
        Self {
            client,
            parallel_limit: Arc::new(Semaphore::new(MAX_METASYNC_PARALLEL)),
        }
    }

    /// Pushes one or more revisions to every given node as a single HTTP
    /// round trip per recipient (the pairs travel together). Retries
    /// transport-retriable failures with bounded backoff up to `deadline`;
    /// always returns rather than propagating a retriable error upward.
    pub async fn sync(
        &self,
        recipients: &[Snode],
        revisions: &[RevisionPush],
        deadline: Duration,
        https: bool,
    ) -> MetasyncOutcome {
        let mut handles = Vec::with_capacity(recipients.len());
        for node in recipients {
            let client = self.client.clone();
            let url = format!("{}/v1/metasync", node.control_addr.url(https));
            let node_id = node.id.clone();
            let revisions = revisions.to_vec();
            let permit = self.parallel_limit.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                let ok = push_with_retry(&client, &node_id, &url, &revisions, deadline).await;
                (node_id, ok)
            }));
        }

        let mut failed = Vec::new();
        for h in handles {
            match h.await {
                Ok((_node_id, true)) => {}
                Ok((node_id, false)) => failed.push(node_id),
                Err(join_err) => warn!(error = %join_err, "metasync push task panicked"),
            }
        }
        MetasyncOutcome {
            failed_node_ids: failed,
        }
    }

}

async fn push_with_retry(
    client: &IntraClusterClient,
    node_id: &str,
    url: &str,
    revisions: &[RevisionPush],
    deadline: Duration,
) -> bool {
    let started = tokio::time::Instant::now();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = client
            .call_status(Method::PUT, url, Some(revisions), Duration::from_secs(5), &[])
            .await;
        match result {
            Ok(status) if status.is_success() => {
                return true;
            }
            Ok(status) => {
                warn!(node_id, %status, "metasync push rejected by recipient (non-retriable)");
                return false;
            }
            Err(e) => {
                if started.elapsed() >= deadline || attempt >= MAX_RETRY_ATTEMPTS {
                    warn!(node_id, error = %e, attempt, "metasync push exhausted retries; node flagged for keepalive scrutiny");
                    return false;
                }
                let jitter_ms = rand::thread_rng().gen_range(0..100);
                let backoff = BASE_BACKOFF * attempt + Duration::from_millis(jitter_ms);
                info!(node_id, attempt, backoff_ms = backoff.as_millis() as u64, "retrying metasync push");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
