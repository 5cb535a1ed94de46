// src/core/net/client.rs

//! An internal HTTP client for intra-cluster control-plane calls: join
//! handshakes, keepalive probes, metasync pushes, and health pings.
//! Mirrors the connect/send/receive shape of a dedicated cluster client,
//! but speaks HTTP over `reqwest` rather than a bespoke wire frame.

use crate::core::errors::ClusterError;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct IntraClusterClient {
    http: reqwest::Client,
}

impl IntraClusterClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self { http }
    }

    /// Sends a request and decodes a JSON body, treating any non-2xx/404
    /// response as a transport-retriable error and 404 as `NotFound` (not a
    /// transport failure, per the Broadcaster's 404-is-not-an-error rule).
    pub async fn call_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        timeout: Duration,
        headers: &[(&str, String)],
    ) -> Result<R, ClusterError> {
        let mut req = self.http.request(method, url).timeout(timeout);
        for (k, v) in headers {
            req = req.header(*k, v);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req.send().await.map_err(|e| {
            warn!(url, error = %e, "intra-cluster call failed");
            ClusterError::TransportRetriable {
                node: url.to_string(),
                detail: e.to_string(),
            }
        })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClusterError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ClusterError::TransportRetriable {
                node: url.to_string(),
                detail: format!("status {status}: {detail}"),
            });
        }
        resp.json::<R>().await.map_err(|e| ClusterError::Fatal(format!("bad response body from {url}: {e}")))
    }

    /// Fire-and-collect-status-only call, used for health pings and final
    /// maintenance/shutdown/decommission notifications where a connection
    /// reset or EOF is an expected, tolerated outcome.
    pub async fn call_status<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        timeout: Duration,
        headers: &[(&str, String)],
    ) -> Result<StatusCode, ClusterError> {
        let mut req = self.http.request(method, url).timeout(timeout);
        for (k, v) in headers {
            req = req.header(*k, v);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        match req.send().await {
            Ok(resp) => Ok(resp.status()),
            Err(e) if e.is_timeout() || e.is_connect() => Err(ClusterError::TransportRetriable {
                node: url.to_string(),
                detail: e.to_string(),
            }),
            Err(e) => Err(ClusterError::TransportRetriable {
                node: url.to_string(),
                detail: e.to_string(),
            }),
        }
    }
}

impl Default for IntraClusterClient {
    fn default() -> Self {
        Self::new()
    }
}
