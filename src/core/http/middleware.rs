// src/core/http/middleware.rs

//! Cross-cutting HTTP concerns: forwarding mutating requests received by a
//! non-primary proxy, and gating PUT actions behind the readiness flag.

use crate::core::action_msg::Action;
use crate::core::errors::ClusterError;
use crate::core::state::ClusterState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

/// Any mutating operation received by a non-primary proxy is forwarded to
/// the primary via a 307 redirect to its URL.
pub async fn forward_non_primary(
    State(state): State<Arc<ClusterState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ClusterError> {
    let mutating = matches!(*request.method(), Method::POST | Method::PUT | Method::DELETE);
    if mutating && !state.is_primary() {
        let primary_url = state
            .primary_url()
            .ok_or_else(|| ClusterError::NotReady("no primary known".to_string()))?;
        return Err(ClusterError::NotPrimary { primary_url });
    }
    Ok(next.run(request).await)
}

/// PUT actions require `pready` (primary ready and rebalance-capable)
/// except `shutdown-cluster` and `xact-stop`, which must always be
/// reachable so an operator can recover a stuck cluster.
pub async fn require_ready(
    State(state): State<Arc<ClusterState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ClusterError> {
    if *request.method() != Method::PUT {
        return Ok(next.run(request).await);
    }
    if state.is_ready() {
        return Ok(next.run(request).await);
    }

    // Peek the body to check whether this PUT is one of the two readiness
    // exemptions, then reconstruct the request for downstream handlers.
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_else(|_| Bytes::new());
    let exempt = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|v| v.get("action").and_then(|a| a.as_str().map(str::to_string)))
        .map(|action_str| {
            action_str == Action::ShutdownCluster.to_string() || action_str == Action::XactStop.to_string()
        })
        .unwrap_or(false);

    let request = Request::from_parts(parts, axum::body::Body::from(bytes));
    if exempt {
        return Ok(next.run(request).await);
    }
    Err(ClusterError::NotReady("primary not yet rebalance-capable".to_string()))
}
