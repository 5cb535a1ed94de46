// src/core/errors.rs

//! Defines the primary error type for the control plane.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The main error enum, mirroring the taxonomy of transport-retriable,
/// validation, not-found, cluster-integrity, and fatal failures.
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    #[error("transport error calling {node}: {detail}")]
    TransportRetriable { node: String, detail: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("CLUSTER-INTEGRITY smap uuid mismatch: local={local} remote={remote}")]
    ClusterIntegrity { local: String, remote: String },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("not primary; forward to {primary_url}")]
    NotPrimary { primary_url: String },

    #[error("not ready: {0}")]
    NotReady(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl ClusterError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::TransportRetriable { .. } => "transport-retriable",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not-found",
            Self::ClusterIntegrity { .. } => "cluster-integrity",
            Self::Fatal(_) => "fatal",
            Self::NotPrimary { .. } => "not-primary",
            Self::NotReady(_) => "not-ready",
            Self::Conflict(_) => "conflict",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::TransportRetriable { .. } => StatusCode::BAD_GATEWAY,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ClusterIntegrity { .. } => StatusCode::CONFLICT,
            Self::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotPrimary { .. } => StatusCode::TEMPORARY_REDIRECT,
            Self::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

/// The structured error body every mutating endpoint returns on failure:
/// `{code, action, target}` per the error-handling design.
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl IntoResponse for ClusterError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::NotPrimary { primary_url } = &self {
            return axum::response::Redirect::temporary(primary_url).into_response();
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            action: None,
            target: None,
        };
        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
