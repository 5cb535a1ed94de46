// src/config.rs

//! Loading, resolving, and validating the proxy's bootstrap configuration.
//! Mirrors the two-stage `RawConfig` -> `Config` -> `validate()` shape used
//! throughout this codebase: a permissive, field-optional deserialization
//! target, resolved into a fully-populated struct the rest of the process
//! can rely on without re-checking `Option`s everywhere.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::warn;

use crate::core::meta::{NetAddr, NodeType};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

fn default_cert_path() -> String {
    "cplane.crt".to_string()
}
fn default_key_path() -> String {
    "cplane.key".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    8878
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NodeIdentity {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub public_addr: NetAddr,
    pub control_addr: NetAddr,
    pub data_addr: NetAddr,
}

/// How this process learns about an existing cluster, if any. `None` means
/// "I am the founding primary of a brand-new cluster."
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PrimaryDiscovery {
    #[serde(default)]
    pub bootstrap_url: Option<String>,
}

/// Raw, directly-deserialized configuration; every field that the resolved
/// `Config` fills with a computed default is `Option` here so a minimal
/// config file is still valid TOML.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_state_dir")]
    state_dir: String,
    node: NodeIdentity,
    #[serde(default)]
    primary: PrimaryDiscovery,
    #[serde(default)]
    tls: TlsConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default = "default_max_bcast_parallel")]
    max_bcast_parallel: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    51080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_state_dir() -> String {
    "cplane_state".to_string()
}
fn default_max_bcast_parallel() -> usize {
    64
}

/// The fully resolved, validated configuration the rest of the process
/// relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub state_dir: String,
    pub node: NodeIdentity,
    pub primary: PrimaryDiscovery,
    pub tls: TlsConfig,
    pub metrics: MetricsConfig,
    pub max_bcast_parallel: usize,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;

        let config = Config {
            host: raw.host,
            port: raw.port,
            log_level: raw.log_level,
            state_dir: raw.state_dir,
            node: raw.node,
            primary: raw.primary,
            tls: raw.tls,
            metrics: raw.metrics,
            max_bcast_parallel: raw.max_bcast_parallel,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.node.id.trim().is_empty() {
            return Err(anyhow!("node.id cannot be empty"));
        }
        if self.node.node_type == NodeType::Target {
            return Err(anyhow!(
                "this process is the control-plane proxy; node.type must be 'proxy'"
            ));
        }
        if self.tls.enabled {
            if self.tls.cert_path.trim().is_empty() {
                return Err(anyhow!("tls.cert_path cannot be empty when TLS is enabled"));
            }
            if self.tls.key_path.trim().is_empty() {
                return Err(anyhow!("tls.key_path cannot be empty when TLS is enabled"));
            }
        }
        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!("metrics.port cannot be the same as the main server port"));
            }
        }
        if self.max_bcast_parallel == 0 {
            warn!("max_bcast_parallel is 0; broadcasts will never run");
        }
        Ok(())
    }
}
