// src/core/meta/config_meta.rs

//! The versioned, fleet-wide `GlobalConfig` -- distinct from the per-process
//! bootstrap `Config` in `crate::config`. This is the metadata kind that
//! travels through metasync and is mutated via `set-config`/`reset-config`.

use super::owner::MetaKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceSettings {
    pub enabled: bool,
}

impl Default for RebalanceSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub cplane: std::time::Duration,
    #[serde(with = "humantime_serde")]
    pub max_keepalive: std::time::Duration,
    #[serde(with = "humantime_serde")]
    pub startup: std::time::Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            cplane: std::time::Duration::from_secs(2),
            max_keepalive: std::time::Duration::from_secs(30),
            startup: std::time::Duration::from_secs(60),
        }
    }
}

/// Backends are enabled/disabled through a two-phase `begin`/`commit` action
/// pair; `pending` tracks providers staged by `begin` but not yet committed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendSettings {
    pub enabled: BTreeSet<String>,
    pub pending: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub version: u64,
    pub uuid: String,
    pub rebalance: RebalanceSettings,
    pub timeouts: Timeouts,
    pub backend: BackendSettings,
    pub https: bool,
}

impl GlobalConfig {
    pub fn bootstrap(uuid: String) -> Self {
        Self {
            version: 1,
            uuid,
            rebalance: RebalanceSettings::default(),
            timeouts: Timeouts::default(),
            backend: BackendSettings::default(),
            https: false,
        }
    }

    /// The GET-with-secrets-elided projection returned by `what=cluster-config`.
    /// Currently there are no secret fields on `GlobalConfig` itself, but the
    /// projection point is kept so a future credential field redacts here
    /// rather than at every call site.
    pub fn elided(&self) -> Self {
        self.clone()
    }
}

impl MetaKind for GlobalConfig {
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn assert_consistent(&self) -> Result<(), String> {
        Ok(())
    }
    fn kind_name() -> &'static str {
        "config"
    }
    fn cluster_uuid(&self) -> &str {
        &self.uuid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_defaults_rebalance_enabled_and_https_disabled() {
        let config = GlobalConfig::bootstrap("U".into());
        assert_eq!(config.version, 1);
        assert!(config.rebalance.enabled);
        assert!(!config.https);
        assert!(config.backend.enabled.is_empty());
    }

    #[test]
    fn timeouts_round_trip_through_json_as_human_readable_durations() {
        let timeouts = Timeouts::default();
        let json = serde_json::to_value(&timeouts).unwrap();
        assert_eq!(json["max_keepalive"], "30s");
        let back: Timeouts = serde_json::from_value(json).unwrap();
        assert_eq!(back.max_keepalive, timeouts.max_keepalive);
    }
}
