// src/core/meta/bmd.rs

//! Bucket map (BMD): opaque to the control plane beyond version and uuid.

use super::owner::MetaKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BucketProps {
    pub provider: String,
    #[serde(default)]
    pub copies: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bmd {
    pub version: u64,
    pub uuid: String,
    #[serde(default)]
    pub buckets: BTreeMap<String, BucketProps>,
}

impl Bmd {
    pub fn bootstrap(uuid: String) -> Self {
        Self {
            version: 1,
            uuid,
            buckets: BTreeMap::new(),
        }
    }
}

impl MetaKind for Bmd {
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
        "bmd"
    }
    fn cluster_uuid(&self) -> &str {
        &self.uuid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_starts_at_version_one_with_no_buckets() {
        let bmd = Bmd::bootstrap("U".into());
        assert_eq!(bmd.version, 1);
        assert!(bmd.buckets.is_empty());
    }
}
