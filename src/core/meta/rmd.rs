// src/core/meta/rmd.rs

//! Rebalance descriptor (RMD): monotonic version plus the target-ids
//! participating in the next rebalance, and a fresh rebalance-id per bump.

use super::owner::MetaKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rmd {
    pub version: u64,
    pub uuid: String,
    pub rebalance_id: String,
    pub target_ids: Vec<String>,
}

impl Rmd {
    pub fn empty(uuid: String) -> Self {
        Self {
            version: 0,
            uuid,
            rebalance_id: String::new(),
            target_ids: Vec::new(),
        }
    }

    /// Produces the next RMD: version bumped, a fresh rebalance-id minted,
    /// the given target-ids recorded as participants.
    pub fn bumped(&self, target_ids: Vec<String>) -> Self {
        Self {
            version: self.version + 1,
            uuid: self.uuid.clone(),
            rebalance_id: Uuid::new_v4().to_string(),
            target_ids,
        }
    }
}

impl MetaKind for Rmd {
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
        "rmd"
    }
    fn cluster_uuid(&self) -> &str {
        &self.uuid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bumped_increments_version_and_mints_fresh_id() {
        let empty = Rmd::empty("U".into());
        let first = empty.bumped(vec!["t1".into()]);
        assert_eq!(first.version, 1);
        assert_eq!(first.target_ids, vec!["t1".to_string()]);

        let second = first.bumped(vec!["t1".into(), "t2".into()]);
        assert_eq!(second.version, 2);
        assert_ne!(first.rebalance_id, second.rebalance_id, "each bump mints a fresh rebalance id");
    }
}
