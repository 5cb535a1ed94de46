// src/core/meta/smap.rs

//! Cluster map (Smap): the authoritative membership snapshot.

use super::owner::MetaKind;
use super::snode::Snode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Versioned, immutable membership snapshot. New versions are produced by
/// cloning the current one, mutating the clone, and swapping it in under the
/// Smap `MetaOwner`'s lock -- readers never observe a partially built map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smap {
    pub version: u64,
    pub uuid: String,
    pub primary_id: String,
    pub proxies: BTreeMap<String, Snode>,
    pub targets: BTreeMap<String, Snode>,
}

impl Smap {
    /// A brand-new cluster: version 1, a freshly minted uuid, one primary.
    pub fn bootstrap(uuid: String, primary: Snode) -> Self {
        let mut proxies = BTreeMap::new();
        proxies.insert(primary.id.clone(), primary.clone());
        Self {
            version: 1,
            uuid,
            primary_id: primary.id,
            proxies,
            targets: BTreeMap::new(),
        }
    }

    pub fn primary(&self) -> Option<&Snode> {
        self.proxies.get(&self.primary_id)
    }

    pub fn get(&self, id: &str) -> Option<&Snode> {
        self.proxies.get(id).or_else(|| self.targets.get(id))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.proxies.contains_key(id) || self.targets.contains_key(id)
    }

    /// Finds an existing descriptor that shares an address with `candidate`
    /// but does not have the same id -- an address collision across ids.
    pub fn address_collision(&self, candidate: &Snode) -> Option<&Snode> {
        self.proxies
            .values()
            .chain(self.targets.values())
            .find(|existing| existing.id != candidate.id && existing.shares_address_with(candidate))
    }

    pub fn active_target_ids(&self) -> std::collections::BTreeSet<String> {
        self.targets
            .values()
            .filter(|t| t.flags.is_active_target())
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn active_target_count(&self) -> usize {
        self.targets
            .values()
            .filter(|t| t.flags.is_active_target())
            .count()
    }

    /// Any target currently draining blocks an in-flight rebalance abort.
    pub fn has_draining_target(&self) -> bool {
        self.targets.values().any(|t| t.flags.is_draining())
    }

    /// Checks every Smap invariant named in §3: primary present in Pmap, ids
    /// unique across the union, no two descriptors sharing any address.
    pub fn assert_consistent(&self) -> Result<(), String> {
        if !self.proxies.contains_key(&self.primary_id) {
            return Err(format!("primary '{}' not present in Pmap", self.primary_id));
        }
        let all: Vec<&Snode> = self.proxies.values().chain(self.targets.values()).collect();
        for (i, a) in all.iter().enumerate() {
            for b in all.iter().skip(i + 1) {
                if a.id == b.id {
                    return Err(format!("duplicate node id '{}'", a.id));
                }
                if a.shares_address_with(b) {
                    return Err(format!(
                        "nodes '{}' and '{}' share an address",
                        a.id, b.id
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn with_node_upserted(&self, node: Snode) -> Self {
        let mut next = self.clone();
        if node.is_proxy() {
            next.proxies.insert(node.id.clone(), node);
        } else {
            next.targets.insert(node.id.clone(), node);
        }
        next
    }

    pub fn with_node_removed(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.proxies.remove(id);
        next.targets.remove(id);
        next
    }

    /// A version-only projection used for early-GFN pre-announcements: the
    /// receiver only needs to know a change is imminent, not its content.
    pub fn version_stub(&self) -> SmapVersionStub {
        SmapVersionStub {
            version: self.version,
            uuid: self.uuid.clone(),
        }
    }
}

impl MetaKind for Smap {
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn assert_consistent(&self) -> Result<(), String> {
        Smap::assert_consistent(self)
    }
    fn kind_name() -> &'static str {
        "smap"
    }
    fn cluster_uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmapVersionStub {
    pub version: u64,
    pub uuid: String,
}

/// `mustRebalance(prev, cur)`: true iff the active-target-id set differs
/// between the two maps, or the joiner advertised `interrupted`/`restarted`,
/// given rebalancing is enabled and `prev` had at least one active target.
pub fn must_rebalance(
    prev: &Smap,
    cur: &Smap,
    rebalance_enabled: bool,
    joiner_interrupted_or_restarted: bool,
) -> bool {
    if !rebalance_enabled {
        return false;
    }
    if prev.active_target_count() == 0 {
        return false;
    }
    if joiner_interrupted_or_restarted {
        return true;
    }
    prev.active_target_ids() != cur.active_target_ids()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::meta::snode::{NetAddr, NodeType};

    fn node(id: &str, port: u16, ty: NodeType) -> Snode {
        Snode {
            id: id.to_string(),
            node_type: ty,
            public_addr: NetAddr { host: "h".into(), port },
            control_addr: NetAddr { host: "h".into(), port: port + 1 },
            data_addr: NetAddr { host: "h".into(), port: port + 2 },
            flags: Default::default(),
        }
    }

    #[test]
    fn bootstrap_is_self_consistent() {
        let p = node("p1", 9000, NodeType::Proxy);
        let smap = Smap::bootstrap("U".into(), p);
        smap.assert_consistent().unwrap();
        assert_eq!(smap.version, 1);
    }

    #[test]
    fn must_rebalance_on_target_set_change() {
        let p = node("p1", 9000, NodeType::Proxy);
        let mut prev = Smap::bootstrap("U".into(), p);
        prev = prev.with_node_upserted(node("t1", 9100, NodeType::Target));
        let cur = prev.with_node_upserted(node("t2", 9200, NodeType::Target));
        assert!(must_rebalance(&prev, &cur, true, false));
        assert!(!must_rebalance(&prev, &prev, true, false));
    }

    #[test]
    fn must_rebalance_false_without_prior_active_targets() {
        let p = node("p1", 9000, NodeType::Proxy);
        let prev = Smap::bootstrap("U".into(), p);
        let cur = prev.with_node_upserted(node("t1", 9100, NodeType::Target));
        assert!(!must_rebalance(&prev, &cur, true, false));
    }

    #[test]
    fn must_rebalance_true_on_interrupted_flag_even_if_unchanged() {
        let p = node("p1", 9000, NodeType::Proxy);
        let mut prev = Smap::bootstrap("U".into(), p);
        prev = prev.with_node_upserted(node("t1", 9100, NodeType::Target));
        assert!(must_rebalance(&prev, &prev, true, true));
    }
}
