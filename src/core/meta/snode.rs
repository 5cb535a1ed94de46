// src/core/meta/snode.rs

//! Node descriptor (Snode): the immutable identity of one proxy or target.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Proxy,
    Target,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proxy => write!(f, "proxy"),
            Self::Target => write!(f, "target"),
        }
    }
}

bitflags! {
    /// Runtime flags carried on a node descriptor. `NON_ELECTABLE` is the one
    /// bit accepted from the `node-flags` request header for proxies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct NodeFlags: u16 {
        const NON_ELECTABLE      = 0b0000_0001;
        const MAINTENANCE        = 0b0000_0010;
        const MAINT_POST_REBAL   = 0b0000_0100;
        const DECOMMISSIONING    = 0b0000_1000;
        const IC_MEMBER          = 0b0001_0000;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        NodeFlags::empty()
    }
}

impl NodeFlags {
    pub fn is_maint(&self) -> bool {
        self.contains(NodeFlags::MAINTENANCE)
    }

    pub fn is_maint_post_rebalance(&self) -> bool {
        self.contains(NodeFlags::MAINT_POST_REBAL)
    }

    pub fn is_decommissioning(&self) -> bool {
        self.contains(NodeFlags::DECOMMISSIONING)
    }

    /// A target is "draining" when it has been told to leave but the map
    /// still carries it (mid-maintenance with rebalance not yet finished, or
    /// mid-decommission). Used by the abort-rebalance ordering rule.
    pub fn is_draining(&self) -> bool {
        (self.is_maint() && !self.is_maint_post_rebalance()) || self.is_decommissioning()
    }

    pub fn is_active_target(&self) -> bool {
        !self.is_maint() && !self.is_decommissioning()
    }

    pub fn is_electable(&self) -> bool {
        !self.contains(NodeFlags::NON_ELECTABLE)
    }
}

/// A hostname+port pair. Kept as a plain struct rather than `SocketAddr` since
/// the hostname may not yet be resolved at descriptor-construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl NetAddr {
    pub fn url(&self, https: bool) -> String {
        let scheme = if https { "https" } else { "http" };
        format!("{scheme}://{self}")
    }
}

/// Immutable node identity. Two descriptors are equal iff id, type, and all
/// three addresses are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub public_addr: NetAddr,
    pub control_addr: NetAddr,
    pub data_addr: NetAddr,
    #[serde(default)]
    pub flags: NodeFlags,
}

impl PartialEq for Snode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.node_type == other.node_type
            && self.public_addr == other.public_addr
            && self.control_addr == other.control_addr
            && self.data_addr == other.data_addr
    }
}
impl Eq for Snode {}

impl Snode {
    pub fn is_proxy(&self) -> bool {
        self.node_type == NodeType::Proxy
    }

    pub fn is_target(&self) -> bool {
        self.node_type == NodeType::Target
    }

    /// True if this descriptor and `other` share any of the three addresses,
    /// even when their ids differ. Used to reject a join that would
    /// silently alias an existing node under a new id.
    pub fn shares_address_with(&self, other: &Snode) -> bool {
        self.public_addr == other.public_addr
            || self.control_addr == other.control_addr
            || self.data_addr == other.data_addr
    }

    pub fn control_url(&self, https: bool) -> String {
        self.control_addr.url(https)
    }
}
