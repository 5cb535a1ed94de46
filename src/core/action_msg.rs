// src/core/action_msg.rs

//! The action-message envelope: `{action, name?, value?}` carried by PUT
//! bodies to `/v1/cluster`, `/v1/daemon`, and `/v1/xactions`.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    SetConfig,
    ResetConfig,
    RotateLogs,
    ShutdownCluster,
    DecommissionCluster,
    StartMaintenance,
    StopMaintenance,
    DecommissionNode,
    ShutdownNode,
    RmNodeUnsafe,
    ResetStats,
    XactStart,
    XactStop,
    BumpMetasync,
    AttachRemais,
    DetachRemais,
    EnableBackend,
    DisableBackend,
    LoadX509,
    SelfJoinProxy,
    SelfJoinTarget,
    AdminJoinProxy,
    AdminJoinTarget,
    KeepaliveUpdate,
    CleanupMarkers,
    StartGfn,
    StopGfn,
    SelfRemove,
    PrimaryForce,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionMsg {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl ActionMsg {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            name: None,
            value: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn action_display_and_parse_round_trip_kebab_case() {
        assert_eq!(Action::SelfJoinTarget.to_string(), "self-join-target");
        assert_eq!(Action::from_str("bump-metasync").unwrap(), Action::BumpMetasync);
        assert!(Action::from_str("not-a-real-action").is_err());
    }

    #[test]
    fn action_msg_serializes_without_absent_optional_fields() {
        let msg = ActionMsg::new(Action::ShutdownCluster);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({ "action": "shutdown-cluster" }));
    }

    #[test]
    fn action_msg_builder_round_trips_through_json() {
        let msg = ActionMsg::new(Action::XactStart)
            .with_name("t1")
            .with_value(serde_json::json!({ "kind": "rebalance" }));
        let json = serde_json::to_string(&msg).unwrap();
        let back: ActionMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back.action, Action::XactStart);
        assert_eq!(back.name.as_deref(), Some("t1"));
        assert_eq!(back.value.unwrap()["kind"], "rebalance");
    }
}
