// tests/property/invariants_test.rs

//! Property-based tests for the invariants enumerated in SPEC_FULL.md's
//! "testable properties" section. These drive `MetaOwner<Smap>` and the
//! pure `must_rebalance` predicate directly, without any network traffic.

use cplane::core::meta::{MetaKind, MetaOwner, ModifyCtx, NetAddr, NodeFlags, NodeType, Smap, Snode, must_rebalance};
use proptest::prelude::*;

fn node(id: &str, port: u16, ty: NodeType) -> Snode {
    Snode {
        id: id.to_string(),
        node_type: ty,
        public_addr: NetAddr { host: "h".into(), port },
        control_addr: NetAddr { host: "h".into(), port: port + 1 },
        data_addr: NetAddr { host: "h".into(), port: port + 2 },
        flags: NodeFlags::empty(),
    }
}

#[derive(Debug, Clone)]
enum Op {
    JoinTarget(u16),
    RemoveTarget(u16),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            (100u16..200).prop_map(Op::JoinTarget),
            (100u16..200).prop_map(Op::RemoveTarget),
        ],
        0..20,
    )
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

    /// Invariant 1: for any sequence of join/leave operations on the
    /// primary, Smap version is strictly increasing and uuid is constant.
    #[test]
    fn smap_version_strictly_increasing_uuid_constant(ops in ops()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let primary = node("p1", 9000, NodeType::Proxy);
            let initial = Smap::bootstrap("fixed-uuid".into(), primary);
            let owner: MetaOwner<Smap> = MetaOwner::new(initial, None);
            let uuid = owner.current().uuid.clone();
            let mut last_version = owner.current().version;

            for op in ops {
                let before = owner.current();
                let result = match op {
                    Op::JoinTarget(port) => {
                        let n = node(&format!("t{port}"), port, NodeType::Target);
                        owner.modify(ModifyCtx::<Smap>::new().pre(move |clone: &mut Smap| {
                            *clone = clone.with_node_upserted(n.clone());
                            Ok(())
                        })).await
                    }
                    Op::RemoveTarget(port) => {
                        let id = format!("t{port}");
                        owner.modify(ModifyCtx::<Smap>::new().pre(move |clone: &mut Smap| {
                            *clone = clone.with_node_removed(&id);
                            Ok(())
                        })).await
                    }
                };
                if let Ok(installed) = result {
                    prop_assert!(installed.version > before.version, "version must strictly increase");
                    prop_assert_eq!(&installed.uuid, &uuid, "uuid must stay constant");
                    last_version = installed.version;
                }
            }
            prop_assert!(owner.current().version >= last_version);
            Ok(())
        })?;
    }

    /// Invariant 3: `must_rebalance` tracks exactly whether the active-target
    /// id set differs, given rebalancing enabled and a non-empty prior set.
    #[test]
    fn must_rebalance_matches_active_set_difference(
        prior_ports in prop::collection::vec(100u16..110, 1..5),
        added_port in 150u16..160,
        remove_one in any::<bool>(),
    ) {
        let primary = node("p1", 9000, NodeType::Proxy);
        let mut prev = Smap::bootstrap("U".into(), primary);
        for p in &prior_ports {
            prev = prev.with_node_upserted(node(&format!("t{p}"), *p, NodeType::Target));
        }

        let mut cur = prev.clone();
        if remove_one && !prior_ports.is_empty() {
            cur = cur.with_node_removed(&format!("t{}", prior_ports[0]));
        } else {
            cur = cur.with_node_upserted(node(&format!("t{added_port}"), added_port, NodeType::Target));
        }

        let expected_diff = prev.active_target_ids() != cur.active_target_ids();
        prop_assert_eq!(must_rebalance(&prev, &cur, true, false), expected_diff);

        // disabled rebalancing always returns false regardless of the diff
        prop_assert!(!must_rebalance(&prev, &cur, false, false));

        // an interrupted/restarted joiner always forces true, given a
        // non-empty prior active set
        prop_assert!(must_rebalance(&prev, &cur, true, true));
    }
}

#[test]
fn metakind_version_round_trips_through_owner() {
    let primary = node("p1", 9000, NodeType::Proxy);
    let smap = Smap::bootstrap("U".into(), primary);
    assert_eq!(smap.version(), 1);
    assert_eq!(Smap::kind_name(), "smap");
}
