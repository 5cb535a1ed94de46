// src/core/membership/mod.rs

//! MembershipCoordinator: the state machines for join, early-GFN, rebalance
//! triggering, graceful removal, and forced-primary change.

pub mod client;
pub mod gfn;
pub mod join;
pub mod maintenance;
pub mod primary;
pub mod rebalance;

pub use join::JoinOutcome;
pub use maintenance::RemovalKind;
pub use primary::ForcePrimaryRequest;
