// src/core/net/mod.rs

pub mod broadcast;
pub mod client;
pub mod metasync;

pub use broadcast::{BcastResult, Broadcaster, Recipients};
pub use client::IntraClusterClient;
pub use metasync::{Metasyncer, RevisionPush};
