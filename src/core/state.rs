// src/core/state.rs

//! `ClusterState`: the process-wide context threaded through the HTTP
//! router and every background task. Bundles the four `MetaOwner`s, the
//! live keepalive registry, the xaction registry, and the single-flight
//! guard for forced-primary changes.

use crate::config::Config;
use crate::core::meta::{Bmd, CluMeta, GlobalConfig, MetaOwner, Rmd, Smap, Snode};
use crate::core::net::{Broadcaster, IntraClusterClient, Metasyncer};
use crate::core::xaction::XactRegistry;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing_subscriber::{filter::EnvFilter, reload};

/// A self-join received before the primary has finished bootstrapping is
/// queued here and replayed once bootstrap completes, per §4.4.1. The
/// second element is the claimed cluster uuid carried by that join, if any.
pub struct RegistrationPool {
    pub pending: AsyncMutex<Vec<(Snode, Option<String>)>>,
}

impl Default for RegistrationPool {
    fn default() -> Self {
        Self {
            pending: AsyncMutex::new(Vec::new()),
        }
    }
}

pub struct ClusterState {
    pub config: Config,
    pub my_id: String,

    pub smap: MetaOwner<Smap>,
    pub bmd: MetaOwner<Bmd>,
    pub rmd: MetaOwner<Rmd>,
    pub global_config: MetaOwner<GlobalConfig>,

    pub client: IntraClusterClient,
    pub broadcaster: Broadcaster,
    pub metasyncer: Metasyncer,
    pub xactions: XactRegistry,

    /// `nodeId -> lastHeard`, refreshed on every keepalive fast or slow path.
    pub last_heard: DashMap<String, Instant>,

    /// Single-flight guard (`settingNewPrimary`): a second concurrent
    /// forced-primary protocol fails immediately.
    pub setting_new_primary: AtomicBool,

    /// Whether this process currently believes itself to be the primary.
    pub is_primary: AtomicBool,

    /// "primary ready and rebalance-capable" -- the readiness gate of §4.5.
    pub pready: AtomicBool,

    pub registration_pool: RegistrationPool,

    /// Handle onto the `tracing-subscriber` `EnvFilter` layer, allowing
    /// `set-config`'s `log_level` patch to change the log level without a
    /// restart. Mirrors the teacher's identical field on its own state.
    pub log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
}

impl ClusterState {
    pub fn bootstrap(
        config: Config,
        my_node: Snode,
        is_primary: bool,
        log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    ) -> Arc<Self> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let state_dir = PathBuf::from(&config.state_dir);
        let smap = Smap::bootstrap(uuid.clone(), my_node.clone());
        let bmd = Bmd::bootstrap(uuid.clone());
        let global_config = GlobalConfig::bootstrap(uuid.clone());
        let rmd = Rmd::empty(uuid.clone());

        Arc::new(Self {
            my_id: my_node.id.clone(),
            smap: MetaOwner::from_file_or(state_dir.join("smap.json"), smap),
            bmd: MetaOwner::from_file_or(state_dir.join("bmd.json"), bmd),
            rmd: MetaOwner::from_file_or(state_dir.join("rmd.json"), rmd),
            global_config: MetaOwner::from_file_or(state_dir.join("config.json"), global_config),
            client: IntraClusterClient::new(),
            broadcaster: Broadcaster::new(IntraClusterClient::new()),
            metasyncer: Metasyncer::new(IntraClusterClient::new()),
            xactions: XactRegistry::new(),
            last_heard: DashMap::new(),
            setting_new_primary: AtomicBool::new(false),
            is_primary: AtomicBool::new(is_primary),
            pready: AtomicBool::new(is_primary),
            registration_pool: RegistrationPool::default(),
            log_reload_handle,
            config,
        })
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.pready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.pready.store(ready, Ordering::Release);
    }

    pub fn primary_url(&self) -> Option<String> {
        let smap = self.smap.current();
        smap.primary().map(|p| p.control_url(self.config.tls.enabled))
    }

    pub fn touch_last_heard(&self, node_id: &str) {
        self.last_heard.insert(node_id.to_string(), Instant::now());
    }

    /// Current cluMeta snapshot: one version each of Smap, BMD, config, RMD.
    pub fn clu_meta(&self) -> CluMeta {
        CluMeta {
            smap: Some((*self.smap.current()).clone()),
            bmd: (*self.bmd.current()).clone(),
            config: (*self.global_config.current()).clone(),
            rmd: (*self.rmd.current()).clone(),
        }
    }

    /// Tries to acquire the forced-primary single-flight guard. Returns
    /// `false` (without side effects) if another protocol is already
    /// in-flight.
    pub fn try_start_forced_primary(&self) -> bool {
        self.setting_new_primary
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish_forced_primary(&self) {
        self.setting_new_primary.store(false, Ordering::Release);
    }
}
