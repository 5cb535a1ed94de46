// tests/integration/test_helpers.rs

//! Test helpers: spins up one or more real `cplane` nodes, each serving its
//! actual axum router over a loopback TCP listener, so join/metasync/gfn
//! traffic between them exercises the real `reqwest`-based client rather
//! than a mock.

use cplane::config::{Config, MetricsConfig, PrimaryDiscovery, TlsConfig};
use cplane::core::meta::{NetAddr, NodeType, Snode};
use cplane::core::state::ClusterState;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tracing_subscriber::{filter::EnvFilter, reload};

pub struct TestNode {
    pub state: Arc<ClusterState>,
    pub addr: std::net::SocketAddr,
    pub node: Snode,
    _state_dir: TempDir,
    _shutdown: Option<oneshot::Sender<()>>,
}

impl TestNode {
    /// Binds an ephemeral loopback port, builds a `Snode`/`Config` advertising
    /// it, bootstraps `ClusterState`, and serves the real router on it.
    pub async fn spawn(id: &str, node_type: NodeType, is_primary: bool) -> Self {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        let net_addr = NetAddr {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let node = Snode {
            id: id.to_string(),
            node_type,
            public_addr: net_addr.clone(),
            control_addr: net_addr.clone(),
            data_addr: net_addr,
            flags: Default::default(),
        };

        let state_dir = TempDir::new().unwrap();
        let config = Config {
            host: addr.ip().to_string(),
            port: addr.port(),
            log_level: "warn".to_string(),
            state_dir: state_dir.path().to_string_lossy().into_owned(),
            node: cplane::config::NodeIdentity {
                id: node.id.clone(),
                node_type: node.node_type,
                public_addr: node.public_addr.clone(),
                control_addr: node.control_addr.clone(),
                data_addr: node.data_addr.clone(),
            },
            primary: PrimaryDiscovery::default(),
            tls: TlsConfig::default(),
            metrics: MetricsConfig {
                enabled: false,
                port: 0,
            },
            max_bcast_parallel: 64,
        };

        let (_filter, reload_handle) = reload::Layer::new(EnvFilter::new("warn"));
        let state = ClusterState::bootstrap(config, node.clone(), is_primary, Arc::new(reload_handle));
        state.set_ready(is_primary);

        let app = cplane::core::http::router(state.clone());
        let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            state,
            addr,
            node,
            _state_dir: state_dir,
            _shutdown: Some(tx),
        }
    }

    pub fn control_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::new()
}
