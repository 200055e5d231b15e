//! Agora Node - the main application entry point.
//!
//! Architecture:
//! - Replica session over a RocksDB-backed document store
//! - TCP peer transport for bootstrap connectivity
//! - HTTP API for clients (documents, threads, identity)
//! - Unix admin socket for local inspection (agora-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::cache::LocalCache;
use crate::error::{Error, Result};
use crate::peers::{PeerTransport, TcpTransport};
use crate::session::{ReplicaSession, SessionConfig};
use agora_store::{Replicator, RocksReplicator, DEFAULT_OPEN_TIMEOUT};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for an Agora node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for the replica and the local cache
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// P2P listen address
    pub p2p_addr: SocketAddr,

    /// Bootstrap peers
    pub bootstrap_peers: Vec<String>,

    /// Admin socket path (for agora-admin CLI)
    pub admin_socket: PathBuf,

    /// Name of the replicated document store
    pub store_name: String,

    /// How long opening the store may take
    pub open_timeout: Duration,
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(
            std::env::var("AGORA_DATA_DIR").unwrap_or_else(|_| "./agora-data".to_string()),
        );

        let api_addr = parse_addr("AGORA_API_ADDR", "127.0.0.1:8001")?;
        let p2p_addr = parse_addr("AGORA_P2P_ADDR", "0.0.0.0:9100")?;

        let bootstrap_peers = std::env::var("AGORA_BOOTSTRAP_PEERS")
            .map(|s| parse_peer_list(&s))
            .unwrap_or_default();

        let admin_socket = std::env::var("AGORA_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("admin.sock"));

        let store_name =
            std::env::var("AGORA_STORE_NAME").unwrap_or_else(|_| "agora-articles".to_string());

        let open_timeout = match std::env::var("AGORA_OPEN_TIMEOUT_SECS") {
            Ok(secs) => Duration::from_secs(secs.trim().parse().map_err(|_| {
                Error::Config(format!("Invalid AGORA_OPEN_TIMEOUT_SECS: {}", secs))
            })?),
            Err(_) => DEFAULT_OPEN_TIMEOUT,
        };

        Ok(Self {
            data_dir,
            api_addr,
            p2p_addr,
            bootstrap_peers,
            admin_socket,
            store_name,
            open_timeout,
        })
    }

    /// Config rooted at `data_dir` with default addresses.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            admin_socket: data_dir.join("admin.sock"),
            data_dir,
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8001)),
            p2p_addr: SocketAddr::from(([0, 0, 0, 0], 9100)),
            bootstrap_peers: Vec::new(),
            store_name: "agora-articles".to_string(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

fn parse_addr(var: &str, default: &str) -> Result<SocketAddr> {
    let value = std::env::var(var).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {}: {}", var, value)))
}

fn parse_peer_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Shared state for the node, handed to the API and the admin socket.
pub struct NodeState {
    pub session: Arc<ReplicaSession>,
    pub cache: Arc<LocalCache>,
    pub transport: Arc<TcpTransport>,
    pub config: NodeConfig,
}

/// An Agora node instance.
pub struct AgoraNode {
    state: Arc<NodeState>,
    cancel: CancellationToken,
}

impl AgoraNode {
    /// Create a new node. Nothing is bound or dialed until [`AgoraNode::run`].
    pub async fn new(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(config.store_dir())?;
        std::fs::create_dir_all(config.cache_dir())?;

        let cache = Arc::new(LocalCache::open(config.cache_dir())?);
        let signing_key = cache.get_or_create_node_key()?;
        let replicator = Arc::new(RocksReplicator::new(config.store_dir(), signing_key));
        let identity = replicator.identity().clone();
        tracing::info!("Node identity: {}", identity.id());

        let cancel = CancellationToken::new();
        let transport = Arc::new(TcpTransport::new(
            identity.id().to_string(),
            config.p2p_addr,
            config.bootstrap_peers.clone(),
            cancel.child_token(),
        ));
        let session = Arc::new(ReplicaSession::new(
            replicator,
            Arc::clone(&transport) as Arc<dyn PeerTransport>,
            SessionConfig {
                store_name: config.store_name.clone(),
                open_timeout: config.open_timeout,
            },
            cancel.child_token(),
        ));

        let state = Arc::new(NodeState {
            session,
            cache,
            transport,
            config,
        });
        Ok(Self { state, cancel })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Token that stops the node when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the node until Ctrl-C or the shutdown token fires.
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        tracing::info!("Agora node starting");
        tracing::info!("  API: http://{}", config.api_addr);
        tracing::info!("  P2P: {}", config.p2p_addr);
        tracing::info!("  Admin: {:?}", config.admin_socket);
        tracing::info!("  Data: {:?}", config.data_dir);

        let listener = self.state.transport.bind().await?;
        tokio::spawn(Arc::clone(&self.state.transport).serve(listener));

        let admin_socket = AdminSocket::new(self.state(), config.admin_socket.clone());
        let admin_cancel = self.cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run(admin_cancel).await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let connected = tokio::select! {
            _ = shutdown_signal(self.cancel.clone()) => Err(Error::Cancelled),
            connected = self.state.session.connect(|address| {
                tracing::info!("Replica ready, store address {}", address);
            }) => connected,
        };
        if let Err(e) = connected {
            self.state.session.disconnect().await;
            self.cancel.cancel();
            return match e {
                Error::Cancelled => Ok(()),
                e => Err(e),
            };
        }

        let app = api::build_router(self.state());
        let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", config.api_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
            .await?;

        tracing::info!("Shutting down");
        self.state.session.disconnect().await;
        self.cancel.cancel();
        Ok(())
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                // Without a signal handler only the token can stop the node.
                cancel.cancelled().await;
            }
        }
    }
    cancel.cancel();
}
