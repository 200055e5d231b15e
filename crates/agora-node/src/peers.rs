//! Peer connectivity.
//!
//! Bootstrap peers are dialed once at startup, all in parallel. A failed
//! attempt is logged and otherwise ignored: the replica works (and replicates
//! later) without them.
//!
//! [`TcpTransport`] is the shipped transport. Each side writes a JSON hello
//! line carrying its identity and reads the other's; the connection is then
//! held open and tracked until the remote closes it or the node shuts down.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a dial plus hello exchange may take.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Address of a peer as configured, e.g. `10.0.0.7:9100`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr(String);

impl PeerAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport used to reach other replicas.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Peers to dial at startup.
    async fn bootstrap_peers(&self) -> Result<Vec<PeerAddr>>;

    /// Connect to one peer.
    async fn connect(&self, peer: &PeerAddr) -> Result<()>;
}

/// Dial every peer in its own task and wait for all of them.
///
/// Never fails. Returns how many peers connected. Cancelling the token
/// abandons attempts still in flight.
pub async fn connect_all(
    transport: Arc<dyn PeerTransport>,
    peers: Vec<PeerAddr>,
    cancel: CancellationToken,
) -> usize {
    if peers.is_empty() {
        return 0;
    }
    info!("Connecting to {} bootstrap peers", peers.len());

    let attempts = peers.into_iter().map(|peer| {
        let transport = Arc::clone(&transport);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Connection to {} abandoned", peer);
                    false
                }
                result = transport.connect(&peer) => match result {
                    Ok(()) => {
                        info!("Connected to peer {}", peer);
                        true
                    }
                    Err(e) => {
                        warn!("Failed to connect to peer {}: {}", peer, e);
                        false
                    }
                },
            }
        })
    });

    let mut connected = 0;
    for joined in futures::future::join_all(attempts).await {
        match joined {
            Ok(true) => connected += 1,
            Ok(false) => {}
            Err(e) => error!("Peer connection task failed: {}", e),
        }
    }
    connected
}

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    #[serde(rename = "type")]
    kind: String,
    node_id: String,
}

impl Hello {
    fn new(node_id: &str) -> Self {
        Self {
            kind: "hello".to_string(),
            node_id: node_id.to_string(),
        }
    }
}

/// A peer with a live connection.
#[derive(Debug, Clone)]
pub struct ConnectedPeer {
    pub id: String,
    pub addr: SocketAddr,
    pub connected_at: Instant,
}

/// TCP transport with a JSON-line hello handshake.
pub struct TcpTransport {
    self_id: String,
    listen_addr: SocketAddr,
    bootstrap: Vec<PeerAddr>,
    peers: Arc<RwLock<HashMap<String, ConnectedPeer>>>,
    cancel: CancellationToken,
}

impl TcpTransport {
    pub fn new(
        self_id: String,
        listen_addr: SocketAddr,
        bootstrap: Vec<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            self_id,
            listen_addr,
            bootstrap: bootstrap.into_iter().map(PeerAddr::new).collect(),
            peers: Arc::new(RwLock::new(HashMap::new())),
            cancel,
        }
    }

    /// Peers with a live connection, by id.
    pub async fn connected_peers(&self) -> Vec<ConnectedPeer> {
        let mut peers: Vec<_> = self.peers.read().await.values().cloned().collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!("Peer transport listening on {}", self.listen_addr);
        Ok(listener)
    }

    /// Accept incoming peers until cancelled.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    debug!("Incoming peer connection from {}", addr);
                    let transport = Arc::clone(&self);
                    tokio::spawn(async move {
                        let handshake = tokio::time::timeout(
                            CONNECT_TIMEOUT,
                            transport.handshake(stream, addr),
                        );
                        match handshake.await {
                            Ok(Ok(peer_id)) => debug!("Peer {} connected from {}", peer_id, addr),
                            Ok(Err(e)) => warn!("Handshake with {} failed: {}", addr, e),
                            Err(_) => warn!("Handshake with {} timed out", addr),
                        }
                    });
                }
                Err(e) => error!("Accept error: {}", e),
            }
        }
        debug!("Peer listener stopped");
    }

    /// Exchange hellos, register the peer, and keep the connection open in
    /// a background task. Returns the remote identity.
    async fn handshake(&self, stream: TcpStream, addr: SocketAddr) -> Result<String> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let hello = serde_json::to_string(&Hello::new(&self.self_id))? + "\n";
        writer.write_all(hello.as_bytes()).await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(Error::Network(format!("{} closed before hello", addr)));
        }
        let remote: Hello = serde_json::from_str(line.trim_end())?;
        if remote.kind != "hello" || remote.node_id.is_empty() {
            return Err(Error::Network(format!("{} sent an invalid hello", addr)));
        }
        if remote.node_id == self.self_id {
            return Err(Error::Network(format!("{} is this node", addr)));
        }

        let peer_id = remote.node_id;
        self.peers.write().await.insert(
            peer_id.clone(),
            ConnectedPeer {
                id: peer_id.clone(),
                addr,
                connected_at: Instant::now(),
            },
        );

        let peers = Arc::clone(&self.peers);
        let cancel = self.cancel.clone();
        let id = peer_id.clone();
        tokio::spawn(async move {
            // Held open until EOF; nothing is exchanged after the hello.
            let _writer = writer;
            let mut line = String::new();
            loop {
                line.clear();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    read = reader.read_line(&mut line) => match read {
                        Ok(0) | Err(_) => break,
                        Ok(_) => debug!("Ignoring message from peer {}", id),
                    },
                }
            }
            peers.write().await.remove(&id);
            debug!("Peer {} disconnected", id);
        });

        Ok(peer_id)
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn bootstrap_peers(&self) -> Result<Vec<PeerAddr>> {
        Ok(self.bootstrap.clone())
    }

    async fn connect(&self, peer: &PeerAddr) -> Result<()> {
        let dial = async {
            let stream = TcpStream::connect(peer.as_str())
                .await
                .map_err(|e| Error::Network(format!("{}: {}", peer, e)))?;
            let addr = stream.peer_addr()?;
            self.handshake(stream, addr).await
        };
        let peer_id = tokio::time::timeout(CONNECT_TIMEOUT, dial)
            .await
            .map_err(|_| Error::Network(format!("{}: connect timed out", peer)))??;
        debug!("Peer {} is {}", peer, peer_id);
        Ok(())
    }
}
