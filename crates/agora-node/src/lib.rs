//! Agora Node - replicated threaded documents
//!
//! A node joins a swarm of peers, opens a shared document store that every
//! peer may write to, and serves the documents it holds as reply threads.
//!
//! # Architecture
//!
//! - **Session**: peer bootstrap, store opening and the readiness handshake
//! - **Threads**: rebuilds reply trees from the flat document set
//! - **Ingest**: validates and writes new documents
//! - **Cache**: node-local read marks and the node signing key
//! - **API**: HTTP endpoints for documents and threads
//! - **Admin Socket**: Unix socket for local inspection (agora-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use agora_node::{AgoraNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = AgoraNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod cache;
pub mod error;
pub mod ingest;
pub mod models;
pub mod node;
pub mod peers;
pub mod session;
pub mod threads;

#[cfg(test)]
mod test_support;

pub use cache::LocalCache;
pub use error::{Error, Result};
pub use models::Document;
pub use node::{AgoraNode, NodeConfig, NodeState};
pub use peers::{connect_all, PeerAddr, PeerTransport, TcpTransport};
pub use session::{ReplicaSession, SessionConfig, SessionPhase};
pub use threads::ThreadView;
