//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for inspecting the replica: fetch a
//! document, list everything held, and show identity and peers.

use crate::error::{Error, Result};
use crate::ingest;
use crate::node::NodeState;
use crate::threads;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Admin command sent over the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Show one document
    Get { id: String },
    /// List all documents, newest first
    List,
    /// Show this node's identity
    Identity,
    /// List connected peers
    Peers,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(state: Arc<NodeState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Serve admin connections until cancelled.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<NodeState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => match execute_command(cmd, &state).await {
                Ok(response) => response,
                Err(e) => AdminResponse::Error {
                    error: e.to_string(),
                },
            },
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, state: &NodeState) -> Result<AdminResponse> {
    match cmd {
        AdminCommand::Get { id } => {
            let store = state.session.store().await?;
            let document = ingest::get_by_id(store.as_ref(), &id).await?;
            Ok(AdminResponse::Ok {
                message: serde_json::to_string_pretty(&document)?,
            })
        }

        AdminCommand::List => {
            let store = state.session.store().await?;
            let view = threads::list_threaded(store.as_ref()).await?;
            let items = view
                .documents
                .iter()
                .map(|doc| {
                    let marker = if doc.parent_id().is_some() { "  reply" } else { "" };
                    format!("{} {}{}", doc.id, doc.created_at, marker)
                })
                .collect();
            Ok(AdminResponse::List { items })
        }

        AdminCommand::Identity => {
            let public_key = hex::encode(state.session.own_public_key().as_bytes());
            let address = match state.session.store().await {
                Ok(store) => store.address(),
                Err(Error::NotReady) => "(not open)".to_string(),
                Err(e) => return Err(e),
            };
            Ok(AdminResponse::List {
                items: vec![
                    format!("id: {}", state.session.own_identity()),
                    format!("public key: {}", public_key),
                    format!("store: {}", address),
                    format!("phase: {:?}", state.session.phase()),
                ],
            })
        }

        AdminCommand::Peers => {
            let items = state
                .transport
                .connected_peers()
                .await
                .into_iter()
                .map(|peer| format!("{} {}", peer.id, peer.addr))
                .collect();
            Ok(AdminResponse::List { items })
        }

        AdminCommand::Ping => Ok(AdminResponse::Pong),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::node::{AgoraNode, NodeConfig};
    use std::time::Duration;

    async fn roundtrip(path: &PathBuf, cmd: &AdminCommand) -> AdminResponse {
        let stream = UnixStream::connect(path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let line = serde_json::to_string(cmd).unwrap() + "\n";
        writer.write_all(line.as_bytes()).await.unwrap();

        let mut reader = BufReader::new(reader);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        serde_json::from_str(&response).unwrap()
    }

    async fn wait_for_socket(path: &PathBuf) {
        for _ in 0..100 {
            if UnixStream::connect(path).await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("admin socket never came up");
    }

    #[tokio::test]
    async fn admin_commands() {
        let dir = tempfile::tempdir().unwrap();
        let node = AgoraNode::new(NodeConfig::with_data_dir(dir.path()))
            .await
            .unwrap();
        let state = node.state();
        state.session.connect(|_| {}).await.unwrap();

        let store = state.session.store().await.unwrap();
        let doc = Document::new("hello admin".to_string());
        ingest::submit(store.as_ref(), &doc).await.unwrap();

        let path = dir.path().join("test.sock");
        let cancel = CancellationToken::new();
        let socket = AdminSocket::new(Arc::clone(&state), path.clone());
        let server = {
            let cancel = cancel.clone();
            tokio::spawn(async move { socket.run(cancel).await })
        };
        wait_for_socket(&path).await;

        assert!(matches!(
            roundtrip(&path, &AdminCommand::Ping).await,
            AdminResponse::Pong
        ));

        match roundtrip(&path, &AdminCommand::List).await {
            AdminResponse::List { items } => {
                assert_eq!(items.len(), 1);
                assert!(items[0].starts_with(&doc.id));
            }
            other => panic!("unexpected response: {:?}", other),
        }

        match roundtrip(&path, &AdminCommand::Get { id: doc.id.clone() }).await {
            AdminResponse::Ok { message } => assert!(message.contains("hello admin")),
            other => panic!("unexpected response: {:?}", other),
        }

        match roundtrip(&path, &AdminCommand::Get { id: "missing".into() }).await {
            AdminResponse::Error { error } => assert!(error.contains("missing")),
            other => panic!("unexpected response: {:?}", other),
        }

        match roundtrip(&path, &AdminCommand::Identity).await {
            AdminResponse::List { items } => {
                assert_eq!(items[0], format!("id: {}", state.session.own_identity()));
            }
            other => panic!("unexpected response: {:?}", other),
        }

        cancel.cancel();
        server.await.unwrap().unwrap();
        assert!(!path.exists());
        state.session.disconnect().await;
    }
}
