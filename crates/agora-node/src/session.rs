//! Replica session: joins the peer swarm, opens the shared document store
//! and reports once local history has been replayed.
//!
//! The readiness subscription is taken before history replay is requested,
//! so the event cannot fire unobserved. A background listener consumes store
//! events and hands the store address to the caller's callback on the first
//! readiness event only; re-deliveries are logged and dropped.

use crate::error::{Error, Result};
use crate::peers::{connect_all, PeerTransport};
use agora_store::{
    AccessPolicy, DocumentStore, OpenOptions, Replay, Replicator, StoreEvent,
    DEFAULT_OPEN_TIMEOUT,
};
use ed25519_dalek::VerifyingKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    StoreOpening,
    AwaitingReady,
    Replaying,
    Ready,
    Closed,
}

/// Which store a session opens.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub store_name: String,
    pub open_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_name: "agora-articles".to_string(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

/// Connection to the replicated document store.
pub struct ReplicaSession {
    replicator: Arc<dyn Replicator>,
    transport: Arc<dyn PeerTransport>,
    config: SessionConfig,
    cancel: CancellationToken,
    phase: watch::Sender<SessionPhase>,
    store: RwLock<Option<Arc<dyn DocumentStore>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicaSession {
    pub fn new(
        replicator: Arc<dyn Replicator>,
        transport: Arc<dyn PeerTransport>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Disconnected);
        Self {
            replicator,
            transport,
            config,
            cancel,
            phase,
            store: RwLock::new(None),
            listener: Mutex::new(None),
        }
    }

    /// Connect to bootstrap peers, open the store and replay its history.
    ///
    /// `on_ready` runs at most once, from the listener task, with the store
    /// address. Peer failures are logged; store open, subscription and
    /// replay failures are returned.
    pub async fn connect<F>(&self, on_ready: F) -> Result<()>
    where
        F: FnOnce(String) + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        // Claim the session in the same step as the phase check.
        let mut claimed = false;
        self.phase.send_if_modified(|current| {
            if *current != SessionPhase::Disconnected {
                return false;
            }
            debug!("Session phase {:?} -> {:?}", current, SessionPhase::Connecting);
            *current = SessionPhase::Connecting;
            claimed = true;
            true
        });
        if !claimed {
            return Err(Error::Config("session already connected".into()));
        }

        match self.transport.bootstrap_peers().await {
            Ok(peers) => {
                let total = peers.len();
                let connected =
                    connect_all(Arc::clone(&self.transport), peers, self.cancel.clone()).await;
                info!("Connected to {}/{} bootstrap peers", connected, total);
            }
            Err(e) => warn!("Failed to list bootstrap peers: {}", e),
        }

        self.set_phase(SessionPhase::StoreOpening);
        info!("Opening store '{}'", self.config.store_name);
        let opts = OpenOptions::default()
            .with_access(AccessPolicy::open())
            .with_timeout(self.config.open_timeout);
        let store = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            opened = self.replicator.open(&self.config.store_name, opts) => {
                opened.map_err(|e| {
                    error!("Failed to open store '{}': {}", self.config.store_name, e);
                    e
                })?
            }
        };

        {
            let mut slot = self.store.write().await;
            if self.cancel.is_cancelled() {
                drop(slot);
                if let Err(e) = store.close().await {
                    warn!("Failed to close store after cancel: {}", e);
                }
                return Err(Error::Cancelled);
            }
            *slot = Some(Arc::clone(&store));
        }

        let events = store.subscribe()?;
        let phases = self.phase.subscribe();
        self.set_phase(SessionPhase::AwaitingReady);
        let handle = tokio::spawn(listen_for_ready(
            events,
            phases,
            Arc::clone(&store),
            on_ready,
            self.cancel.clone(),
        ));
        *self.listener.lock().await = Some(handle);

        self.set_phase(SessionPhase::Replaying);
        info!("Replaying store history");
        tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            loaded = store.load(Replay::All) => loaded?,
        }

        self.set_phase(SessionPhase::Ready);
        info!("Replica session ready");
        Ok(())
    }

    /// Stop the listener and close the store and the replicator.
    ///
    /// Safe to call at any time and more than once. Close failures are
    /// logged.
    pub async fn disconnect(&self) {
        self.cancel.cancel();

        if let Some(handle) = self.listener.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Readiness listener ended abnormally: {}", e);
            }
        }
        if let Some(store) = self.store.write().await.take() {
            if let Err(e) = store.close().await {
                warn!("Failed to close store: {}", e);
            }
        }
        if self.phase() != SessionPhase::Closed {
            if let Err(e) = self.replicator.close().await {
                warn!("Failed to close replicator: {}", e);
            }
            info!("Replica session closed");
        }
        self.set_phase(SessionPhase::Closed);
    }

    /// The open store.
    pub async fn store(&self) -> Result<Arc<dyn DocumentStore>> {
        self.store.read().await.clone().ok_or(Error::NotReady)
    }

    /// This replica's identity id.
    pub fn own_identity(&self) -> String {
        self.replicator.identity().id().to_string()
    }

    /// This replica's public key.
    pub fn own_public_key(&self) -> VerifyingKey {
        *self.replicator.identity().public_key()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Wait until the session is ready. Fails if it closes first.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut phases = self.phase.subscribe();
        let phase = *phases
            .wait_for(|p| matches!(p, SessionPhase::Ready | SessionPhase::Closed))
            .await
            .map_err(|_| Error::Cancelled)?;
        match phase {
            SessionPhase::Ready => Ok(()),
            _ => Err(Error::Cancelled),
        }
    }

    fn set_phase(&self, next: SessionPhase) {
        self.phase.send_if_modified(|current| {
            // Closed is final.
            if *current == SessionPhase::Closed || *current == next {
                return false;
            }
            debug!("Session phase {:?} -> {:?}", current, next);
            *current = next;
            true
        });
    }
}

/// Hand the store address to `on_ready` on the first readiness event.
///
/// Readiness shares the bus with write notifications. If the receiver lags
/// while the callback is still pending, the readiness event may have been
/// among those dropped, so the listener falls back to the session phase,
/// which turns `Ready` only once replay has finished.
async fn listen_for_ready<F>(
    mut events: broadcast::Receiver<StoreEvent>,
    mut phases: watch::Receiver<SessionPhase>,
    store: Arc<dyn DocumentStore>,
    on_ready: F,
    cancel: CancellationToken,
) where
    F: FnOnce(String) + Send + 'static,
{
    let mut on_ready = Some(on_ready);
    let mut readiness_unseen = false;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            changed = phases.changed(), if readiness_unseen && on_ready.is_some() => {
                if changed.is_err() {
                    readiness_unseen = false;
                } else if *phases.borrow_and_update() == SessionPhase::Ready {
                    fire_ready(&mut on_ready, store.as_ref());
                }
                continue;
            }
            event = events.recv() => event,
        };
        match event {
            Ok(StoreEvent::Ready) => fire_ready(&mut on_ready, store.as_ref()),
            Ok(StoreEvent::Closed) => break,
            Ok(event) => debug!("Store event: {:?}", event),
            Err(RecvError::Lagged(missed)) if on_ready.is_some() => {
                warn!(
                    "Readiness listener lagged, {} events missed; readiness may have been dropped",
                    missed
                );
                if *phases.borrow_and_update() == SessionPhase::Ready {
                    fire_ready(&mut on_ready, store.as_ref());
                } else {
                    readiness_unseen = true;
                }
            }
            Err(RecvError::Lagged(missed)) => {
                debug!("Readiness listener lagged, {} events missed", missed)
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Readiness listener stopped");
}

fn fire_ready<F>(on_ready: &mut Option<F>, store: &dyn DocumentStore)
where
    F: FnOnce(String),
{
    match on_ready.take() {
        Some(callback) => {
            let address = store.address();
            info!("Replica ready at {}", address);
            callback(address);
        }
        None => debug!("Repeated readiness event ignored"),
    }
}
