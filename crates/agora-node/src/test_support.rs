//! In-memory fakes for the store and transport traits.

use crate::error::{Error, Result};
use crate::peers::{PeerAddr, PeerTransport};
use agora_store::{
    DocumentStore, Filter, GetOptions, Identity, OpenOptions, Record, RecordExt, Replay,
    Replicator, StoreEvent,
};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

/// Document store held in memory, indexed by `id`.
pub struct MemoryStore {
    records: Mutex<Vec<Record>>,
    events: broadcast::Sender<StoreEvent>,
    closed: AtomicBool,
    puts: AtomicUsize,
    loads: AtomicUsize,
    closes: AtomicUsize,
    ready_events_per_load: usize,
    writes_after_ready: usize,
    fail_load: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_ready_events(1)
    }

    /// A store that emits `count` readiness events on every load.
    pub fn with_ready_events(count: usize) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            records: Mutex::new(Vec::new()),
            events,
            closed: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            ready_events_per_load: count,
            writes_after_ready: 0,
            fail_load: false,
        }
    }

    /// A store that emits `count` write events right after readiness on
    /// every load.
    pub fn with_writes_after_ready(count: usize) -> Self {
        Self {
            writes_after_ready: count,
            ..Self::new()
        }
    }

    /// A store whose history replay fails.
    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn receiver_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    fn ensure_open(&self) -> agora_store::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(agora_store::Error::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn address(&self) -> String {
        "/agora/memory/articles".to_string()
    }

    fn subscribe(&self) -> agora_store::Result<broadcast::Receiver<StoreEvent>> {
        self.ensure_open()?;
        Ok(self.events.subscribe())
    }

    async fn load(&self, _replay: Replay) -> agora_store::Result<()> {
        self.ensure_open()?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(agora_store::Error::Storage("replay failed".into()));
        }
        for _ in 0..self.ready_events_per_load {
            let _ = self.events.send(StoreEvent::Ready);
        }
        for n in 0..self.writes_after_ready {
            let _ = self.events.send(StoreEvent::Write {
                id: format!("replayed-{}", n),
            });
        }
        Ok(())
    }

    async fn put(&self, record: Record) -> agora_store::Result<String> {
        self.ensure_open()?;
        let id = record
            .str_field("id")
            .map(str::to_string)
            .ok_or_else(|| agora_store::Error::MissingIndexField("id".into()))?;
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.str_field("id") != Some(id.as_str()));
        records.push(record);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn get(&self, id: &str, opts: GetOptions) -> agora_store::Result<Vec<Record>> {
        self.ensure_open()?;
        Ok(self
            .records()
            .into_iter()
            .filter(|r| match r.str_field("id") {
                Some(rid) if opts.case_insensitive => rid.eq_ignore_ascii_case(id),
                Some(rid) => rid == id,
                None => false,
            })
            .collect())
    }

    async fn query(&self, filter: Filter<'_>) -> agora_store::Result<Vec<Record>> {
        self.ensure_open()?;
        let mut out = Vec::new();
        for record in self.records() {
            if filter(&record)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn close(&self) -> agora_store::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send(StoreEvent::Closed);
        }
        Ok(())
    }
}

/// Replicator handing out one shared [`MemoryStore`].
pub struct MemoryReplicator {
    identity: Identity,
    store: Arc<MemoryStore>,
    opened_with: Mutex<Option<OpenOptions>>,
    open_gate: Option<Arc<Notify>>,
    fail_open: bool,
    closes: AtomicUsize,
}

impl MemoryReplicator {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            identity: Identity::from_signing_key(&SigningKey::from_bytes(&[9u8; 32])),
            store,
            opened_with: Mutex::new(None),
            open_gate: None,
            fail_open: false,
            closes: AtomicUsize::new(0),
        }
    }

    /// Opening waits until the gate is notified.
    pub fn gated(store: Arc<MemoryStore>, gate: Arc<Notify>) -> Self {
        Self {
            open_gate: Some(gate),
            ..Self::new(store)
        }
    }

    pub fn failing(store: Arc<MemoryStore>) -> Self {
        Self {
            fail_open: true,
            ..Self::new(store)
        }
    }

    pub fn opened_with(&self) -> Option<OpenOptions> {
        self.opened_with.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Replicator for MemoryReplicator {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn open(&self, _name: &str, opts: OpenOptions) -> agora_store::Result<Arc<dyn DocumentStore>> {
        if let Some(gate) = &self.open_gate {
            gate.notified().await;
        }
        if self.fail_open {
            return Err(agora_store::Error::Timeout(opts.timeout));
        }
        *self.opened_with.lock().unwrap() = Some(opts);
        Ok(Arc::clone(&self.store) as Arc<dyn DocumentStore>)
    }

    async fn close(&self) -> agora_store::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport whose peers succeed unless listed as unreachable. Peers listed
/// as hanging never finish connecting.
#[derive(Default)]
pub struct FakeTransport {
    pub peers: Vec<PeerAddr>,
    pub unreachable: HashSet<String>,
    pub hanging: HashSet<String>,
    pub attempts: AtomicUsize,
}

impl FakeTransport {
    pub fn with_peers(peers: &[&str]) -> Self {
        Self {
            peers: peers.iter().map(|p| PeerAddr::new(*p)).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn bootstrap_peers(&self) -> Result<Vec<PeerAddr>> {
        Ok(self.peers.clone())
    }

    async fn connect(&self, peer: &PeerAddr) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(peer.as_str()) {
            std::future::pending::<()>().await;
        }
        if self.unreachable.contains(peer.as_str()) {
            return Err(Error::Network(format!("{} unreachable", peer)));
        }
        Ok(())
    }
}
