//! RocksDB-backed replica.
//!
//! Every write is appended to an entry log (`entry:{seq}`) in RocksDB. The
//! in-memory index maps the index field of each record to the newest log entry
//! carrying it, and is rebuilt by [`DocumentStore::load`].

use crate::error::{Error, Result};
use crate::event::StoreEvent;
use crate::identity::Identity;
use crate::options::{AccessPolicy, GetOptions, OpenOptions, Replay};
use crate::record::{Record, RecordExt};
use crate::store::{DocumentStore, Filter, Replicator};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const ENTRY_PREFIX: &[u8] = b"entry:";

/// Capacity of each store's event bus.
const EVENT_CAPACITY: usize = 1024;

fn entry_key(seq: u64) -> String {
    format!("entry:{:020}", seq)
}

fn parse_entry_key(key: &[u8]) -> Option<u64> {
    let seq = key.strip_prefix(ENTRY_PREFIX)?;
    std::str::from_utf8(seq).ok()?.parse().ok()
}

/// Address of a store: a hash of its manifest followed by its name.
fn store_address(name: &str, opts: &OpenOptions) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(opts.kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(opts.index_by.as_bytes());
    for writer in &opts.access.write {
        hasher.update(b":");
        hasher.update(writer.as_bytes());
    }
    format!("/agora/{}/{}", hex::encode(hasher.finalize().as_bytes()), name)
}

/// Directory name for a store, keeping only filesystem-safe characters.
fn store_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Opens RocksDB-backed stores under a root directory.
pub struct RocksReplicator {
    root: PathBuf,
    identity: Identity,
    closed: AtomicBool,
}

impl RocksReplicator {
    /// Create a replicator writing under the identity of `key`.
    pub fn new(root: impl Into<PathBuf>, key: SigningKey) -> Self {
        Self {
            root: root.into(),
            identity: Identity::from_signing_key(&key),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Replicator for RocksReplicator {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn open(&self, name: &str, opts: OpenOptions) -> Result<Arc<dyn DocumentStore>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let address = store_address(name, &opts);
        let path = self.root.join(store_dir_name(name));
        let identity = self.identity.clone();
        let timeout = opts.timeout;
        info!("Opening {} store {} at {:?}", opts.kind.as_str(), address, path);

        let open = tokio::task::spawn_blocking(move || {
            RocksDocStore::open(&path, address, identity, opts)
        });
        let store = tokio::time::timeout(timeout, open)
            .await
            .map_err(|_| Error::Timeout(timeout))???;

        Ok(Arc::new(store))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Index over the entry log: newest entry per index value.
#[derive(Default)]
struct Index {
    by_id: HashMap<String, u64>,
    entries: BTreeMap<u64, Record>,
}

impl Index {
    fn insert(&mut self, seq: u64, id: String, record: Record) {
        if let Some(&current) = self.by_id.get(&id) {
            if current > seq {
                return;
            }
            self.entries.remove(&current);
        }
        self.by_id.insert(id, seq);
        self.entries.insert(seq, record);
    }
}

/// A document store replica persisted in RocksDB.
pub struct RocksDocStore {
    address: String,
    identity: Identity,
    access: AccessPolicy,
    index_by: String,
    db: RwLock<Option<DB>>,
    index: RwLock<Index>,
    next_seq: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

impl RocksDocStore {
    /// Open or create a store at `path`. Blocking.
    pub fn open(path: &Path, address: String, identity: Identity, opts: OpenOptions) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        let db = DB::open(&db_opts, path)?;

        let next_seq = match db.iterator(IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                parse_entry_key(&key).map(|seq| seq + 1).unwrap_or(0)
            }
            None => 0,
        };
        debug!("Store {} opened with {} log entries", address, next_seq);

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            address,
            identity,
            access: opts.access,
            index_by: opts.index_by,
            db: RwLock::new(Some(db)),
            index: RwLock::new(Index::default()),
            next_seq: AtomicU64::new(next_seq),
            events,
        })
    }

    fn with_db<T>(&self, f: impl FnOnce(&DB) -> Result<T>) -> Result<T> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(db) => f(db),
            None => Err(Error::Closed),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        self.with_db(|_| Ok(()))
    }

    /// Number of records currently indexed.
    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(PoisonError::into_inner).by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for RocksDocStore {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<StoreEvent>> {
        self.ensure_open()?;
        Ok(self.events.subscribe())
    }

    async fn load(&self, replay: Replay) -> Result<()> {
        let from = match replay {
            Replay::All => 0,
            Replay::Since(seq) => seq,
        };
        let start = entry_key(from);

        let (replayed, skipped) = self.with_db(|db| {
            let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
            let mut replayed = 0usize;
            let mut skipped = 0usize;

            for item in db.iterator(IteratorMode::From(start.as_bytes(), Direction::Forward)) {
                let (key, value) = item?;
                let Some(seq) = parse_entry_key(&key) else {
                    break;
                };

                let record: Record = match serde_json::from_slice(&value) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Skipping unreadable log entry {}: {}", seq, e);
                        skipped += 1;
                        continue;
                    }
                };
                let Some(id) = record.str_field(&self.index_by).map(str::to_string) else {
                    warn!("Skipping log entry {} without '{}' field", seq, self.index_by);
                    skipped += 1;
                    continue;
                };

                index.insert(seq, id, record);
                replayed += 1;
            }

            Ok((replayed, skipped))
        })?;

        info!(
            "Store {} replayed {} entries ({} skipped)",
            self.address, replayed, skipped
        );
        let _ = self.events.send(StoreEvent::Ready);
        Ok(())
    }

    async fn put(&self, record: Record) -> Result<String> {
        if !self.access.can_write(self.identity.id()) {
            return Err(Error::AccessDenied(self.identity.id().to_string()));
        }
        let id = record
            .str_field(&self.index_by)
            .map(str::to_string)
            .ok_or_else(|| Error::MissingIndexField(self.index_by.clone()))?;
        let value = serde_json::to_vec(&record)?;

        let seq = self.with_db(|db| {
            let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
            let mut batch = WriteBatch::default();
            batch.put(entry_key(seq).as_bytes(), value);
            db.write(batch)?;
            Ok(seq)
        })?;

        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(seq, id.clone(), record);

        debug!("Store {} wrote {} at entry {}", self.address, id, seq);
        let _ = self.events.send(StoreEvent::Write { id: id.clone() });
        Ok(id)
    }

    async fn get(&self, id: &str, opts: GetOptions) -> Result<Vec<Record>> {
        self.ensure_open()?;
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);

        if !opts.case_insensitive {
            return Ok(index
                .by_id
                .get(id)
                .and_then(|seq| index.entries.get(seq))
                .cloned()
                .into_iter()
                .collect());
        }

        let wanted = id.to_lowercase();
        let mut seqs: Vec<u64> = index
            .by_id
            .iter()
            .filter(|(key, _)| key.to_lowercase() == wanted)
            .map(|(_, seq)| *seq)
            .collect();
        seqs.sort_unstable();
        Ok(seqs
            .into_iter()
            .filter_map(|seq| index.entries.get(&seq).cloned())
            .collect())
    }

    async fn query(&self, filter: Filter<'_>) -> Result<Vec<Record>> {
        self.ensure_open()?;
        let snapshot: Vec<Record> = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect();

        let mut matches = Vec::new();
        for record in snapshot {
            if filter(&record)? {
                matches.push(record);
            }
        }
        Ok(matches)
    }

    async fn close(&self) -> Result<()> {
        let db = self.db.write().unwrap_or_else(PoisonError::into_inner).take();
        if db.is_some() {
            info!("Closing store {}", self.address);
            let _ = self.events.send(StoreEvent::Closed);
        }
        Ok(())
    }
}
