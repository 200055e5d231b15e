//! Agora Store - replicated document store
//!
//! A document store keyed by a configurable index field (`id` by default),
//! backed by an append-only entry log in RocksDB. Each replica rebuilds its
//! in-memory index by replaying the log and announces readiness on an event
//! bus once the replay completes.
//!
//! # Architecture
//!
//! - **Replicator**: owns the node identity and opens named stores
//! - **DocumentStore**: put/get/query over loosely typed records
//! - **Events**: readiness and write notifications over a broadcast channel
//! - **Access**: write policy checked against the replicator's identity
//!
//! # Example
//!
//! ```no_run
//! use agora_store::{OpenOptions, Replay, Replicator, RocksReplicator};
//! use ed25519_dalek::SigningKey;
//!
//! # async fn example(key: SigningKey) -> agora_store::Result<()> {
//! let replicator = RocksReplicator::new("./agora-data/store", key);
//! let store = replicator.open("articles", OpenOptions::default()).await?;
//!
//! let mut events = store.subscribe()?;
//! store.load(Replay::All).await?;
//! println!("{:?}", events.recv().await);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod identity;
pub mod options;
pub mod record;
pub mod rocks;
pub mod store;

pub use error::{Error, Result};
pub use event::StoreEvent;
pub use identity::{compute_identity_id, Identity};
pub use options::{
    AccessPolicy, GetOptions, OpenOptions, Replay, StoreKind, ANY_WRITER, DEFAULT_OPEN_TIMEOUT,
};
pub use record::{Record, RecordExt};
pub use rocks::{RocksDocStore, RocksReplicator};
pub use store::{DocumentStore, Filter, Replicator};
