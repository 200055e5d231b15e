//! Store traits consumed by Agora nodes.

use crate::error::Result;
use crate::event::StoreEvent;
use crate::identity::Identity;
use crate::options::{GetOptions, OpenOptions, Replay};
use crate::record::Record;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Predicate applied to each record by [`DocumentStore::query`]. An error
/// aborts the query.
pub type Filter<'a> = &'a (dyn Fn(&Record) -> Result<bool> + Send + Sync);

/// A replicated document store.
///
/// Implementations must be safe for concurrent reads and writes: one handle
/// is shared between every reader and writer of a node.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Public address other replicas use to find this store.
    fn address(&self) -> String;

    /// Subscribe to the store's event bus. Events sent before the call are
    /// not delivered.
    fn subscribe(&self) -> Result<broadcast::Receiver<StoreEvent>>;

    /// Replay history into the store's index, then emit [`StoreEvent::Ready`].
    async fn load(&self, replay: Replay) -> Result<()>;

    /// Write a record, returning the value of its index field.
    async fn put(&self, record: Record) -> Result<String>;

    /// Records whose index field equals `id`.
    async fn get(&self, id: &str, opts: GetOptions) -> Result<Vec<Record>>;

    /// Every indexed record accepted by `filter`, in log order.
    async fn query(&self, filter: Filter<'_>) -> Result<Vec<Record>>;

    /// Release the store. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens stores on behalf of one identity.
#[async_trait]
pub trait Replicator: Send + Sync {
    /// The identity this replicator writes under.
    fn identity(&self) -> &Identity;

    /// Open or create the named store.
    async fn open(&self, name: &str, opts: OpenOptions) -> Result<Arc<dyn DocumentStore>>;

    /// Stop opening stores. Stores already handed out stay usable until closed.
    async fn close(&self) -> Result<()>;
}
