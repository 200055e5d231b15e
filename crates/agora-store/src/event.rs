//! Store event bus messages.

/// Event emitted by a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The store finished replaying its history and accepts queries.
    Ready,
    /// A record was written through this replica.
    Write { id: String },
    /// The store was closed; no further events follow.
    Closed,
}

impl StoreEvent {
    pub fn is_ready(&self) -> bool {
        matches!(self, StoreEvent::Ready)
    }
}
