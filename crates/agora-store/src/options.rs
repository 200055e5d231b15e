//! Options for opening and reading stores.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time allowed for opening a store. Bootstrapping a replica on a
/// cold peer set can be slow, so this is generous.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(600);

/// Wildcard entry in a write list: any identity may write.
pub const ANY_WRITER: &str = "*";

/// Write access policy for a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Identity ids allowed to write, or [`ANY_WRITER`].
    pub write: Vec<String>,
}

impl AccessPolicy {
    /// Every peer may write.
    pub fn open() -> Self {
        Self {
            write: vec![ANY_WRITER.to_string()],
        }
    }

    /// Only the listed identities may write.
    pub fn writers(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            write: ids.into_iter().collect(),
        }
    }

    pub fn can_write(&self, identity_id: &str) -> bool {
        self.write.iter().any(|w| w == ANY_WRITER || w == identity_id)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::open()
    }
}

/// Kind of store being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Records indexed by a document field.
    Docstore,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Docstore => "docstore",
        }
    }
}

/// Options for [`Replicator::open`](crate::Replicator::open).
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub access: AccessPolicy,
    pub kind: StoreKind,
    /// Record field the store indexes documents by.
    pub index_by: String,
    pub timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            access: AccessPolicy::open(),
            kind: StoreKind::Docstore,
            index_by: "id".to_string(),
            timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

impl OpenOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }
}

/// How much history [`DocumentStore::load`](crate::DocumentStore::load) replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Every entry in the log.
    All,
    /// Entries with a sequence number at or above the given one.
    Since(u64),
}

/// Options for [`DocumentStore::get`](crate::DocumentStore::get).
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub case_insensitive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_policy_allows_anyone() {
        let policy = AccessPolicy::open();
        assert!(policy.can_write("b3b3/abc"));
        assert!(policy.can_write(""));
    }

    #[test]
    fn restricted_policy() {
        let policy = AccessPolicy::writers(vec!["b3b3/abc".to_string()]);
        assert!(policy.can_write("b3b3/abc"));
        assert!(!policy.can_write("b3b3/def"));
    }

    #[test]
    fn default_open_options() {
        let opts = OpenOptions::default();
        assert_eq!(opts.index_by, "id");
        assert_eq!(opts.kind, StoreKind::Docstore);
        assert_eq!(opts.timeout, DEFAULT_OPEN_TIMEOUT);
        assert_eq!(opts.access, AccessPolicy::open());
    }
}
