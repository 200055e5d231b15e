//! Node-local cache using RocksDB.
//!
//! Holds what belongs to this node only and is never replicated: the signing
//! key behind the node identity and the set of documents marked read.

use crate::error::{Error, Result};
use crate::models::Document;
use ed25519_dalek::SigningKey;
use rocksdb::{Options, DB};
use std::path::Path;

/// Local cache backend.
pub struct LocalCache {
    db: DB,
}

impl LocalCache {
    /// Open or create the cache at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    // --- Read marks ---

    /// Mark a document read.
    pub fn mark_read(&self, id: &str) -> Result<()> {
        let key = format!("read:{}", id);
        self.db.put(key.as_bytes(), b"1")?;
        Ok(())
    }

    /// Clear the read mark of a document.
    pub fn mark_unread(&self, id: &str) -> Result<()> {
        let key = format!("read:{}", id);
        self.db.delete(key.as_bytes())?;
        Ok(())
    }

    /// Check if a document is marked read.
    pub fn is_read(&self, id: &str) -> Result<bool> {
        let key = format!("read:{}", id);
        Ok(self.db.get(key.as_bytes())?.is_some())
    }

    /// Set the `read` flag on documents and all their replies.
    pub fn load_read_marks(&self, documents: &mut [Document]) -> Result<()> {
        let mut pending: Vec<&mut Document> = documents.iter_mut().collect();
        while let Some(doc) = pending.pop() {
            doc.read = self.is_read(&doc.id)?;
            pending.extend(doc.replies.iter_mut());
        }
        Ok(())
    }

    // --- Node Identity ---

    /// Get or create the node's signing key (persistent identity).
    pub fn get_or_create_node_key(&self) -> Result<SigningKey> {
        let key = b"node:signing_key";

        if let Some(data) = self.db.get(key)? {
            let bytes: [u8; 32] = data
                .as_slice()
                .try_into()
                .map_err(|_| Error::Storage("Invalid stored key".into()))?;
            Ok(SigningKey::from_bytes(&bytes))
        } else {
            let mut rng = rand::thread_rng();
            let signing_key = SigningKey::generate(&mut rng);
            self.db.put(key, signing_key.as_bytes())?;
            Ok(signing_key)
        }
    }
}
