//! Thread reconstruction.
//!
//! The replica holds a flat, unordered set of documents. A reply may have
//! replicated before its parent, or its parent may never arrive, so the view
//! is rebuilt from whatever snapshot the store returns on every read:
//!
//! 1. keep records tagged as documents and decode them, skipping bad ones
//! 2. stable-sort by `created_at`, newest first (the flat list)
//! 3. in that order, attach each reply to its parent; replies whose parent is
//!    not in the snapshot become roots
//! 4. stable-sort roots by effective recency, newest first (the forest)
//!
//! `latest_reply_at` is the newest `created_at` among all descendants of a
//! document. Parent links are not checked for cycles: documents on a cycle
//! attach to each other and, having no root above them, only show up in the
//! flat list. Nesting in the forest is capped at [`MAX_REPLY_DEPTH`].

use crate::error::Result;
use crate::models::Document;
use agora_store::{DocumentStore, Record};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Deepest level a reply is nested at in the forest, roots being level 0.
/// Replies further down are attached to their ancestor one level above the
/// cap, so every thread stays at most this deep.
pub const MAX_REPLY_DEPTH: usize = 32;

/// Flat list and thread forest built from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreadView {
    /// Every document, newest first. Replies are not nested here.
    pub documents: Vec<Document>,
    /// Thread roots with their replies attached, most recently active first.
    pub roots: Vec<Document>,
}

/// Query the store and build the thread view of everything it holds.
pub async fn list_threaded(store: &dyn DocumentStore) -> Result<ThreadView> {
    let records = store
        .query(&|record: &Record| Ok(Document::is_document_record(record)))
        .await?;
    Ok(build_threads(decode_documents(records)))
}

/// Decode document records in scan order. Records of other kinds are
/// ignored and undecodable ones are logged and dropped.
pub fn decode_documents(records: impl IntoIterator<Item = Record>) -> Vec<Document> {
    let mut documents = Vec::new();
    for record in records {
        if !Document::is_document_record(&record) {
            continue;
        }
        match Document::from_record(&record) {
            Ok(doc) => documents.push(doc),
            Err(e) => warn!(
                id = record.get("id").and_then(|v| v.as_str()).unwrap_or("?"),
                error = %e,
                "skipping undecodable document record"
            ),
        }
    }
    documents
}

/// Build the flat list and the thread forest from decoded documents.
pub fn build_threads(mut documents: Vec<Document>) -> ThreadView {
    for doc in &mut documents {
        doc.replies.clear();
        doc.latest_reply_at = 0;
    }
    documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let n = documents.len();
    let mut index: HashMap<String, usize> = HashMap::with_capacity(n);
    for (pos, doc) in documents.iter().enumerate() {
        index.entry(doc.id.clone()).or_insert(pos);
    }

    let mut parent_of: Vec<Option<usize>> = vec![None; n];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots: Vec<usize> = Vec::new();
    for (pos, doc) in documents.iter().enumerate() {
        match doc.parent_id().and_then(|parent| index.get(parent)) {
            Some(&parent) => {
                parent_of[pos] = Some(parent);
                children[parent].push(pos);
            }
            None => roots.push(pos),
        }
    }

    // Peel documents off leaf first so each one hands its newest activity to
    // its parent exactly once. Whatever is left lies on a parent cycle.
    let mut latest = vec![0i64; n];
    let mut pending: Vec<usize> = children.iter().map(Vec::len).collect();
    let mut leaves: Vec<usize> = (0..n).filter(|&pos| pending[pos] == 0).collect();
    while let Some(pos) = leaves.pop() {
        if let Some(parent) = parent_of[pos] {
            latest[parent] = latest[parent].max(latest[pos].max(documents[pos].created_at));
            pending[parent] -= 1;
            if pending[parent] == 0 {
                leaves.push(parent);
            }
        }
    }

    // Members of a cycle are all descendants of one another.
    let mut settled = vec![false; n];
    for start in 0..n {
        if pending[start] == 0 || settled[start] {
            continue;
        }
        let mut members = vec![start];
        let mut current = parent_of[start];
        while let Some(pos) = current {
            if pos == start {
                break;
            }
            members.push(pos);
            current = parent_of[pos];
        }
        let newest = members
            .iter()
            .map(|&pos| latest[pos].max(documents[pos].created_at))
            .max()
            .unwrap_or(0);
        for pos in members {
            latest[pos] = newest;
            settled[pos] = true;
        }
    }

    for (doc, latest_reply_at) in documents.iter_mut().zip(latest) {
        doc.latest_reply_at = latest_reply_at;
    }

    roots.sort_by(|&a, &b| {
        documents[b]
            .effective_recency()
            .cmp(&documents[a].effective_recency())
    });

    // A node reachable from a root has a parent chain ending at that root, so
    // this walk never meets a cycle. Below MAX_REPLY_DEPTH a reply hangs off
    // its ancestor one level above the cap instead of its own parent.
    let mut order = Vec::with_capacity(n);
    let mut depth = vec![0usize; n];
    let mut anchor: Vec<usize> = (0..n).collect();
    let mut reachable = vec![false; n];
    let mut stack: Vec<usize> = roots.clone();
    while let Some(pos) = stack.pop() {
        order.push(pos);
        reachable[pos] = true;
        for &child in &children[pos] {
            depth[child] = depth[pos] + 1;
            if depth[child] >= MAX_REPLY_DEPTH {
                anchor[child] = anchor[pos];
            }
            stack.push(child);
        }
    }

    // Filled in flat order, so flattened replies sit among their new siblings
    // newest first.
    let mut attached: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (pos, parent) in parent_of.iter().enumerate() {
        if let (true, Some(parent)) = (reachable[pos], parent) {
            attached[anchor[*parent]].push(pos);
        }
    }

    // Every attachment target precedes its replies in `order`.
    let mut built: Vec<Option<Document>> = documents.iter().cloned().map(Some).collect();
    for &pos in order.iter().rev() {
        let replies: Vec<Document> = attached[pos]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        if let Some(doc) = built[pos].as_mut() {
            doc.replies = replies;
        }
    }
    let roots: Vec<Document> = roots.iter().filter_map(|&pos| built[pos].take()).collect();

    debug!(
        documents = documents.len(),
        threads = roots.len(),
        "built thread view"
    );
    ThreadView { documents, roots }
}
