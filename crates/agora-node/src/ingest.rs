//! Writing and fetching single documents.

use crate::error::{Error, Result};
use crate::models::Document;
use agora_store::{DocumentStore, GetOptions};
use tracing::debug;

/// Validate a document and write it to the store.
///
/// Nothing is written when validation fails. Store errors are returned as
/// they come.
pub async fn submit(store: &dyn DocumentStore, document: &Document) -> Result<()> {
    document.validate()?;
    let id = store.put(document.to_record()).await?;
    debug!("Submitted document {}", id);
    Ok(())
}

/// Fetch one document by id (case-sensitive).
pub async fn get_by_id(store: &dyn DocumentStore, id: &str) -> Result<Document> {
    let records = store
        .get(
            id,
            GetOptions {
                case_insensitive: false,
            },
        )
        .await?;
    let record = records
        .first()
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    Ok(Document::from_record(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use crate::models::DOCUMENT_KIND;
    use serde_json::json;

    #[tokio::test]
    async fn submit_writes_tagged_record() {
        let store = MemoryStore::new();
        let doc = Document::new("hello there".to_string());

        submit(&store, &doc).await.unwrap();

        assert_eq!(store.put_count(), 1);
        let records = store.records();
        assert_eq!(records[0]["type"], json!(DOCUMENT_KIND));
        assert_eq!(records[0]["id"], json!(doc.id));
    }

    #[tokio::test]
    async fn empty_body_is_rejected_before_writing() {
        let store = MemoryStore::new();
        let mut doc = Document::new(String::new());
        doc.body.clear();

        let err = submit(&store, &doc).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn store_errors_pass_through() {
        let store = MemoryStore::new();
        store.close().await.unwrap();

        let err = submit(&store, &Document::new("hello".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(agora_store::Error::Closed)));
    }

    #[tokio::test]
    async fn get_by_id_roundtrip() {
        let store = MemoryStore::new();
        let parent = Document::new("parent".to_string());
        let reply = Document::new("reply".to_string()).in_reply_to(parent.id.clone());
        submit(&store, &parent).await.unwrap();
        submit(&store, &reply).await.unwrap();

        let loaded = get_by_id(&store, &reply.id).await.unwrap();
        assert_eq!(loaded, reply);
    }

    #[tokio::test]
    async fn get_by_id_is_case_sensitive() {
        let store = MemoryStore::new();
        let doc = Document::new("hello".to_string());
        submit(&store, &doc).await.unwrap();

        let err = get_by_id(&store, &doc.id.to_uppercase()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn get_by_id_reports_undecodable_records() {
        let store = MemoryStore::new();
        store
            .put(json!({ "id": "x", "type": "data" }).as_object().cloned().unwrap())
            .await
            .unwrap();

        let err = get_by_id(&store, "x").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
