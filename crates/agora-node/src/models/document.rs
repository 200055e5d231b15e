//! Document model - one article in the replicated collection.
//!
//! Documents are stored as loosely typed records. [`Document::to_record`]
//! and [`Document::from_record`] convert between the two forms; the serde
//! derive is the JSON shape served to clients, including the derived thread
//! fields.

use crate::error::{Error, Result};
use agora_store::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Value of the kind tag on document records.
pub const DOCUMENT_KIND: &str = "data";

/// Record field names.
pub const FIELD_ID: &str = "id";
pub const FIELD_IN_REPLY_TO: &str = "in-reply-to-id";
pub const FIELD_DATE: &str = "date";
pub const FIELD_BODY: &str = "body";
pub const FIELD_KIND: &str = "type";

/// Body length bounds, in characters.
pub const BODY_MIN_CHARS: usize = 3;
pub const BODY_MAX_CHARS: usize = 524_288;

/// Why a record could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// An article, optionally replying to another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Hyphenated UUID, assigned at creation
    pub id: String,

    /// Parent document, `None` for a thread root
    #[serde(default)]
    pub in_reply_to_id: Option<String>,

    /// Creation time in milliseconds since the Unix epoch
    pub created_at: i64,

    /// Text payload
    pub body: String,

    /// Replies attached while building threads. Never stored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Document>,

    /// Newest `created_at` among all descendants, 0 without replies. Never stored.
    #[serde(default)]
    pub latest_reply_at: i64,

    /// Marked read on this node. Never stored in the replica.
    #[serde(default)]
    pub read: bool,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Hyphenated 8-4-4-4-12 UUID, any case.
fn is_hyphenated_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::try_parse(s).is_ok()
}

impl Document {
    /// Create a root document with a fresh id and the current time.
    pub fn new(body: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            in_reply_to_id: None,
            created_at: now_millis(),
            body,
            replies: Vec::new(),
            latest_reply_at: 0,
            read: false,
        }
    }

    /// Builder: reply to another document.
    pub fn in_reply_to(mut self, parent_id: String) -> Self {
        self.in_reply_to_id = Some(parent_id).filter(|id| !id.is_empty());
        self
    }

    /// Parent id, if this is a reply.
    pub fn parent_id(&self) -> Option<&str> {
        self.in_reply_to_id.as_deref()
    }

    /// Timestamp threads are ordered by: the latest reply if any, else creation.
    pub fn effective_recency(&self) -> i64 {
        if self.latest_reply_at > 0 {
            self.latest_reply_at
        } else {
            self.created_at
        }
    }

    /// Check the fields a document must carry before it is written.
    pub fn validate(&self) -> Result<()> {
        if !is_hyphenated_uuid(&self.id) {
            return Err(Error::Validation(format!("id '{}' is not a UUID", self.id)));
        }
        if let Some(parent) = self.parent_id() {
            if !is_hyphenated_uuid(parent) {
                return Err(Error::Validation(format!(
                    "in-reply-to id '{}' is not a UUID",
                    parent
                )));
            }
        }
        if self.created_at <= 0 {
            return Err(Error::Validation("date is required".to_string()));
        }
        let chars = self.body.chars().count();
        if chars < BODY_MIN_CHARS || chars > BODY_MAX_CHARS {
            return Err(Error::Validation(format!(
                "body must be {} to {} characters, got {}",
                BODY_MIN_CHARS, BODY_MAX_CHARS, chars
            )));
        }
        Ok(())
    }

    /// Store form of this document, tagged with [`DOCUMENT_KIND`].
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert(FIELD_ID.to_string(), Value::from(self.id.as_str()));
        record.insert(
            FIELD_IN_REPLY_TO.to_string(),
            Value::from(self.parent_id().unwrap_or_default()),
        );
        record.insert(FIELD_DATE.to_string(), Value::from(self.created_at));
        record.insert(FIELD_BODY.to_string(), Value::from(self.body.as_str()));
        record.insert(FIELD_KIND.to_string(), Value::from(DOCUMENT_KIND));
        record
    }

    /// Whether a record carries the document kind tag.
    pub fn is_document_record(record: &Record) -> bool {
        record.get(FIELD_KIND).and_then(Value::as_str) == Some(DOCUMENT_KIND)
    }

    /// Decode a store record. The kind tag is not checked here.
    ///
    /// `in-reply-to-id` is read explicitly: absent, null and empty all mean
    /// the document is a root.
    pub fn from_record(record: &Record) -> std::result::Result<Self, DecodeError> {
        let id = string_field(record, FIELD_ID)?.ok_or(DecodeError::MissingField(FIELD_ID))?;
        let body =
            string_field(record, FIELD_BODY)?.ok_or(DecodeError::MissingField(FIELD_BODY))?;
        let in_reply_to_id = string_field(record, FIELD_IN_REPLY_TO)?.filter(|p| !p.is_empty());
        let created_at = match record.get(FIELD_DATE) {
            None | Some(Value::Null) => return Err(DecodeError::MissingField(FIELD_DATE)),
            Some(value) => timestamp(value).ok_or(DecodeError::WrongType {
                field: FIELD_DATE,
                expected: "integer",
            })?,
        };

        Ok(Self {
            id,
            in_reply_to_id,
            created_at,
            body,
            replies: Vec::new(),
            latest_reply_at: 0,
            read: false,
        })
    }
}

fn string_field(
    record: &Record,
    field: &'static str,
) -> std::result::Result<Option<String>, DecodeError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "string",
        }),
    }
}

/// Integer timestamps may come back from JSON stores as whole floats.
fn timestamp(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn new_document() {
        let doc = Document::new("hello world".to_string());
        assert!(is_hyphenated_uuid(&doc.id));
        assert!(doc.created_at > 0);
        assert_eq!(doc.parent_id(), None);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn empty_parent_means_root() {
        let doc = Document::new("reply".to_string()).in_reply_to(String::new());
        assert_eq!(doc.parent_id(), None);
    }

    #[test]
    fn record_form() {
        let parent = Document::new("parent".to_string());
        let doc = Document::new("child".to_string()).in_reply_to(parent.id.clone());
        let rec = doc.to_record();

        assert_eq!(rec[FIELD_KIND], json!("data"));
        assert_eq!(rec[FIELD_IN_REPLY_TO], json!(parent.id));
        assert!(Document::is_document_record(&rec));
        assert_eq!(Document::from_record(&rec).unwrap(), doc);
    }

    #[test]
    fn root_record_stores_empty_parent() {
        let rec = Document::new("root".to_string()).to_record();
        assert_eq!(rec[FIELD_IN_REPLY_TO], json!(""));
        assert_eq!(Document::from_record(&rec).unwrap().in_reply_to_id, None);
    }

    #[test]
    fn decode_tolerates_missing_or_null_parent() {
        let doc = Document::from_record(&record(json!({
            "id": "a", "date": 5, "body": "abc"
        })))
        .unwrap();
        assert_eq!(doc.in_reply_to_id, None);

        let doc = Document::from_record(&record(json!({
            "id": "a", "date": 5, "body": "abc", "in-reply-to-id": null
        })))
        .unwrap();
        assert_eq!(doc.in_reply_to_id, None);
    }

    #[test]
    fn decode_accepts_whole_float_dates() {
        let doc = Document::from_record(&record(json!({
            "id": "a", "date": 1700000000000.0, "body": "abc"
        })))
        .unwrap();
        assert_eq!(doc.created_at, 1_700_000_000_000);
    }

    #[test]
    fn decode_failures() {
        assert_eq!(
            Document::from_record(&record(json!({ "date": 5, "body": "abc" }))),
            Err(DecodeError::MissingField(FIELD_ID))
        );
        assert_eq!(
            Document::from_record(&record(json!({ "id": "a", "body": "abc" }))),
            Err(DecodeError::MissingField(FIELD_DATE))
        );
        assert_eq!(
            Document::from_record(&record(json!({ "id": "a", "date": "soon", "body": "abc" }))),
            Err(DecodeError::WrongType {
                field: FIELD_DATE,
                expected: "integer"
            })
        );
        assert_eq!(
            Document::from_record(&record(json!({ "id": 7, "date": 5, "body": "abc" }))),
            Err(DecodeError::WrongType {
                field: FIELD_ID,
                expected: "string"
            })
        );
    }

    #[test]
    fn validation_rules() {
        let valid = Document::new("abc".to_string());
        assert!(valid.validate().is_ok());

        let mut doc = valid.clone();
        doc.body = String::new();
        assert!(matches!(doc.validate(), Err(Error::Validation(_))));

        let mut doc = valid.clone();
        doc.body = "ab".to_string();
        assert!(doc.validate().is_err());

        let mut doc = valid.clone();
        doc.body = "x".repeat(BODY_MAX_CHARS + 1);
        assert!(doc.validate().is_err());

        let mut doc = valid.clone();
        doc.id = "not-a-uuid".to_string();
        assert!(doc.validate().is_err());

        let mut doc = valid.clone();
        doc.id = doc.id.replace('-', "");
        assert!(doc.validate().is_err());

        let mut doc = valid.clone();
        doc.created_at = 0;
        assert!(doc.validate().is_err());

        let doc = valid.clone().in_reply_to("parent".to_string());
        assert!(doc.validate().is_err());
    }

    #[test]
    fn body_length_counts_characters() {
        let mut doc = Document::new(String::new());
        doc.body = "äöü".to_string();
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn effective_recency() {
        let mut doc = Document::new("abc".to_string());
        doc.created_at = 100;
        assert_eq!(doc.effective_recency(), 100);
        doc.latest_reply_at = 250;
        assert_eq!(doc.effective_recency(), 250);
    }

    #[test]
    fn view_serialization_includes_thread_fields() {
        let mut doc = Document::new("abc".to_string());
        doc.latest_reply_at = 9;
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["latest_reply_at"], json!(9));
        assert_eq!(json["read"], json!(false));
        assert!(json.get("replies").is_none());
    }
}
