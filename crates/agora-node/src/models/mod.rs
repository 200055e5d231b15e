//! Document model for Agora.
//!
//! - [`Document`] - an article, optionally replying to another one
//! - [`DecodeError`] - why a store record is not a valid document

mod document;

pub use document::{
    DecodeError, Document, BODY_MAX_CHARS, BODY_MIN_CHARS, DOCUMENT_KIND, FIELD_BODY, FIELD_DATE,
    FIELD_ID, FIELD_IN_REPLY_TO, FIELD_KIND,
};
