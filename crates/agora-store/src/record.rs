//! Loosely typed store records.

use serde_json::{Map, Value};

/// A record as held by the store: a mapping of field name to JSON value.
pub type Record = Map<String, Value>;

/// Field accessors for [`Record`].
pub trait RecordExt {
    /// String value of a field, if present and a string.
    fn str_field(&self, field: &str) -> Option<&str>;
}

impl RecordExt for Record {
    fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn str_field_only_matches_strings() {
        let record = json!({ "id": "abc", "date": 12 });
        let record = record.as_object().unwrap();
        assert_eq!(record.str_field("id"), Some("abc"));
        assert_eq!(record.str_field("date"), None);
        assert_eq!(record.str_field("missing"), None);
    }
}
