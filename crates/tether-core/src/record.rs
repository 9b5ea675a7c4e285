//! The local record shape.
//!
//! A record is identified by `type` + `id` and carries arbitrary
//! application attributes. The sync engine only reads records and annotates
//! them with the remote revision (`_rev`); the local store owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record as the local store sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record type. `None` only for records decoded from an id without a `/`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,

    /// Id, unique within the type.
    #[serde(default)]
    pub id: String,

    /// Remote revision, `"<seq>-<revId>"`.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Everything else, including local underscore attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Record {
    /// Create an empty record of the given type.
    pub fn new(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            record_type: Some(record_type.into()),
            id: id.into(),
            rev: None,
            created_at: None,
            updated_at: None,
            attributes: Map::new(),
        }
    }

    /// Set an attribute, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the remote revision, builder style.
    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    /// Get an attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Set an attribute, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Whether the record is a tombstone (`_deleted: true`).
    pub fn is_deleted(&self) -> bool {
        matches!(self.attributes.get("_deleted"), Some(Value::Bool(true)))
    }

    /// Mark the record as a tombstone.
    pub fn mark_deleted(&mut self) {
        self.attributes.insert("_deleted".into(), Value::Bool(true));
    }

    /// `type/id`, or just the id when the type is unknown.
    pub fn key(&self) -> String {
        match &self.record_type {
            Some(t) => format!("{}/{}", t, self.id),
            None => self.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_json_shape() {
        let record = Record::new("task", "42").with("title", "x").with_rev("1-abc");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            json!({"type": "task", "id": "42", "_rev": "1-abc", "title": "x"})
        );

        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_tombstone() {
        let mut record = Record::new("task", "1");
        assert!(!record.is_deleted());
        record.mark_deleted();
        assert!(record.is_deleted());
    }

    #[test]
    fn test_record_key() {
        assert_eq!(Record::new("task", "42").key(), "task/42");

        let mut untyped = Record::new("task", "42");
        untyped.record_type = None;
        assert_eq!(untyped.key(), "42");
    }
}
