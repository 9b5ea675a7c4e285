//! Translation between local records and remote documents.
//!
//! Both directions are pure functions of the input and the configured id
//! prefix. `from_remote(to_remote(r))` reproduces the type, id and every
//! non-underscore attribute of `r`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::document::{is_transmitted, RemoteDocument, Revisions};
use crate::error::{CoreError, Result};
use crate::record::Record;

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

/// Converts records to and from the remote document shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTranslator {
    prefix: Option<String>,
}

impl DocumentTranslator {
    /// Create a translator. An empty prefix is treated as no prefix.
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    /// The configured id prefix.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Build the remote id for `type/id`.
    pub fn document_id(&self, record_type: &str, id: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}/{}", prefix, record_type, id),
            None => format!("{}/{}", record_type, id),
        }
    }

    /// Key range selecting every document of a type (or, without a type,
    /// every document under the prefix).
    ///
    /// Returns `(startkey, endkey)`; `'0'` sorts right after `'/'`, so the
    /// range covers exactly the ids starting with `<base>/`.
    pub fn key_range(&self, record_type: Option<&str>) -> Option<(String, String)> {
        let base = match (&self.prefix, record_type) {
            (Some(prefix), Some(t)) => format!("{}/{}", prefix, t),
            (None, Some(t)) => t.to_string(),
            (Some(prefix), None) => prefix.clone(),
            (None, None) => return None,
        };
        Some((format!("{}/", base), format!("{}0", base)))
    }

    /// Translate a local record into a remote document.
    ///
    /// Copies attributes, drops every underscore attribute outside the
    /// reserved set, and namespaces the id.
    pub fn to_remote(&self, record: &Record) -> Result<RemoteDocument> {
        let record_type = record
            .record_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(CoreError::MissingType)?;
        if record.id.is_empty() {
            return Err(CoreError::MissingId);
        }

        let mut doc = RemoteDocument::new(self.document_id(record_type, &record.id));
        doc.rev = record.rev.clone();
        doc.fields.insert("type".into(), Value::String(record_type.to_string()));

        for (name, value) in &record.attributes {
            if !is_transmitted(name) {
                continue;
            }
            match name.as_str() {
                "_id" | "_rev" | "id" | "type" => {}
                "_deleted" => doc.deleted = value.as_bool().unwrap_or(false),
                "_revisions" => {
                    let revisions: Revisions = serde_json::from_value(value.clone())
                        .map_err(|e| CoreError::InvalidDocument(format!("_revisions: {}", e)))?;
                    doc.revisions = Some(revisions);
                }
                _ => {
                    doc.fields.insert(name.clone(), value.clone());
                }
            }
        }

        if let Some(at) = record.created_at {
            doc.fields.insert(CREATED_AT.into(), timestamp(at));
        }
        if let Some(at) = record.updated_at {
            doc.fields.insert(UPDATED_AT.into(), timestamp(at));
        }

        Ok(doc)
    }

    /// Translate a remote document into a local record.
    ///
    /// An id without a `/` (after the prefix is stripped) yields a record with
    /// no type and the whole remainder as its id.
    pub fn from_remote(&self, doc: &RemoteDocument) -> Record {
        let (record_type, id) = self.split_id(&doc.id);

        let mut attributes: Map<String, Value> = doc.fields.clone();
        attributes.remove("type");
        attributes.remove("id");

        let created_at = take_timestamp(&mut attributes, CREATED_AT);
        let updated_at = take_timestamp(&mut attributes, UPDATED_AT);

        if doc.deleted {
            attributes.insert("_deleted".into(), Value::Bool(true));
        }

        Record {
            record_type,
            id,
            rev: doc.rev.clone(),
            created_at,
            updated_at,
            attributes,
        }
    }

    /// Split a remote id into `(type, id)`, stripping the prefix.
    pub fn split_id(&self, doc_id: &str) -> (Option<String>, String) {
        let rest = match &self.prefix {
            Some(prefix) => doc_id
                .strip_prefix(prefix.as_str())
                .and_then(|r| r.strip_prefix('/'))
                .unwrap_or(doc_id),
            None => doc_id,
        };

        match rest.split_once('/') {
            Some((record_type, id)) => (Some(record_type.to_string()), id.to_string()),
            None => (None, rest.to_string()),
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Remove and parse a timestamp attribute. Values that are not valid RFC 3339
/// strings are left in place as plain attributes.
fn take_timestamp(attributes: &mut Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    let parsed = attributes
        .get(name)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;
    attributes.remove(name);
    Some(parsed)
}
