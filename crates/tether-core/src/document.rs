//! The remote document shape.
//!
//! This is the wire representation understood by the remote MVCC document
//! store: an `_id` of the form `[prefix/]type/id`, an optional `_rev` and
//! `_revisions` chain, a `_deleted` tombstone marker, and the application
//! attributes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Underscore attributes that survive translation to the remote shape.
///
/// Every other attribute whose name starts with `_` is local bookkeeping and
/// is stripped before transmission.
pub const RESERVED_ATTRIBUTES: [&str; 5] = ["_id", "_rev", "_deleted", "_revisions", "_attachments"];

/// Revision ancestry as the remote store expects it on a `new_edits=false`
/// write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revisions {
    /// Numeric prefix of the newest revision.
    pub start: u64,
    /// Revision ids, newest first.
    pub ids: Vec<String>,
}

/// A document as stored by the remote database.
///
/// Decoding accepts the legacy `id` and `rev` names, but only when `_id` or
/// `_rev` is absent. Otherwise they stay ordinary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireDocument")]
pub struct RemoteDocument {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(rename = "_revisions", default, skip_serializing_if = "Option::is_none")]
    pub revisions: Option<Revisions>,

    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    /// Application attributes plus `_attachments`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Decoding shape of [`RemoteDocument`], before the legacy names are
/// resolved.
#[derive(Deserialize)]
struct WireDocument {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_rev", default)]
    rev: Option<String>,
    #[serde(rename = "_revisions", default)]
    revisions: Option<Revisions>,
    #[serde(rename = "_deleted", default)]
    deleted: bool,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TryFrom<WireDocument> for RemoteDocument {
    type Error = String;

    fn try_from(mut wire: WireDocument) -> Result<Self, Self::Error> {
        let id = match wire.id {
            Some(id) => id,
            None => match wire.fields.remove("id") {
                Some(Value::String(id)) => id,
                Some(_) => return Err("`id` is not a string".into()),
                None => return Err("missing field `_id`".into()),
            },
        };
        let rev = match wire.rev {
            Some(rev) => Some(rev),
            None => take_string(&mut wire.fields, "rev"),
        };

        Ok(Self {
            id,
            rev,
            revisions: wire.revisions,
            deleted: wire.deleted,
            fields: wire.fields,
        })
    }
}

/// Remove `name` from `fields` if it holds a string.
fn take_string(fields: &mut Map<String, Value>, name: &str) -> Option<String> {
    if !matches!(fields.get(name), Some(Value::String(_))) {
        return None;
    }
    match fields.remove(name) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

impl RemoteDocument {
    /// Create a bare document with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            revisions: None,
            deleted: false,
            fields: Map::new(),
        }
    }

    /// Set a field, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set the revision, builder style.
    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    /// Mark as a tombstone, builder style.
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Whether this is a design document, which never maps to a record.
    pub fn is_design(&self) -> bool {
        self.id.starts_with("_design/")
    }
}

/// Whether an attribute name is kept on the wire.
pub(crate) fn is_transmitted(name: &str) -> bool {
    !name.starts_with('_') || RESERVED_ATTRIBUTES.contains(&name)
}
