//! Proptest generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Map, Value};

use tether_core::{Record, RemoteDocument, RevisionId};

/// Attribute names the translator handles itself, plus `rev`, which decoding
/// reads as the revision when `_rev` is absent.
const MANAGED: &[&str] = &["id", "rev", "type", "createdAt", "updatedAt"];

/// Generate a record type.
pub fn record_type() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}".prop_map(String::from)
}

/// Generate a record id. May contain further `/` separators.
pub fn record_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9._/-]{0,23}".prop_map(String::from)
}

/// Generate an optional id prefix.
pub fn prefix() -> impl Strategy<Value = Option<String>> {
    prop::option::of("\\$?[a-z]{1,10}".prop_map(String::from))
}

/// Generate a random RevisionId.
pub fn revision_id() -> impl Strategy<Value = RevisionId> {
    any::<[u8; 8]>().prop_map(RevisionId::from_bytes)
}

/// Generate a `<n>-<hex>` revision.
pub fn rev() -> impl Strategy<Value = String> {
    (1u64..1_000_000, "[0-9a-f]{1,32}").prop_map(|(n, id)| format!("{}-{}", n, id))
}

/// Generate a millisecond-precision timestamp.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800_000).prop_filter_map("out of range", |ms| {
        Utc.timestamp_millis_opt(ms).single()
    })
}

/// Generate an application attribute name (never underscore-prefixed).
pub fn attribute_name() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9]{0,11}"
        .prop_map(String::from)
        .prop_filter("managed attribute", |name| !MANAGED.contains(&name.as_str()))
}

/// Generate a JSON leaf value.
pub fn attribute_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::from),
    ]
}

/// Generate application attributes.
pub fn attributes() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(attribute_name(), attribute_value(), 0..6)
        .prop_map(|attrs| attrs.into_iter().collect())
}

/// Generate a live record with a type.
pub fn record() -> impl Strategy<Value = Record> {
    (
        record_type(),
        record_id(),
        prop::option::of(rev()),
        prop::option::of(timestamp()),
        prop::option::of(timestamp()),
        attributes(),
    )
        .prop_map(|(record_type, id, rev, created_at, updated_at, attributes)| Record {
            record_type: Some(record_type),
            id,
            rev,
            created_at,
            updated_at,
            attributes,
        })
}

/// Generate a remote document at an existing revision.
pub fn revised_document() -> impl Strategy<Value = RemoteDocument> {
    (record_type(), record_id(), rev())
        .prop_map(|(t, id, rev)| RemoteDocument::new(format!("{}/{}", t, id)).with_rev(rev))
}

/// One step in a document's life as seen on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStep {
    Write(u8),
    Delete(u8),
}

/// Generate a change feed history over a handful of documents.
pub fn feed_history() -> impl Strategy<Value = Vec<FeedStep>> {
    prop::collection::vec(
        prop_oneof![
            3 => (0u8..4).prop_map(FeedStep::Write),
            1 => (0u8..4).prop_map(FeedStep::Delete),
        ],
        0..40,
    )
}
