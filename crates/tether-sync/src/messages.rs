//! Wire messages and request paths for the remote document store.
//!
//! ```text
//! GET  /_changes?include_docs=true&since=<n>[&heartbeat=10000&feed=longpoll]
//! POST /_bulk_docs                  {docs: [...], new_edits: false}
//! GET  /_all_docs?include_docs=true[&startkey="<k>/"&endkey="<k>0"]
//! GET  /<prefix>/<type>/<id>
//! PUT  /<prefix>/<type>/<id>
//! ```
//!
//! All paths are relative to `/<name>` when the engine has a name.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tether_core::RemoteDocument;

use crate::config::HEARTBEAT_MS;

/// Position in the remote change feed.
///
/// Older servers hand out integers, newer ones opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SinceCursor {
    Seq(u64),
    Token(String),
}

impl Default for SinceCursor {
    fn default() -> Self {
        SinceCursor::Seq(0)
    }
}

impl fmt::Display for SinceCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinceCursor::Seq(seq) => write!(f, "{}", seq),
            SinceCursor::Token(token) => f.write_str(token),
        }
    }
}

impl From<u64> for SinceCursor {
    fn from(seq: u64) -> Self {
        SinceCursor::Seq(seq)
    }
}

/// Response of `GET /_changes`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangesResponse {
    pub last_seq: SinceCursor,
    #[serde(default)]
    pub results: Vec<ChangeRow>,
}

/// One row of the change feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub seq: Option<Value>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<RemoteDocument>,
}

impl ChangeRow {
    /// The document this row describes.
    ///
    /// Rows without an included document only carry enough to describe a
    /// deletion; anything else is unusable.
    pub fn into_document(self) -> Option<RemoteDocument> {
        match (self.doc, self.id) {
            (Some(doc), _) => Some(doc),
            (None, Some(id)) if self.deleted => Some(RemoteDocument::new(id).deleted()),
            _ => None,
        }
    }
}

/// Body of `POST /_bulk_docs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDocsRequest {
    pub docs: Vec<RemoteDocument>,
    /// `false` tells the remote to keep the client supplied revisions.
    pub new_edits: bool,
}

/// Response of `GET /_all_docs`.
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsResponse {
    #[serde(default)]
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<RemoteDocument>,
}

/// Response of `PUT /<doc>`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
}

/// Builds request paths relative to the optional database name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemotePaths {
    base: String,
}

impl RemotePaths {
    /// Paths for a store with the given name (or the server root).
    pub fn new(name: Option<&str>) -> Self {
        let base = match name {
            Some(name) if !name.is_empty() => format!("/{}", encode_component(name)),
            _ => String::new(),
        };
        Self { base }
    }

    /// Change feed request. Long-poll parameters are added when pulling
    /// continuously.
    pub fn changes(&self, since: &SinceCursor, continuous: bool) -> String {
        let mut path = format!(
            "{}/_changes?include_docs=true&since={}",
            self.base,
            encode_component(&since.to_string())
        );
        if continuous {
            path.push_str(&format!("&heartbeat={}&feed=longpoll", HEARTBEAT_MS));
        }
        path
    }

    pub fn bulk_docs(&self) -> String {
        format!("{}/_bulk_docs", self.base)
    }

    /// Listing, optionally restricted to a `(startkey, endkey)` range.
    pub fn all_docs(&self, range: Option<&(String, String)>) -> String {
        let mut path = format!("{}/_all_docs?include_docs=true", self.base);
        if let Some((start, end)) = range {
            path.push_str(&format!(
                "&startkey={}&endkey={}",
                encode_component(&json_string(start)),
                encode_component(&json_string(end))
            ));
        }
        path
    }

    /// Single document path; every segment of the id is encoded on its own.
    pub fn document(&self, doc_id: &str) -> String {
        let segments: Vec<String> = doc_id.split('/').map(encode_component).collect();
        format!("{}/{}", self.base, segments.join("/"))
    }
}

fn json_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Percent-encode everything outside the URI component unreserved set
/// (`A-Z a-z 0-9 - _ . ! ~ * ' ( )`).
pub fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
