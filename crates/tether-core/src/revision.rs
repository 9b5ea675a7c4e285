//! Revision chain generation.
//!
//! Revisions are produced locally so a write can be sent with
//! `new_edits=false` without first asking the remote for a revision. The
//! generated chain is the one the remote store expects for a
//! non-conflicting write; this module does not detect conflicts.
//!
//! ```text
//! _rev:        "5-abc"                 ->  "6-<new>"
//! _revisions:  (none)                  ->  {start: 6, ids: [<new>, "abc"]}
//! ```

use std::fmt;

use rand::Rng;

use crate::document::{RemoteDocument, Revisions};

/// A locally generated revision token: 8 random bytes, rendered as 16
/// lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RevisionId([u8; 8]);

impl RevisionId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Generate a random revision id.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionId({})", self.to_hex())
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Split a `"<n>-<id>"` revision into its parts.
///
/// Returns `None` for anything that does not have a numeric prefix followed
/// by a non-empty id.
pub fn parse_rev(rev: &str) -> Option<(u64, &str)> {
    let (seq, id) = rev.split_once('-')?;
    let seq = seq.parse().ok()?;
    if id.is_empty() {
        return None;
    }
    Some((seq, id))
}

/// Stamp a document with a fresh random revision.
pub fn stamp(doc: RemoteDocument) -> RemoteDocument {
    stamp_with(doc, RevisionId::random())
}

/// Stamp a document with the given revision id.
///
/// The new revision number is the previous numeric prefix plus one (or 1
/// when `_rev` is missing or unparseable). The new id is prepended to the
/// existing ancestry, which is never pruned.
pub fn stamp_with(mut doc: RemoteDocument, new_id: RevisionId) -> RemoteDocument {
    let new_id = new_id.to_hex();

    let (seq, ancestry) = match doc.rev.as_deref().and_then(parse_rev) {
        Some((seq, ancestor)) => {
            // Keep the full chain when the document already carries one that
            // ends at the current revision.
            let ancestry = match doc.revisions.take() {
                Some(revs)
                    if revs.start == seq && revs.ids.first().map(String::as_str) == Some(ancestor) =>
                {
                    revs.ids
                }
                _ => vec![ancestor.to_string()],
            };
            (seq, ancestry)
        }
        None => (0, Vec::new()),
    };

    let start = seq + 1;
    let mut ids = Vec::with_capacity(ancestry.len() + 1);
    ids.push(new_id.clone());
    ids.extend(ancestry);

    doc.rev = Some(format!("{}-{}", start, new_id));
    doc.revisions = Some(Revisions { start, ids });
    doc
}
