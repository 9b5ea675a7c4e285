//! Change classification.
//!
//! The change feed only says "this document changed". Whether that is an
//! add or an update depends on whether this engine has seen the id before,
//! which is what [`KnownObjects`] tracks.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::RemoteDocument;

/// Semantic kind of an incoming change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
}

impl ChangeKind {
    /// Event name fragment for this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Update => "update",
            ChangeKind::Remove => "remove",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote ids this engine has seen alive.
///
/// Memory resident; rebuilt from scratch every time an engine starts.
#[derive(Debug, Clone, Default)]
pub struct KnownObjects {
    ids: HashSet<String>,
}

impl KnownObjects {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a document and update membership to reflect its new state.
    pub fn classify(&mut self, doc: &RemoteDocument) -> ChangeKind {
        if doc.deleted {
            self.ids.remove(&doc.id);
            ChangeKind::Remove
        } else if self.ids.contains(&doc.id) {
            ChangeKind::Update
        } else {
            self.ids.insert(doc.id.clone());
            ChangeKind::Add
        }
    }

    /// Whether the remote id is known.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.ids.contains(doc_id)
    }

    /// Number of known ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no ids are known.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_update_remove_sequence() {
        let mut known = KnownObjects::new();
        let doc = RemoteDocument::new("task/x");

        assert_eq!(known.classify(&doc), ChangeKind::Add);
        assert!(known.contains("task/x"));

        assert_eq!(known.classify(&doc), ChangeKind::Update);
        assert!(known.contains("task/x"));

        assert_eq!(known.classify(&doc.clone().deleted()), ChangeKind::Remove);
        assert!(!known.contains("task/x"));
        assert!(known.is_empty());
    }

    #[test]
    fn test_remove_of_unknown_id() {
        let mut known = KnownObjects::new();
        let kind = known.classify(&RemoteDocument::new("task/y").deleted());

        assert_eq!(kind, ChangeKind::Remove);
        assert!(known.is_empty());
    }

    #[test]
    fn test_readd_after_remove() {
        let mut known = KnownObjects::new();
        let doc = RemoteDocument::new("task/z");

        known.classify(&doc);
        known.classify(&doc.clone().deleted());
        assert_eq!(known.classify(&doc), ChangeKind::Add);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ChangeKind::Add.to_string(), "add");
        assert_eq!(ChangeKind::Update.to_string(), "update");
        assert_eq!(ChangeKind::Remove.to_string(), "remove");
    }
}
