//! LocalStore trait: the abstract interface for local record persistence.
//!
//! The sync engine extends a local store rather than replacing it, so these
//! are the operations it intercepts or feeds incoming changes into.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tether_core::Record;

use crate::error::Result;

/// Async interface for local record persistence.
///
/// Records are keyed by `(type, id)`.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Find a single record.
    async fn find(&self, record_type: &str, id: &str) -> Result<Option<Record>>;

    /// Find all records, optionally restricted to one type.
    ///
    /// Records are returned ordered by type, then id.
    async fn find_all(&self, record_type: Option<&str>) -> Result<Vec<Record>>;

    /// Insert or replace a record. Returns the stored record.
    async fn save(&self, record: Record) -> Result<Record>;

    /// Merge attributes into an existing record.
    ///
    /// Fails with `NotFound` when the record does not exist.
    async fn update(&self, record_type: &str, id: &str, changes: Map<String, Value>)
        -> Result<Record>;

    /// Remove a record. Returns the removed record, if there was one.
    async fn remove(&self, record_type: &str, id: &str) -> Result<Option<Record>>;
}
