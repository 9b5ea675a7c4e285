//! In-memory implementation of the LocalStore trait.
//!
//! All data is lost when the store is dropped.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tether_core::Record;

use crate::error::{Result, StoreError};
use crate::traits::LocalStore;

/// In-memory store implementation. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    /// Records keyed by (type, id).
    records: RwLock<BTreeMap<(String, String), Record>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn key_of(record: &Record) -> Result<(String, String)> {
    let record_type = record
        .record_type
        .clone()
        .ok_or_else(|| StoreError::InvalidRecord(format!("{} has no type", record.id)))?;
    if record.id.is_empty() {
        return Err(StoreError::InvalidRecord(format!("{} record has no id", record_type)));
    }
    Ok((record_type, record.id.clone()))
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn find(&self, record_type: &str, id: &str) -> Result<Option<Record>> {
        let records = self.records.read();
        Ok(records
            .get(&(record_type.to_string(), id.to_string()))
            .cloned())
    }

    async fn find_all(&self, record_type: Option<&str>) -> Result<Vec<Record>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|((t, _), _)| record_type.map_or(true, |wanted| t == wanted))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn save(&self, record: Record) -> Result<Record> {
        let key = key_of(&record)?;
        tracing::trace!(record_type = %key.0, id = %key.1, "saving record");
        self.records.write().insert(key, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        record_type: &str,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<Record> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&(record_type.to_string(), id.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", record_type, id)))?;

        for (name, value) in changes {
            record.attributes.insert(name, value);
        }
        Ok(record.clone())
    }

    async fn remove(&self, record_type: &str, id: &str) -> Result<Option<Record>> {
        let mut records = self.records.write();
        Ok(records.remove(&(record_type.to_string(), id.to_string())))
    }
}
