//! SyncedStore: a local store kept in step with the remote.
//!
//! The store stays the source of truth for reads. Writes go to the store
//! first and are pushed when the engine pushes continuously and is
//! connected; incoming changes are written back through [`ChangeApplier`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use tether_core::{ChangeKind, Record};
use tether_store::{LocalStore, StoreError};
use tether_sync::{
    DeliveryError, Event, EventHandler, EventKey, PullReport, PushReconciler, PushedDocument,
    StoreTopic, SubscriptionId, SyncConfig, SyncEngine, SyncError, SyncReport, Transport,
};

use crate::error::Result;

/// Writes incoming changes into the local store.
///
/// Subscribed to `store:change`, so it sees every classified change once.
pub struct ChangeApplier<S> {
    store: Arc<S>,
}

impl<S> ChangeApplier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: LocalStore + 'static> EventHandler for ChangeApplier<S> {
    async fn handle(&self, key: &EventKey, event: &Event) -> std::result::Result<(), DeliveryError> {
        let (kind, record) = match event {
            Event::Change { kind, record } => (*kind, record),
            Event::Error { .. } => return Ok(()),
        };
        let record_type = match record.record_type.as_deref() {
            Some(record_type) => record_type,
            None => {
                tracing::debug!(id = %record.id, "skipping untyped change");
                return Ok(());
            }
        };

        match kind {
            ChangeKind::Add | ChangeKind::Update => {
                self.store
                    .save(record.clone())
                    .await
                    .map_err(DeliveryError::new)?;
            }
            ChangeKind::Remove => {
                self.store
                    .remove(record_type, &record.id)
                    .await
                    .map_err(DeliveryError::new)?;
            }
        }
        tracing::debug!(event = %key, %kind, "applied incoming change");
        Ok(())
    }
}

/// Writes the revisions stamped during a push back into the local store.
pub struct StoreReconciler<S> {
    store: Arc<S>,
}

impl<S> StoreReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

fn reconcile_error(error: StoreError) -> SyncError {
    SyncError::Reconcile(error.to_string())
}

#[async_trait]
impl<S: LocalStore + 'static> PushReconciler for StoreReconciler<S> {
    async fn reconcile(&self, pushed: &[PushedDocument]) -> tether_sync::Result<()> {
        for entry in pushed {
            // Tombstones are already gone locally.
            if entry.document.deleted {
                continue;
            }
            let (record_type, rev) = match (&entry.record.record_type, &entry.document.rev) {
                (Some(record_type), Some(rev)) => (record_type, rev),
                _ => continue,
            };

            let local = self
                .store
                .find(record_type, &entry.record.id)
                .await
                .map_err(reconcile_error)?;
            if let Some(mut local) = local {
                local.rev = Some(rev.clone());
                self.store.save(local).await.map_err(reconcile_error)?;
            }
        }
        Ok(())
    }
}

/// A local store extended by a sync engine.
pub struct SyncedStore<S: LocalStore + 'static, T: Transport + 'static> {
    store: Arc<S>,
    engine: SyncEngine<T>,
    applier: SubscriptionId,
}

impl<S: LocalStore + 'static, T: Transport + 'static> SyncedStore<S, T> {
    /// Wrap a store. Nothing is synced until `connect` or `start_syncing`.
    pub fn new(store: S, config: SyncConfig, transport: T) -> Self {
        let store = Arc::new(store);
        let engine = SyncEngine::new(config, transport);

        engine.set_reconciler(Arc::new(StoreReconciler::new(Arc::clone(&store))));
        let scope = engine.config().name.clone();
        let applier = engine.events().subscribe(
            EventKey::store(scope.as_deref(), StoreTopic::Change),
            ChangeApplier::new(Arc::clone(&store)),
        );

        Self {
            store,
            engine,
            applier,
        }
    }

    /// Wrap a store and, when the configuration enables syncing, connect in
    /// the background.
    ///
    /// Must be called from within a Tokio runtime when syncing is enabled.
    pub fn open(store: S, config: SyncConfig, transport: T) -> Self {
        let synced = Self::new(store, config, transport);
        if synced.engine.mode().is_enabled() {
            synced.engine.spawn_connect();
        }
        synced
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &SyncEngine<T> {
        &self.engine
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync control
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn connect(&self) -> Result<SyncReport> {
        Ok(self.engine.connect().await?)
    }

    pub fn disconnect(&self) {
        self.engine.disconnect();
    }

    pub async fn start_syncing(&self) -> Result<SyncReport> {
        Ok(self.engine.start_syncing().await?)
    }

    pub fn stop_syncing(&self) {
        self.engine.stop_syncing();
    }

    pub async fn pull(&self) -> Result<PullReport> {
        Ok(self.engine.pull().await?)
    }

    /// Push every local record (optionally of one type), then pull.
    pub async fn sync_all(&self, record_type: Option<&str>) -> Result<SyncReport> {
        let records = self.store.find_all(record_type).await?;
        Ok(self.engine.sync(&records).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn find(&self, record_type: &str, id: &str) -> Result<Option<Record>> {
        Ok(self.store.find(record_type, id).await?)
    }

    pub async fn find_all(&self, record_type: Option<&str>) -> Result<Vec<Record>> {
        Ok(self.store.find_all(record_type).await?)
    }

    /// Save locally, then push when pushing continuously.
    ///
    /// The returned record carries the revision written to the remote.
    pub async fn save(&self, record: Record) -> Result<Record> {
        let saved = self.store.save(record).await?;
        self.push_written(saved).await
    }

    /// Merge `changes` into a local record, then push when pushing
    /// continuously.
    pub async fn update(
        &self,
        record_type: &str,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<Record> {
        let updated = self.store.update(record_type, id, changes).await?;
        self.push_written(updated).await
    }

    /// Remove locally, then push a tombstone when pushing continuously.
    pub async fn remove(&self, record_type: &str, id: &str) -> Result<Option<Record>> {
        let removed = self.store.remove(record_type, id).await?;
        if let Some(record) = &removed {
            if self.pushes_now() {
                let mut tombstone = record.clone();
                tombstone.mark_deleted();
                self.engine.push(&[tombstone]).await?;
            }
        }
        Ok(removed)
    }

    async fn push_written(&self, mut record: Record) -> Result<Record> {
        if self.pushes_now() {
            let pushed = self.engine.push(std::slice::from_ref(&record)).await?;
            if let Some(rev) = pushed.first().and_then(|p| p.document.rev.clone()) {
                record.rev = Some(rev);
            }
        }
        Ok(record)
    }

    fn pushes_now(&self) -> bool {
        self.engine.is_connected() && self.engine.is_continuously_pushing()
    }
}

impl<S: LocalStore + 'static, T: Transport + 'static> Drop for SyncedStore<S, T> {
    fn drop(&mut self) {
        self.engine.events().unsubscribe(self.applier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::RemoteDocument;
    use tether_store::MemoryStore;

    #[tokio::test]
    async fn test_applier_saves_and_removes() {
        let store = Arc::new(MemoryStore::new());
        let applier = ChangeApplier::new(Arc::clone(&store));
        let key = EventKey::store(None, StoreTopic::Change);
        let record = Record::new("task", "1").with("title", "a");

        applier
            .handle(&key, &Event::Change { kind: ChangeKind::Add, record: record.clone() })
            .await
            .unwrap();
        assert!(store.find("task", "1").await.unwrap().is_some());

        applier
            .handle(&key, &Event::Change { kind: ChangeKind::Remove, record })
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_applier_ignores_untyped_records() {
        let store = Arc::new(MemoryStore::new());
        let applier = ChangeApplier::new(Arc::clone(&store));
        let mut record = Record::new("task", "1");
        record.record_type = None;

        applier
            .handle(
                &EventKey::store(None, StoreTopic::Change),
                &Event::Change { kind: ChangeKind::Add, record },
            )
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reconciler_writes_revisions_back() {
        let store = Arc::new(MemoryStore::new());
        store.save(Record::new("task", "1").with("title", "a")).await.unwrap();
        let reconciler = StoreReconciler::new(Arc::clone(&store));

        let pushed = vec![
            PushedDocument {
                record: Record::new("task", "1"),
                document: RemoteDocument::new("task/1").with_rev("1-00ff00ff00ff00ff"),
            },
            PushedDocument {
                record: Record::new("task", "gone"),
                document: RemoteDocument::new("task/gone").with_rev("2-ab"),
            },
        ];
        reconciler.reconcile(&pushed).await.unwrap();

        let local = store.find("task", "1").await.unwrap().unwrap();
        assert_eq!(local.rev.as_deref(), Some("1-00ff00ff00ff00ff"));
        assert_eq!(local.get("title"), Some(&serde_json::json!("a")));
        assert!(store.find("task", "gone").await.unwrap().is_none());
    }
}
