//! Sync engine state machine.
//!
//! ```text
//!            connect()                     disconnect()
//! disconnected ───────> connected ─────────────────────> disconnected
//!                       │  idle ⇄ pulling
//!                       │  idle ⇄ pushing
//! ```
//!
//! Each pull cycle and each push runs in its own Tokio task. The engine
//! keeps the abort handle of the in-flight pull and push so that
//! `disconnect()` can cancel them and a new `pull()` can replace a pending
//! one. A successful continuous pull schedules the next cycle right away;
//! failures are classified by HTTP status into retry delays.
//!
//! All mutable state sits behind one mutex that is never held across an
//! await, so every continuation observes a consistent connected flag,
//! cursor and known-object set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::{AbortHandle, JoinError, JoinHandle};

use tether_core::{stamp, ChangeKind, DocumentTranslator, KnownObjects, Record, RemoteDocument};

use crate::config::{SyncConfig, SyncMode, PULL_RESTART_AFTER, RETRY_DELAY};
use crate::error::{Result, SyncError};
use crate::events::{DeliveryFailure, ErrorTopic, Event, EventBus, EventKey};
use crate::messages::{
    AllDocsResponse, BulkDocsRequest, ChangesResponse, RemotePaths, SaveResponse, SinceCursor,
};
use crate::transport::{Method, RequestOptions, Transport};

/// A record as it was handed to `push`, together with the stamped document
/// that was written.
#[derive(Debug, Clone, PartialEq)]
pub struct PushedDocument {
    pub record: Record,
    pub document: RemoteDocument,
}

/// Hook run after a successful bulk write, to bring local revisions in line
/// with what was written.
#[async_trait]
pub trait PushReconciler: Send + Sync {
    async fn reconcile(&self, pushed: &[PushedDocument]) -> Result<()>;
}

/// Default hook: leaves local records alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReconciler;

#[async_trait]
impl PushReconciler for NoopReconciler {
    async fn reconcile(&self, _pushed: &[PushedDocument]) -> Result<()> {
        Ok(())
    }
}

/// A change that was classified and published during a pull.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub kind: ChangeKind,
    pub record: Record,
}

/// Result of one pull cycle.
#[derive(Debug, Default)]
pub struct PullReport {
    /// Cursor after the cycle.
    pub since: SinceCursor,
    pub changes: Vec<AppliedChange>,
    /// Handlers that failed while the changes were published.
    pub delivery_failures: Vec<DeliveryFailure>,
}

/// Result of a push followed by a pull.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub pushed: Vec<PushedDocument>,
    pub pulled: PullReport,
}

/// What to do after a failed pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRecovery {
    /// Emit `error:unauthenticated` and disconnect.
    Unauthenticated,
    /// Emit `error:server` and retry after the delay.
    ServerError(Duration),
    /// Retry after the delay.
    Retry(Duration),
    Stop,
}

/// Decide how to recover from a failed pull.
///
/// `continuous` is whether the pull loop is meant to keep running; 404 and
/// 500 retry regardless.
pub fn classify_pull_failure(error: &SyncError, continuous: bool) -> PullRecovery {
    match error.status() {
        Some(401) => PullRecovery::Unauthenticated,
        Some(404) => PullRecovery::Retry(RETRY_DELAY),
        Some(500) => PullRecovery::ServerError(RETRY_DELAY),
        _ if !continuous => PullRecovery::Stop,
        // The watchdog aborted a silent long-poll: reissue right away.
        _ if matches!(error, SyncError::Timeout(_)) => PullRecovery::Retry(Duration::ZERO),
        _ => PullRecovery::Retry(RETRY_DELAY),
    }
}

struct InFlight {
    ticket: u64,
    handle: AbortHandle,
}

struct EngineState {
    connected: bool,
    mode: SyncMode,
    since: SinceCursor,
    known: KnownObjects,
    pull: Option<InFlight>,
    push: Option<InFlight>,
    next_ticket: u64,
}

impl EngineState {
    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn continuously_pulling(&self) -> bool {
        self.connected && self.mode.pulls()
    }
}

struct Inner<T> {
    config: SyncConfig,
    transport: T,
    translator: DocumentTranslator,
    paths: RemotePaths,
    events: EventBus,
    reconciler: RwLock<Arc<dyn PushReconciler>>,
    state: Mutex<EngineState>,
    /// Serializes pushes so at most one bulk write is in flight.
    push_lock: tokio::sync::Mutex<()>,
}

/// Bidirectional sync engine for one remote database.
///
/// Cloning is cheap; clones share the same engine.
pub struct SyncEngine<T: Transport + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport + 'static> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static> SyncEngine<T> {
    /// Create a disconnected engine. No request is made until `connect`,
    /// `start_syncing`, `pull` or `push` is called.
    pub fn new(config: SyncConfig, transport: T) -> Self {
        let translator = DocumentTranslator::new(config.prefix.clone());
        let paths = RemotePaths::new(config.name.as_deref());
        let mode = config.sync;

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                translator,
                paths,
                events: EventBus::new(),
                reconciler: RwLock::new(Arc::new(NoopReconciler)),
                state: Mutex::new(EngineState {
                    connected: false,
                    mode,
                    since: SinceCursor::default(),
                    known: KnownObjects::new(),
                    pull: None,
                    push: None,
                    next_ticket: 0,
                }),
                push_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create an engine and, when the configuration enables syncing, start
    /// syncing in the background.
    ///
    /// Must be called from within a Tokio runtime when syncing is enabled.
    pub fn start(config: SyncConfig, transport: T) -> Self {
        let engine = Self::new(config, transport);
        if engine.mode().is_enabled() {
            engine.spawn_connect();
        }
        engine
    }

    /// Connect in a background task. Failures are logged; retries continue
    /// on their own while connected.
    pub fn spawn_connect(&self) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(error) = engine.connect().await {
                tracing::warn!(%error, "initial sync failed");
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn translator(&self) -> &DocumentTranslator {
        &self.inner.translator
    }

    /// The engine's event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Replace the hook run after successful pushes.
    pub fn set_reconciler(&self, reconciler: Arc<dyn PushReconciler>) {
        *self.inner.reconciler.write() = reconciler;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    pub fn mode(&self) -> SyncMode {
        self.inner.state.lock().mode
    }

    pub fn set_mode(&self, mode: SyncMode) {
        self.inner.state.lock().mode = mode;
    }

    pub fn is_continuously_pulling(&self) -> bool {
        self.mode().pulls()
    }

    pub fn is_continuously_pushing(&self) -> bool {
        self.mode().pushes()
    }

    pub fn is_continuously_syncing(&self) -> bool {
        self.mode() == SyncMode::Sync
    }

    /// Current change feed position.
    pub fn since(&self) -> SinceCursor {
        self.inner.state.lock().since.clone()
    }

    pub fn set_since(&self, since: SinceCursor) {
        self.inner.state.lock().since = since;
    }

    /// Snapshot of the remote ids seen alive.
    pub fn known_objects(&self) -> KnownObjects {
        self.inner.state.lock().known.clone()
    }

    /// Whether a pull cycle is currently in flight.
    pub fn is_pulling(&self) -> bool {
        self.inner
            .state
            .lock()
            .pull
            .as_ref()
            .map_or(false, |p| !p.handle.is_finished())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection state
    // ─────────────────────────────────────────────────────────────────────────

    /// Mark the engine connected and sync (push nothing, then pull).
    pub async fn connect(&self) -> Result<SyncReport> {
        self.inner.state.lock().connected = true;
        tracing::info!(store = ?self.inner.config.name, "connected");
        self.sync(&[]).await
    }

    /// Mark the engine disconnected and abort in-flight requests.
    ///
    /// Calling this while already disconnected does nothing.
    pub fn disconnect(&self) {
        self.inner.disconnect(None);
    }

    /// Switch to continuous two-way sync and connect.
    pub async fn start_syncing(&self) -> Result<SyncReport> {
        self.set_mode(SyncMode::Sync);
        self.connect().await
    }

    /// Stop continuous syncing. An in-flight pull finishes but is not
    /// followed by another one.
    pub fn stop_syncing(&self) {
        self.set_mode(SyncMode::Off);
        tracing::info!(store = ?self.inner.config.name, "syncing stopped");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pull / push / sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one change feed cycle.
    ///
    /// A pull already in flight is aborted and replaced by this one. When
    /// the engine is connected and pulling continuously, the next cycle is
    /// started as soon as this one succeeds; retries after failures happen in
    /// the background and never surface through this call.
    pub async fn pull(&self) -> Result<PullReport> {
        let handle = Inner::start_pull(&self.inner);
        join(handle).await
    }

    /// Write records to the remote with client-generated revisions.
    pub async fn push(&self, records: &[Record]) -> Result<Vec<PushedDocument>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let pushed = records
            .iter()
            .map(|record| -> Result<PushedDocument> {
                let document = stamp(self.inner.translator.to_remote(record)?);
                Ok(PushedDocument {
                    record: record.clone(),
                    document,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let _serial = self.inner.push_lock.lock().await;
        let (ticket, handle) = {
            let mut state = self.inner.state.lock();
            let ticket = state.ticket();
            let inner = Arc::clone(&self.inner);
            let handle = tokio::spawn(async move { inner.run_push(pushed).await });
            state.push = Some(InFlight {
                ticket,
                handle: handle.abort_handle(),
            });
            (ticket, handle)
        };

        let result = join(handle).await;
        let mut state = self.inner.state.lock();
        if state.push.as_ref().map(|p| p.ticket) == Some(ticket) {
            state.push = None;
        }
        result
    }

    /// Push, then pull.
    pub async fn sync(&self, records: &[Record]) -> Result<SyncReport> {
        let pushed = self.push(records).await?;
        let pulled = self.pull().await?;
        Ok(SyncReport { pushed, pulled })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remote CRUD
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch one record from the remote.
    pub async fn find(&self, record_type: &str, id: &str) -> Result<Record> {
        let doc_id = self.inner.translator.document_id(record_type, id);
        let response = self
            .inner
            .transport
            .request(Method::Get, &self.inner.paths.document(&doc_id), RequestOptions::json())
            .await?;
        let doc: RemoteDocument = decode(response.body, "document")?;
        Ok(self.inner.translator.from_remote(&doc))
    }

    /// List remote records, optionally of one type. Design documents are
    /// skipped.
    pub async fn find_all(&self, record_type: Option<&str>) -> Result<Vec<Record>> {
        let range = self.inner.translator.key_range(record_type);
        let path = self.inner.paths.all_docs(range.as_ref());
        let response = self
            .inner
            .transport
            .request(Method::Get, &path, RequestOptions::json())
            .await?;
        let listing: AllDocsResponse = decode(response.body, "all_docs")?;

        Ok(listing
            .rows
            .into_iter()
            .filter(|row| !row.id.starts_with("_design/"))
            .filter_map(|row| row.doc)
            .map(|doc| self.inner.translator.from_remote(&doc))
            .collect())
    }

    /// Upsert one record. The remote assigns the revision, which is returned
    /// on the record.
    pub async fn save(&self, record: &Record) -> Result<Record> {
        let doc = self.inner.translator.to_remote(record)?;
        let path = self.inner.paths.document(&doc.id);
        let body = serde_json::to_value(&doc)?;
        let response = self
            .inner
            .transport
            .request(Method::Put, &path, RequestOptions::json().with_data(body))
            .await?;
        let saved: SaveResponse = decode(response.body, "save")?;

        let mut record = record.clone();
        if let Some(rev) = saved.rev {
            record.rev = Some(rev);
        }
        Ok(record)
    }
}

impl<T: Transport + 'static> Inner<T> {
    fn scope(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Disconnect, aborting in-flight work except the pull task `keep`
    /// (the caller itself, when a failing pull disconnects).
    fn disconnect(&self, keep: Option<u64>) {
        let (pull, push) = {
            let mut state = self.state.lock();
            if !state.connected && state.pull.is_none() && state.push.is_none() {
                return;
            }
            state.connected = false;
            (state.pull.take(), state.push.take())
        };

        for task in pull.into_iter().chain(push) {
            if Some(task.ticket) != keep {
                task.handle.abort();
            }
        }
        tracing::info!(store = ?self.config.name, "disconnected");
    }

    /// Spawn a pull cycle now, aborting the in-flight one.
    fn start_pull(self: &Arc<Self>) -> JoinHandle<Result<PullReport>> {
        let mut state = self.state.lock();
        let (handle, replaced) = self.spawn_pull(&mut state, Duration::ZERO);
        if let Some(previous) = replaced {
            previous.handle.abort();
        }
        handle
    }

    /// Spawn the cycle following `ticket` after `delay`.
    ///
    /// Does nothing unless `ticket` is still the in-flight cycle; a cycle
    /// that was replaced or cancelled must not schedule anything.
    fn schedule_next_pull(self: &Arc<Self>, delay: Duration, ticket: u64) -> bool {
        let mut state = self.state.lock();
        if state.pull.as_ref().map(|p| p.ticket) != Some(ticket) {
            tracing::debug!(ticket, "pull cycle was superseded, not rescheduling");
            return false;
        }
        self.spawn_pull(&mut state, delay);
        true
    }

    fn spawn_pull(
        self: &Arc<Self>,
        state: &mut EngineState,
        delay: Duration,
    ) -> (JoinHandle<Result<PullReport>>, Option<InFlight>) {
        let ticket = state.ticket();
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.run_pull(ticket).await
        });

        let replaced = state.pull.replace(InFlight {
            ticket,
            handle: handle.abort_handle(),
        });
        (handle, replaced)
    }

    async fn run_pull(self: &Arc<Self>, ticket: u64) -> Result<PullReport> {
        let (since, continuous) = {
            let state = self.state.lock();
            (state.since.clone(), state.continuously_pulling())
        };
        let path = self.paths.changes(&since, continuous);
        tracing::debug!(%since, continuous, "pulling changes");

        let request = self
            .transport
            .request(Method::Get, &path, RequestOptions::json());
        let response = if continuous {
            match tokio::time::timeout(PULL_RESTART_AFTER, request).await {
                Ok(response) => response,
                Err(_) => Err(SyncError::Timeout(format!(
                    "no change feed response within {}s",
                    PULL_RESTART_AFTER.as_secs()
                ))),
            }
        } else {
            request.await
        };

        let result = match response {
            Ok(response) => self.handle_pull_success(response.body).await,
            Err(error) => Err(error),
        };

        match &result {
            Ok(report) => {
                let continuous = self.state.lock().continuously_pulling();
                if continuous && self.schedule_next_pull(Duration::ZERO, ticket) {
                    tracing::debug!(since = %report.since, "continuing pull loop");
                }
            }
            Err(error) => self.handle_pull_error(error, ticket).await,
        }
        result
    }

    async fn handle_pull_success(&self, body: Value) -> Result<PullReport> {
        let changes: ChangesResponse = decode(body, "change feed")?;

        let docs: Vec<RemoteDocument> = changes
            .results
            .into_iter()
            .filter_map(|row| row.into_document())
            .filter(|doc| !doc.is_design())
            .collect();

        // Classify against a copy; the known set and the cursor only move
        // together, once the whole batch has been published.
        let mut known = self.state.lock().known.clone();
        let classified: Vec<AppliedChange> = docs
            .iter()
            .map(|doc| AppliedChange {
                kind: known.classify(doc),
                record: self.translator.from_remote(doc),
            })
            .collect();

        let mut delivery_failures = Vec::new();
        for change in &classified {
            delivery_failures.extend(
                self.events
                    .emit_change(self.scope(), change.kind, &change.record)
                    .await,
            );
        }

        {
            let mut state = self.state.lock();
            state.known = known;
            state.since = changes.last_seq.clone();
        }
        tracing::debug!(since = %changes.last_seq, docs = classified.len(), "pull batch handled");

        Ok(PullReport {
            since: changes.last_seq,
            changes: classified,
            delivery_failures,
        })
    }

    async fn handle_pull_error(self: &Arc<Self>, error: &SyncError, ticket: u64) {
        let continuous = {
            let state = self.state.lock();
            if !state.connected {
                tracing::debug!(%error, "ignoring pull failure while disconnected");
                return;
            }
            state.mode.pulls()
        };

        match classify_pull_failure(error, continuous) {
            PullRecovery::Unauthenticated => {
                tracing::warn!(%error, "pull unauthenticated, disconnecting");
                self.emit_error(ErrorTopic::Unauthenticated, error).await;
                self.disconnect(Some(ticket));
            }
            PullRecovery::ServerError(delay) => {
                tracing::warn!(%error, delay_ms = delay.as_millis() as u64, "server error while pulling");
                self.emit_error(ErrorTopic::Server, error).await;
                self.schedule_next_pull(delay, ticket);
            }
            PullRecovery::Retry(delay) => {
                tracing::warn!(%error, delay_ms = delay.as_millis() as u64, "pull failed, retrying");
                self.schedule_next_pull(delay, ticket);
            }
            PullRecovery::Stop => {
                tracing::debug!(%error, "pull failed, not retrying");
            }
        }
    }

    async fn emit_error(&self, topic: ErrorTopic, error: &SyncError) {
        let key = EventKey::error(self.scope(), topic);
        let event = Event::Error {
            topic,
            message: error.to_string(),
        };
        self.events.emit(&key, &event).await;
    }

    async fn run_push(&self, pushed: Vec<PushedDocument>) -> Result<Vec<PushedDocument>> {
        let body = BulkDocsRequest {
            docs: pushed.iter().map(|p| p.document.clone()).collect(),
            new_edits: false,
        };
        let data = serde_json::to_value(&body)?;
        tracing::debug!(docs = pushed.len(), "pushing documents");

        self.transport
            .request(Method::Post, &self.paths.bulk_docs(), RequestOptions::json().with_data(data))
            .await?;

        let reconciler = Arc::clone(&*self.reconciler.read());
        reconciler.reconcile(&pushed).await?;
        Ok(pushed)
    }
}

fn decode<D: DeserializeOwned>(body: Value, what: &str) -> Result<D> {
    serde_json::from_value(body).map_err(|e| SyncError::InvalidMessage(format!("{}: {}", what, e)))
}

async fn join<R>(handle: JoinHandle<Result<R>>) -> Result<R> {
    match handle.await {
        Ok(result) => result,
        Err(error) => Err(join_error(error)),
    }
}

fn join_error(error: JoinError) -> SyncError {
    if error.is_panic() {
        std::panic::resume_unwind(error.into_panic());
    }
    SyncError::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DeliveryError, EventHandler, StoreTopic};
    use crate::transport::mock::{MockReply, MockTransport};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn changes(last_seq: u64, docs: Vec<Value>) -> MockReply {
        let results: Vec<Value> = docs.into_iter().map(|doc| json!({"doc": doc})).collect();
        MockReply::Json(json!({"last_seq": last_seq, "results": results}))
    }

    fn engine(config: SyncConfig) -> (SyncEngine<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        (SyncEngine::new(config, transport.clone()), transport)
    }

    #[test]
    fn test_classify_pull_failure_table() {
        let status = |s| SyncError::from_status(s, "");
        assert_eq!(classify_pull_failure(&status(401), true), PullRecovery::Unauthenticated);
        assert_eq!(classify_pull_failure(&status(404), false), PullRecovery::Retry(RETRY_DELAY));
        assert_eq!(
            classify_pull_failure(&status(500), false),
            PullRecovery::ServerError(RETRY_DELAY)
        );
        assert_eq!(
            classify_pull_failure(&SyncError::Timeout("t".into()), true),
            PullRecovery::Retry(Duration::ZERO)
        );
        assert_eq!(
            classify_pull_failure(&SyncError::TransportError("reset".into()), true),
            PullRecovery::Retry(RETRY_DELAY)
        );
        assert_eq!(
            classify_pull_failure(&SyncError::TransportError("reset".into()), false),
            PullRecovery::Stop
        );
        assert_eq!(classify_pull_failure(&status(502), false), PullRecovery::Stop);
        assert_eq!(classify_pull_failure(&status(409), true), PullRecovery::Retry(RETRY_DELAY));
    }

    #[tokio::test]
    async fn test_one_shot_pull_classifies_and_advances() {
        let (engine, transport) = engine(SyncConfig::new());
        transport.reply(
            Method::Get,
            "/_changes",
            changes(3, vec![json!({"_id": "task/1", "_rev": "1-a", "title": "t"})]),
        );

        let report = engine.pull().await.unwrap();

        assert_eq!(report.since, SinceCursor::Seq(3));
        assert_eq!(engine.since(), SinceCursor::Seq(3));
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].kind, ChangeKind::Add);
        assert_eq!(report.changes[0].record.id, "1");
        assert!(engine.known_objects().contains("task/1"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/_changes?include_docs=true&since=0");
    }

    #[tokio::test]
    async fn test_pull_update_then_remove() {
        let (engine, transport) = engine(SyncConfig::new());
        let doc = json!({"_id": "task/1", "_rev": "1-a"});
        transport.reply(Method::Get, "/_changes", changes(1, vec![doc.clone()]));
        transport.reply(Method::Get, "/_changes", changes(2, vec![doc]));
        transport.reply(
            Method::Get,
            "/_changes",
            changes(3, vec![json!({"_id": "task/1", "_rev": "2-b", "_deleted": true})]),
        );

        let kinds: Vec<ChangeKind> = {
            let mut kinds = Vec::new();
            for _ in 0..3 {
                kinds.push(engine.pull().await.unwrap().changes[0].kind);
            }
            kinds
        };

        assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Update, ChangeKind::Remove]);
        assert!(engine.known_objects().is_empty());
        assert!(transport.requests()[2].path.ends_with("since=2"));
    }

    #[tokio::test]
    async fn test_pull_skips_design_documents() {
        let (engine, transport) = engine(SyncConfig::new());
        transport.reply(
            Method::Get,
            "/_changes",
            changes(2, vec![json!({"_id": "_design/app"}), json!({"_id": "task/1"})]),
        );

        let report = engine.pull().await.unwrap();
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].record.id, "1");
    }

    #[tokio::test]
    async fn test_pull_accepts_legacy_names_beside_reserved_ones() {
        let (engine, transport) = engine(SyncConfig::new());
        transport.reply(
            Method::Get,
            "/_changes",
            changes(
                1,
                vec![json!({"_id": "task/1", "_rev": "1-a", "id": "1", "rev": "draft-2", "title": "t"})],
            ),
        );

        let report = engine.pull().await.unwrap();

        assert_eq!(engine.since(), SinceCursor::Seq(1));
        let record = &report.changes[0].record;
        assert_eq!(record.id, "1");
        assert_eq!(record.rev.as_deref(), Some("1-a"));
        assert_eq!(record.get("rev"), Some(&json!("draft-2")));
    }

    /// Blocks the first delivery forever, lets later ones through.
    struct StallFirst {
        stalled: AtomicBool,
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl EventHandler for StallFirst {
        async fn handle(&self, _: &EventKey, _: &Event) -> std::result::Result<(), DeliveryError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_interrupted_batch_is_classified_again_from_scratch() {
        let (engine, transport) = engine(SyncConfig::new());
        let entered = Arc::new(Notify::new());
        engine.events().subscribe(
            EventKey::store(None, StoreTopic::Add),
            StallFirst {
                stalled: AtomicBool::new(false),
                entered: Arc::clone(&entered),
            },
        );
        let batch = vec![json!({"_id": "task/1", "_rev": "1-a"})];
        transport.reply(Method::Get, "/_changes", changes(1, batch.clone()));
        transport.reply(Method::Get, "/_changes", changes(1, batch));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.pull().await })
        };
        entered.notified().await;
        assert!(engine.known_objects().is_empty());

        let second = engine.pull().await.unwrap();

        assert!(matches!(first.await.unwrap(), Err(SyncError::Cancelled)));
        assert_eq!(second.changes[0].kind, ChangeKind::Add);
        assert_eq!(engine.since(), SinceCursor::Seq(1));
        assert!(engine.known_objects().contains("task/1"));
    }

    #[tokio::test]
    async fn test_malformed_feed_does_not_advance_cursor() {
        let (engine, transport) = engine(SyncConfig::new());
        engine.set_since(SinceCursor::Seq(4));
        transport.reply(Method::Get, "/_changes", MockReply::Json(json!({"results": []})));

        let result = engine.pull().await;

        assert!(matches!(result, Err(SyncError::InvalidMessage(_))));
        assert_eq!(engine.since(), SinceCursor::Seq(4));
    }

    #[tokio::test]
    async fn test_delivery_failures_are_reported() {
        let (engine, transport) = engine(SyncConfig::new());
        engine.events().subscribe(
            EventKey::store(None, StoreTopic::Add),
            |_: &EventKey, _: &Event| -> std::result::Result<(), DeliveryError> {
                Err(DeliveryError::new("local write failed"))
            },
        );
        transport.reply(Method::Get, "/_changes", changes(1, vec![json!({"_id": "task/1"})]));

        let report = engine.pull().await.unwrap();

        assert_eq!(report.delivery_failures.len(), 1);
        assert_eq!(report.delivery_failures[0].key.to_string(), "store:add");
        assert_eq!(engine.since(), SinceCursor::Seq(1));
    }

    #[tokio::test]
    async fn test_push_empty_is_noop() {
        let (engine, transport) = engine(SyncConfig::new());
        let pushed = engine.push(&[]).await.unwrap();

        assert!(pushed.is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_push_stamps_and_bulk_writes() {
        let (engine, transport) = engine(SyncConfig::new().with_prefix("$public"));
        transport.always(Method::Post, "/_bulk_docs", MockReply::Json(json!([])));

        let record = Record::new("task", "42").with("title", "y").with_rev("3-abc");
        let pushed = engine.push(&[record]).await.unwrap();

        assert_eq!(pushed.len(), 1);
        let rev = pushed[0].document.rev.clone().unwrap();
        assert!(rev.starts_with("4-"));

        let requests = transport.requests_to("/_bulk_docs");
        assert_eq!(requests.len(), 1);
        let body = requests[0].body.clone().unwrap();
        assert_eq!(body["new_edits"], json!(false));
        assert_eq!(body["docs"][0]["_id"], json!("$public/task/42"));
        assert_eq!(body["docs"][0]["_revisions"]["start"], json!(4));
        assert_eq!(body["docs"][0]["_revisions"]["ids"][1], json!("abc"));
    }

    #[tokio::test]
    async fn test_push_translation_error_sends_nothing() {
        let (engine, transport) = engine(SyncConfig::new());
        let result = engine.push(&[Record::new("task", "")]).await;

        assert!(matches!(result, Err(SyncError::Translation(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_push_runs_reconciler() {
        struct Counting(Arc<Mutex<usize>>);

        #[async_trait]
        impl PushReconciler for Counting {
            async fn reconcile(&self, pushed: &[PushedDocument]) -> Result<()> {
                *self.0.lock() += pushed.len();
                Ok(())
            }
        }

        let (engine, transport) = engine(SyncConfig::new());
        let count = Arc::new(Mutex::new(0));
        engine.set_reconciler(Arc::new(Counting(Arc::clone(&count))));
        transport.always(Method::Post, "/_bulk_docs", MockReply::Json(json!([])));

        engine
            .push(&[Record::new("task", "1"), Record::new("task", "2")])
            .await
            .unwrap();
        assert_eq!(*count.lock(), 2);
    }

    #[tokio::test]
    async fn test_push_failure_skips_reconciler() {
        let (engine, transport) = engine(SyncConfig::new());
        transport.reply(Method::Post, "/_bulk_docs", MockReply::Status(500));

        let result = engine.push(&[Record::new("task", "1")]).await;
        assert!(matches!(result, Err(SyncError::ServerError { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (engine, _transport) = engine(SyncConfig::new());
        engine.disconnect();
        engine.disconnect();

        assert!(!engine.is_connected());
        assert_eq!(engine.since(), SinceCursor::Seq(0));
    }

    #[tokio::test]
    async fn test_new_pull_replaces_pending_one() {
        let (engine, transport) = engine(SyncConfig::new());

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.pull().await })
        };
        transport.wait_for_requests(1).await;

        transport.reply(Method::Get, "/_changes", changes(5, vec![]));
        let second = engine.pull().await.unwrap();

        assert!(matches!(first.await.unwrap(), Err(SyncError::Cancelled)));
        assert_eq!(second.since, SinceCursor::Seq(5));
    }

    #[tokio::test]
    async fn test_superseded_cycle_does_not_reschedule() {
        let (engine, transport) = engine(SyncConfig::new());

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.pull().await })
        };
        transport.wait_for_requests(1).await;
        let stale = engine.inner.state.lock().pull.as_ref().map(|p| p.ticket).unwrap();

        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.pull().await })
        };
        transport.wait_for_requests(2).await;

        assert!(!engine.inner.schedule_next_pull(Duration::ZERO, stale));
        assert_eq!(transport.requests().len(), 2);

        transport.reply(Method::Get, "/_changes", changes(5, vec![]));
        assert_eq!(second.await.unwrap().unwrap().since, SinceCursor::Seq(5));
        assert!(matches!(first.await.unwrap(), Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_find_all_filters_by_type_and_skips_design_docs() {
        let (engine, transport) = engine(SyncConfig::new().with_prefix("$public"));
        transport.reply(
            Method::Get,
            "/_all_docs",
            MockReply::Json(json!({"rows": [
                {"id": "_design/app", "doc": {"_id": "_design/app"}},
                {"id": "$public/task/1", "doc": {"_id": "$public/task/1", "title": "a"}},
            ]})),
        );

        let records = engine.find_all(Some("task")).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type.as_deref(), Some("task"));
        assert_eq!(
            transport.requests()[0].path,
            "/_all_docs?include_docs=true&startkey=%22%24public%2Ftask%2F%22&endkey=%22%24public%2Ftask0%22"
        );
    }

    #[tokio::test]
    async fn test_find_and_save() {
        let (engine, transport) = engine(SyncConfig::new().with_name("inbox"));
        transport.reply(
            Method::Get,
            "/inbox/task/7",
            MockReply::Json(json!({"_id": "task/7", "_rev": "2-b", "title": "t"})),
        );
        transport.reply(
            Method::Put,
            "/inbox/task/7",
            MockReply::Json(json!({"ok": true, "id": "task/7", "rev": "3-c"})),
        );

        let found = engine.find("task", "7").await.unwrap();
        assert_eq!(found.rev.as_deref(), Some("2-b"));

        let saved = engine.save(&found.clone().with("title", "u")).await.unwrap();
        assert_eq!(saved.rev.as_deref(), Some("3-c"));

        let put = &transport.requests_to("/inbox/task/7")[1];
        assert_eq!(put.method, Method::Put);
        assert_eq!(put.body.as_ref().unwrap()["title"], json!("u"));
    }

    #[tokio::test]
    async fn test_find_missing_record() {
        let (engine, transport) = engine(SyncConfig::new());
        transport.reply(Method::Get, "/task/404", MockReply::Status(404));

        let result = engine.find("task", "404").await;
        assert_eq!(result.unwrap_err().status(), Some(404));
    }
}
