//! # Tether Sync
//!
//! Bidirectional sync between a local store and a remote document database
//! over HTTP.
//!
//! ## Overview
//!
//! Incoming changes arrive through the remote change feed, either one-shot or
//! as a long-poll loop that restarts itself. Each change is classified as an
//! add, update or remove and published on the [`EventBus`]. Outgoing records
//! are stamped with client-generated revisions and written in one bulk
//! request with `new_edits: false`, so the remote keeps the revision history
//! the client built.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tether_sync::{SyncConfig, SyncEngine, SyncMode};
//! use tether_sync::transport::mock::MockTransport;
//!
//! async fn example() {
//!     let config = SyncConfig::new()
//!         .with_prefix("$public")
//!         .with_sync(SyncMode::Sync);
//!     let engine = SyncEngine::new(config, MockTransport::new());
//!
//!     // Connect, push nothing, then keep pulling.
//!     // let report = engine.connect().await?;
//!     // println!("cursor at {}", report.pulled.since);
//! }
//! ```
//!
//! ## Pull loop
//!
//! ```text
//! GET /_changes?since=n ──ok──> publish changes, since = last_seq ──> again
//!         │
//!         ├── 401 ──────> error:unauthenticated, disconnect
//!         ├── 404 ──────> retry in 3s
//!         ├── 500 ──────> error:server, retry in 3s
//!         ├── 25s idle ─> abort, retry now
//!         └── other ────> retry in 3s while continuous
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod messages;
pub mod transport;

pub use config::{SyncConfig, SyncMode, HEARTBEAT_MS, PULL_RESTART_AFTER, RETRY_DELAY};
pub use engine::{
    classify_pull_failure, AppliedChange, NoopReconciler, PullRecovery, PullReport,
    PushReconciler, PushedDocument, SyncEngine, SyncReport,
};
pub use error::{Result, SyncError};
pub use events::{
    DeliveryError, DeliveryFailure, ErrorTopic, Event, EventBus, EventHandler, EventKey,
    StoreTopic, SubscriptionId, Topic, UNTYPED,
};
pub use messages::{RemotePaths, SinceCursor};
pub use transport::{Method, RequestOptions, Response, Transport};
