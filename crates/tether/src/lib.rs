//! # Tether
//!
//! Offline-first records: a local store kept in sync with a remote document
//! database over HTTP.
//!
//! ## Overview
//!
//! - **Local first**: reads always hit the local store
//! - **Continuous sync**: a long-poll change feed brings remote changes in
//! - **Client revisions**: pushes carry revision chains built on the client
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tether::{SyncedStore, SyncConfig, SyncMode};
//! use tether::store::MemoryStore;
//! use tether::sync::transport::mock::MockTransport;
//! use tether::core::Record;
//!
//! async fn example() -> tether::Result<()> {
//!     let config = SyncConfig::new()
//!         .with_prefix("$public")
//!         .with_sync(SyncMode::Sync);
//!     let synced = SyncedStore::new(MemoryStore::new(), config, MockTransport::new());
//!
//!     // Connect and keep syncing in both directions
//!     synced.start_syncing().await?;
//!
//!     // Saved locally, then pushed with a fresh revision
//!     let saved = synced.save(Record::new("task", "42").with("title", "y")).await?;
//!     println!("pushed as {:?}", saved.rev);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `tether::core` - Records, documents, revisions, translation
//! - `tether::store` - Local store abstraction
//! - `tether::sync` - Sync engine, transport, events

pub mod error;
pub mod synced;

// Re-export component crates
pub use tether_core as core;
pub use tether_store as store;
pub use tether_sync as sync;

pub use error::{Result, TetherError};
pub use synced::{ChangeApplier, StoreReconciler, SyncedStore};

pub use tether_core::{ChangeKind, Record};
pub use tether_sync::{EventKey, SinceCursor, SyncConfig, SyncEngine, SyncMode};
