//! # Tether Testkit
//!
//! Testing utilities for Tether.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Sample records, change feed bodies and a scripted remote
//! - **Generators**: Proptest strategies for records, revisions and feed histories
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tether_core::DocumentTranslator;
//! use tether_testkit::generators::record;
//!
//! proptest! {
//!     #[test]
//!     fn round_trip(record in record()) {
//!         let translator = DocumentTranslator::default();
//!         let doc = translator.to_remote(&record).unwrap();
//!         prop_assert_eq!(translator.from_remote(&doc), record);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use tether_testkit::fixtures::{ChangeFeed, TestRemote};
//! use tether_sync::SyncConfig;
//!
//! let remote = TestRemote::new();
//! remote.feed(ChangeFeed::new(7).live("task/42", "1-aaa", serde_json::json!({"title": "x"})));
//! let engine = remote.engine(SyncConfig::new());
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{bulk_docs_ok, sample_task, ChangeFeed, TestRemote};
pub use generators::FeedStep;
