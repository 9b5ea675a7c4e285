//! # Tether Core
//!
//! Pure primitives for Tether: local records, remote documents, revision
//! chains and change classification.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! deterministic computation over documents, apart from revision id
//! generation which draws from the thread RNG.
//!
//! ## Key Types
//!
//! - [`Record`] - A record as the local store sees it
//! - [`RemoteDocument`] - The wire shape understood by the remote database
//! - [`RevisionId`] - Locally generated revision token
//! - [`DocumentTranslator`] - Converts between the two shapes
//! - [`KnownObjects`] - Decides whether an incoming change is an add, update or remove
//!
//! ## Document ids
//!
//! Remote ids have the shape `[prefix/]type/id`. The translator owns the
//! prefix and is the only place that builds or splits remote ids.

pub mod classify;
pub mod document;
pub mod error;
pub mod record;
pub mod revision;
pub mod translate;

pub use classify::{ChangeKind, KnownObjects};
pub use document::{RemoteDocument, Revisions, RESERVED_ATTRIBUTES};
pub use error::{CoreError, Result};
pub use record::Record;
pub use revision::{parse_rev, stamp, stamp_with, RevisionId};
pub use translate::DocumentTranslator;
