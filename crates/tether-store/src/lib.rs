//! # Tether Store
//!
//! Storage abstraction for the local side of a Tether replica.
//!
//! ## Overview
//!
//! The sync engine never owns local data. It reads records handed to it for
//! pushing and broadcasts incoming changes; whatever keeps records locally
//! implements [`LocalStore`]. [`MemoryStore`] is the in-memory
//! implementation used by tests and small embeddings.
//!
//! ## Key Types
//!
//! - [`LocalStore`] - The async trait for local CRUD
//! - [`MemoryStore`] - In-memory storage
//! - [`StoreError`] - Errors raised by store implementations

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::LocalStore;
