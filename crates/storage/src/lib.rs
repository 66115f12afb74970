//! Storage backends for Batchwork
//!
//! This crate provides store writers usable without an external service:
//! - MemoryStore: Keyed in-memory table with add/update/delete semantics of
//!   a partitioned table service, plus fault injection for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::MemoryStore;
