//! # Synapse Sync Core
//!
//! Transport-free logic for synapse-sync: the source tree, ignore patterns,
//! destination materialization, provenance resolution, and provenance
//! binding.
//!
//! This crate performs no network or filesystem I/O. Every external system
//! is reached through the traits in [`traits`]; [`memory`] provides
//! in-memory implementations used by tests and dry runs.

pub mod binder;
pub mod error;
pub mod materialize;
pub mod memory;
pub mod models;
pub mod pattern;
pub mod project;
pub mod provenance;
pub mod resolve;
pub mod traits;
pub mod tree;

pub use error::{Result, SyncError};
