//! Collaborator interfaces for the sync engine.
//!
//! The engine never talks to a remote API directly. It is handed values
//! implementing these traits and calls them sequentially, in tree order.
//!
//! ```text
//! ┌──────────┐   list()    ┌────────────┐  create_*()  ┌───────────┐
//! │  Lister  │────────────▶│ SourceTree │─────────────▶│  Creator  │
//! └──────────┘             └─────┬──────┘              └───────────┘
//!                                │ bind
//!                                ▼
//! ┌──────────────────┐   ┌──────────────────┐  persist()  ┌───────────┐
//! │ ProvenanceSource │──▶│ ProvenanceBinder │────────────▶│ Persister │
//! └──────────────────┘   └────────┬─────────┘             └───────────┘
//!                                 │ fetch_activity()
//!                                 ▼
//!                          ┌───────────────┐
//!                          │ ActivityStore │
//!                          └───────────────┘
//! ```
//!
//! All fallible methods return [`anyhow::Result`]; the engine wraps those
//! failures in [`SyncError::Collaborator`](crate::error::SyncError).

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Activity, ActivityLookup, DestHandle, RemoteRecord};
use crate::provenance::ProvenanceRelation;

// ═══════════════════════════════════════════════════════════════════════
// Source side
// ═══════════════════════════════════════════════════════════════════════

/// Lists the remote source hierarchy one container at a time.
///
/// Implementations decide [`RecordKind`](crate::models::RecordKind) for
/// every record they return; the engine never inspects raw API fields.
#[async_trait]
pub trait Lister: Send + Sync {
    /// List the top-level records of the source (the "root" container).
    async fn list_roots(&self) -> Result<Vec<RemoteRecord>>;

    /// List the direct children of `container`, in the order the source
    /// returns them.
    async fn list(&self, container: &RemoteRecord) -> Result<Vec<RemoteRecord>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Destination side
// ═══════════════════════════════════════════════════════════════════════

/// Creates destination objects for materialized tree nodes.
#[async_trait]
pub trait Creator: Send + Sync {
    /// Create (and persist) a folder under `parent`.
    async fn create_folder(&self, name: &str, parent: &DestHandle) -> Result<DestHandle>;

    /// Build an unpersisted file handle under `parent`.
    ///
    /// Must not write anything to the destination: files are stored later,
    /// once any activity for them is known.
    fn create_file(
        &self,
        name: &str,
        parent: &DestHandle,
        external_url: Option<&str>,
    ) -> Result<DestHandle>;
}

/// Stores destination objects, optionally with an activity attached.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Persist `handle` and return the stored version of it.
    ///
    /// With `force_new_version = false`, storing an object that already
    /// exists updates it in place.
    async fn persist(
        &self,
        handle: &DestHandle,
        activity: Option<&Activity>,
        force_new_version: bool,
    ) -> Result<DestHandle>;
}

/// Looks up the activity an object was generated by.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Fetch the activity for `handle`. Unpersisted handles and objects
    /// without provenance yield [`ActivityLookup::NotFound`].
    async fn fetch_activity(&self, handle: &DestHandle) -> Result<ActivityLookup>;
}

// ═══════════════════════════════════════════════════════════════════════
// Provenance
// ═══════════════════════════════════════════════════════════════════════

/// Supplies typed provenance relations in declaration order.
pub trait ProvenanceSource {
    fn relations(&self) -> &[ProvenanceRelation];
}
