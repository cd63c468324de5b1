//! Error taxonomy for the sync engine.
//!
//! Structural and resolution failures get their own variants so callers can
//! match on them. Anything raised by a collaborator (listing, creating,
//! persisting) is carried through unchanged as [`SyncError::Collaborator`].

use thiserror::Error;

/// Errors produced by the tree, resolver, materializer, and binder.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A node with this identifier is already registered in the tree.
    #[error("duplicate node '{id}' (under parent '{parent}')")]
    DuplicateNode { id: String, parent: String },

    /// The source root does not hold exactly one container with this title.
    #[error("expected exactly one top-level container named '{name}', found {found}")]
    ProjectNotFound { name: String, found: usize },

    /// The identifier is not present in the tree (or the projection).
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// More than one leaf is consistent with the entity path.
    #[error("entity path '{path}' matches multiple leaves: {candidates:?}")]
    AmbiguousPath {
        path: String,
        candidates: Vec<String>,
    },

    /// No leaf is consistent with the entity path.
    #[error("entity path '{path}' does not match any leaf")]
    UnresolvedPath { path: String },

    /// The node has no destination handle yet.
    #[error("node '{0}' has not been materialized")]
    NotMaterialized(String),

    /// A translated ignore glob is not a valid regular expression.
    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Producing nodes reference each other through their activities.
    #[error("provenance cycle through node '{0}'")]
    ProvenanceCycle(String),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl SyncError {
    /// True for the two path-resolution failures.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            SyncError::AmbiguousPath { .. } | SyncError::UnresolvedPath { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
