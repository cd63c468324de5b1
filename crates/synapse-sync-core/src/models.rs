//! Core data models shared by the engine and its collaborators.
//!
//! [`RemoteRecord`]s come out of a [`Lister`](crate::traits::Lister) and
//! describe the source side. [`DestHandle`]s come out of a
//! [`Creator`](crate::traits::Creator) or [`Persister`](crate::traits::Persister)
//! and describe the destination side. [`Activity`] is the derivation record
//! attached to a destination file when it is persisted.

use serde::{Deserialize, Serialize};

/// Whether a remote record is a file or a container of other records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    File,
    Container,
}

/// One object returned by a remote listing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Stable remote identifier (Drive file id, relative path, ...).
    pub id: String,
    /// Display name.
    pub title: String,
    pub kind: RecordKind,
    /// Size in bytes, when the source reports one.
    #[serde(default)]
    pub size: Option<u64>,
    /// Reference the destination can use to fetch the content.
    #[serde(default)]
    pub download_url: Option<String>,
}

impl RemoteRecord {
    pub fn container(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: RecordKind::Container,
            size: None,
            download_url: None,
        }
    }

    pub fn file(id: impl Into<String>, title: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: RecordKind::File,
            size: Some(size),
            download_url: None,
        }
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == RecordKind::File
    }
}

/// What kind of destination object a handle refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DestKind {
    Project,
    Folder,
    File { external_url: Option<String> },
}

/// A destination-side object, persisted or not.
///
/// `id` is assigned by the destination system on first persist; a handle
/// without one exists only in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestHandle {
    pub id: Option<String>,
    pub name: String,
    pub parent_id: Option<String>,
    pub kind: DestKind,
    #[serde(default)]
    pub version: Option<u64>,
    /// Identifier of the activity this object was generated by.
    #[serde(default)]
    pub activity_id: Option<String>,
}

impl DestHandle {
    pub fn project(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            parent_id: None,
            kind: DestKind::Project,
            version: None,
            activity_id: None,
        }
    }

    pub fn folder(name: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            parent_id: Some(parent_id.into()),
            kind: DestKind::Folder,
            version: None,
            activity_id: None,
        }
    }

    pub fn file(
        name: impl Into<String>,
        parent_id: impl Into<String>,
        external_url: Option<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            parent_id: Some(parent_id.into()),
            kind: DestKind::File { external_url },
            version: None,
            activity_id: None,
        }
    }

    /// True once the destination system has assigned an identity.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, DestKind::File { .. })
    }
}

/// A reference from an activity to a destination object it used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedEntity {
    pub target_id: String,
    #[serde(default)]
    pub target_version: Option<u64>,
    /// Set for generation relations: the target was executed to produce
    /// the owner of the activity.
    #[serde(default)]
    pub was_executed: bool,
}

/// A derivation record: what an artifact used and/or was generated by.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub used: Vec<UsedEntity>,
}

impl Activity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `target` was used. `target` must already be persisted.
    pub fn used(&mut self, target_id: impl Into<String>, version: Option<u64>, was_executed: bool) {
        self.used.push(UsedEntity {
            target_id: target_id.into(),
            target_version: version,
            was_executed,
        });
    }

    /// Set the display name only if none is set yet.
    pub fn name_or(&mut self, default: &str) {
        if self.name.is_none() {
            self.name = Some(default.to_string());
        }
    }
}

/// Result of asking the destination for an object's existing activity.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityLookup {
    Found(Activity),
    NotFound,
}

impl ActivityLookup {
    pub fn into_activity(self) -> Activity {
        match self {
            ActivityLookup::Found(activity) => activity,
            ActivityLookup::NotFound => Activity::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_or_keeps_first_name() {
        let mut activity = Activity::new();
        activity.name_or("used");
        activity.name_or("generated");
        assert_eq!(activity.name.as_deref(), Some("used"));
    }

    #[test]
    fn not_found_lookup_is_empty_activity() {
        let activity = ActivityLookup::NotFound.into_activity();
        assert!(activity.name.is_none());
        assert!(activity.used.is_empty());
    }

    #[test]
    fn new_file_handle_is_unpersisted() {
        let handle = DestHandle::file("a.txt", "syn1", Some("https://x/a".into()));
        assert!(!handle.is_persisted());
        assert!(handle.is_file());
    }
}
