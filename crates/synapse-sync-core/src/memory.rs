//! In-memory collaborators for testing and dry runs.
//!
//! [`InMemorySource`] serves a fixed hierarchy through [`Lister`].
//! [`InMemoryDestination`] implements [`Creator`], [`Persister`], and
//! [`ActivityStore`] over `HashMap`s behind `std::sync::RwLock`, and keeps a
//! log of every call so ordering can be asserted afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Activity, ActivityLookup, DestHandle, RemoteRecord};
use crate::traits::{ActivityStore, Creator, Lister, Persister};

// ═══════════════════════════════════════════════════════════════════════
// Source
// ═══════════════════════════════════════════════════════════════════════

/// A fixed source hierarchy keyed by container identifier.
#[derive(Debug, Default)]
pub struct InMemorySource {
    roots: Vec<RemoteRecord>,
    children: HashMap<String, Vec<RemoteRecord>>,
    listed: RwLock<Vec<String>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roots(mut self, roots: Vec<RemoteRecord>) -> Self {
        self.roots = roots;
        self
    }

    pub fn with_children(mut self, parent_id: &str, children: Vec<RemoteRecord>) -> Self {
        self.children.insert(parent_id.to_string(), children);
        self
    }

    /// Container identifiers passed to [`Lister::list`], in call order.
    pub fn listed(&self) -> Vec<String> {
        self.listed.read().unwrap().clone()
    }
}

#[async_trait]
impl Lister for InMemorySource {
    async fn list_roots(&self) -> Result<Vec<RemoteRecord>> {
        Ok(self.roots.clone())
    }

    async fn list(&self, container: &RemoteRecord) -> Result<Vec<RemoteRecord>> {
        self.listed.write().unwrap().push(container.id.clone());
        Ok(self
            .children
            .get(&container.id)
            .cloned()
            .unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Destination
// ═══════════════════════════════════════════════════════════════════════

/// One recorded call against an [`InMemoryDestination`].
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationCall {
    CreateFolder {
        name: String,
        parent_id: String,
        id: String,
    },
    CreateFile {
        name: String,
        parent_id: String,
    },
    Persist {
        id: String,
        name: String,
        activity: Option<Activity>,
        force_new_version: bool,
    },
    FetchActivity {
        id: Option<String>,
        found: bool,
    },
}

/// A destination system held entirely in memory.
pub struct InMemoryDestination {
    next_id: AtomicU64,
    objects: RwLock<HashMap<String, DestHandle>>,
    activities: RwLock<HashMap<String, Activity>>,
    calls: RwLock<Vec<DestinationCall>>,
    fail_activity_fetch: bool,
}

impl InMemoryDestination {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            objects: RwLock::new(HashMap::new()),
            activities: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            fail_activity_fetch: false,
        }
    }

    /// Make every [`ActivityStore::fetch_activity`] call fail.
    pub fn with_failing_activity_fetch(mut self) -> Self {
        self.fail_activity_fetch = true;
        self
    }

    /// Store a top-level project and return its handle.
    pub fn ensure_project(&self, name: &str) -> DestHandle {
        let mut objects = self.objects.write().unwrap();
        if let Some(existing) = objects
            .values()
            .find(|h| h.parent_id.is_none() && h.name == name)
        {
            return existing.clone();
        }
        let mut project = DestHandle::project(name);
        project.id = Some(self.allocate_id());
        project.version = Some(1);
        objects.insert(project.id.clone().unwrap_or_default(), project.clone());
        project
    }

    pub fn calls(&self) -> Vec<DestinationCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn get(&self, id: &str) -> Option<DestHandle> {
        self.objects.read().unwrap().get(id).cloned()
    }

    /// Stored objects with no parent first, then by identifier.
    pub fn objects(&self) -> Vec<DestHandle> {
        let mut all: Vec<DestHandle> = self.objects.read().unwrap().values().cloned().collect();
        all.sort_by_key(|h| (h.parent_id.is_some(), id_number(h.id.as_deref())));
        all
    }

    /// The activity attached to the object `id`, if any.
    pub fn activity_for(&self, id: &str) -> Option<Activity> {
        self.activities.read().unwrap().get(id).cloned()
    }

    /// Number of persist calls made for the object `id`.
    pub fn persist_count(&self, id: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, DestinationCall::Persist { id: pid, .. } if pid == id))
            .count()
    }

    fn allocate_id(&self) -> String {
        format!("syn{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, call: DestinationCall) {
        self.calls.write().unwrap().push(call);
    }

    fn require_parent(&self, parent: &DestHandle) -> Result<String> {
        let parent_id = parent
            .id
            .clone()
            .ok_or_else(|| anyhow!("Parent '{}' has not been stored", parent.name))?;
        if !self.objects.read().unwrap().contains_key(&parent_id) {
            bail!("Parent '{}' ({}) does not exist", parent.name, parent_id);
        }
        Ok(parent_id)
    }
}

impl Default for InMemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

fn id_number(id: Option<&str>) -> u64 {
    id.and_then(|s| s.trim_start_matches("syn").parse().ok())
        .unwrap_or(u64::MAX)
}

#[async_trait]
impl Creator for InMemoryDestination {
    async fn create_folder(&self, name: &str, parent: &DestHandle) -> Result<DestHandle> {
        let parent_id = self.require_parent(parent)?;
        let mut folder = DestHandle::folder(name, parent_id.clone());
        let id = self.allocate_id();
        folder.id = Some(id.clone());
        folder.version = Some(1);
        self.objects
            .write()
            .unwrap()
            .insert(id.clone(), folder.clone());
        self.record(DestinationCall::CreateFolder {
            name: name.to_string(),
            parent_id,
            id,
        });
        Ok(folder)
    }

    fn create_file(
        &self,
        name: &str,
        parent: &DestHandle,
        external_url: Option<&str>,
    ) -> Result<DestHandle> {
        let parent_id = self.require_parent(parent)?;
        self.record(DestinationCall::CreateFile {
            name: name.to_string(),
            parent_id: parent_id.clone(),
        });
        Ok(DestHandle::file(
            name,
            parent_id,
            external_url.map(str::to_string),
        ))
    }
}

#[async_trait]
impl Persister for InMemoryDestination {
    async fn persist(
        &self,
        handle: &DestHandle,
        activity: Option<&Activity>,
        force_new_version: bool,
    ) -> Result<DestHandle> {
        if let Some(parent_id) = &handle.parent_id {
            if !self.objects.read().unwrap().contains_key(parent_id) {
                bail!("Parent {} of '{}' does not exist", parent_id, handle.name);
            }
        }

        let mut stored = handle.clone();
        match &stored.id {
            None => {
                stored.id = Some(self.allocate_id());
                stored.version = Some(1);
            }
            Some(_) if force_new_version => {
                stored.version = Some(stored.version.unwrap_or(0) + 1);
            }
            Some(_) => {}
        }
        let id = stored.id.clone().unwrap_or_default();

        if let Some(activity) = activity {
            let mut activity = activity.clone();
            let activity_id = activity
                .id
                .get_or_insert_with(|| Uuid::new_v4().to_string())
                .clone();
            stored.activity_id = Some(activity_id);
            self.activities
                .write()
                .unwrap()
                .insert(id.clone(), activity);
        }

        self.objects
            .write()
            .unwrap()
            .insert(id.clone(), stored.clone());
        self.record(DestinationCall::Persist {
            id,
            name: stored.name.clone(),
            activity: activity.cloned(),
            force_new_version,
        });
        Ok(stored)
    }
}

#[async_trait]
impl ActivityStore for InMemoryDestination {
    async fn fetch_activity(&self, handle: &DestHandle) -> Result<ActivityLookup> {
        if self.fail_activity_fetch {
            bail!("Activity service unavailable");
        }
        let found = handle.id.as_ref().and_then(|id| self.activity_for(id));
        self.record(DestinationCall::FetchActivity {
            id: handle.id.clone(),
            found: found.is_some(),
        });
        Ok(match found {
            Some(activity) => ActivityLookup::Found(activity),
            None => ActivityLookup::NotFound,
        })
    }
}
