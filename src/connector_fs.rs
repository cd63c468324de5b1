//! Local-directory source.
//!
//! Treats a directory on disk as the source drive: its immediate
//! subdirectories are the candidate projects. Useful for mirroring a synced
//! Drive folder and for exercising the pipeline without network access.
//!
//! Record identifiers are paths relative to the configured root, so they are
//! unique across the whole tree. Files carry a `file://` download reference.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use synapse_sync_core::models::RemoteRecord;
use synapse_sync_core::traits::Lister;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::FilesystemSourceConfig;

pub struct FilesystemLister {
    root: PathBuf,
}

impl FilesystemLister {
    pub fn new(config: &FilesystemSourceConfig) -> Result<Self> {
        let root = &config.root;
        if !root.is_dir() {
            bail!("Filesystem source root does not exist: {}", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", root.display()))?;
        Ok(Self { root })
    }

    fn list_dir(&self, relative: &Path) -> Result<Vec<RemoteRecord>> {
        let dir = self.root.join(relative);
        let mut records = Vec::new();

        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
            let path = entry.path();
            let rel = path.strip_prefix(&self.root).unwrap_or(path);
            let id = rel.to_string_lossy().to_string();
            let title = entry.file_name().to_string_lossy().to_string();

            let record = if entry.file_type().is_dir() {
                RemoteRecord::container(id, title)
            } else if entry.file_type().is_file() {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                RemoteRecord::file(id, title, size)
                    .with_download_url(format!("file://{}", path.display()))
            } else {
                debug!(path = %path.display(), "skipping non-regular entry");
                continue;
            };
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl Lister for FilesystemLister {
    async fn list_roots(&self) -> Result<Vec<RemoteRecord>> {
        self.list_dir(Path::new(""))
    }

    async fn list(&self, container: &RemoteRecord) -> Result<Vec<RemoteRecord>> {
        debug!(container = %container.id, "listing directory");
        self.list_dir(Path::new(&container.id))
    }
}
