//! Project and subproject registration on top of a [`SourceTree`].
//!
//! A *project* is one top-level container of the source. Its *subprojects*
//! are selected child containers, each registered as a node tagged
//! [`SUBPROJECT_TAG`] and keyed by its title, then grown independently.
//! Subprojects carry no provenance across each other; each is bound against
//! its own provenance document.

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::models::RemoteRecord;
use crate::pattern::IgnoreMatcher;
use crate::traits::Lister;
use crate::tree::{NodeRole, SourceTree, TreeNode, PROJECT_TAG, SUBPROJECT_TAG};

/// What happened when a subproject was registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubprojectOutcome {
    /// Newly registered; `grown` nodes were added below it.
    Added { grown: usize },
    /// Already registered earlier; left untouched.
    AlreadyPresent,
    /// No child container of the project has this title.
    Missing,
}

/// A source project being assembled into a tree.
pub struct SourceProject<'l> {
    lister: &'l dyn Lister,
    record: RemoteRecord,
    tree: SourceTree,
    ignore: IgnoreMatcher,
    subprojects: Vec<String>,
}

impl<'l> SourceProject<'l> {
    /// Locate the top-level container titled `name` and root a tree on it.
    pub async fn open(lister: &'l dyn Lister, name: &str) -> Result<Self> {
        let roots = lister
            .list_roots()
            .await
            .context("Failed to list top-level source containers")?;
        let mut matching: Vec<RemoteRecord> =
            roots.into_iter().filter(|r| r.title == name).collect();
        if matching.len() != 1 {
            return Err(SyncError::ProjectNotFound {
                name: name.to_string(),
                found: matching.len(),
            });
        }
        let record = matching.remove(0);
        let tree = SourceTree::build_root(name, PROJECT_TAG, record.clone());
        info!(project = %name, id = %record.id, "opened source project");

        Ok(Self {
            lister,
            record,
            tree,
            ignore: IgnoreMatcher::default(),
            subprojects: Vec::new(),
        })
    }

    /// Replace the ignore set used by subsequent growth.
    pub fn set_ignore<I, S>(&mut self, globs: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore = IgnoreMatcher::new(globs)?;
        debug!(pattern = %self.ignore.as_str(), "ignore pattern set");
        Ok(())
    }

    pub fn ignore(&self) -> &IgnoreMatcher {
        &self.ignore
    }

    /// Register the child containers titled `names` as subprojects.
    ///
    /// Outcomes are returned in the order of `names`. A subproject that is
    /// already registered is neither re-added nor grown again.
    pub async fn add_subprojects<S: AsRef<str>>(
        &mut self,
        names: &[S],
        grow: bool,
    ) -> Result<Vec<(String, SubprojectOutcome)>> {
        let children = self
            .lister
            .list(&self.record)
            .await
            .with_context(|| format!("Failed to list children of '{}'", self.record.title))?;

        let mut outcomes = Vec::with_capacity(names.len());
        for name in names.iter().map(AsRef::as_ref) {
            let Some(record) = children
                .iter()
                .find(|c| c.title == name && !c.is_file())
                .cloned()
            else {
                warn!(subproject = %name, "subproject not found in project");
                outcomes.push((name.to_string(), SubprojectOutcome::Missing));
                continue;
            };

            let node = TreeNode::new(name, SUBPROJECT_TAG, NodeRole::Subproject, record);
            let root = self.tree.root().to_string();
            let outcome = match self.tree.add_node(node, &root) {
                Ok(()) => {
                    self.subprojects.push(name.to_string());
                    let grown = if grow {
                        self.tree.grow(name, self.lister, &self.ignore).await?
                    } else {
                        0
                    };
                    info!(subproject = %name, grown, "registered subproject");
                    SubprojectOutcome::Added { grown }
                }
                Err(SyncError::DuplicateNode { .. }) => {
                    debug!(subproject = %name, "subproject already registered");
                    SubprojectOutcome::AlreadyPresent
                }
                Err(e) => return Err(e),
            };
            outcomes.push((name.to_string(), outcome));
        }
        Ok(outcomes)
    }

    /// Grow a registered subproject that was added with `grow = false`.
    pub async fn grow_subproject(&mut self, name: &str) -> Result<usize> {
        if !self.subprojects.iter().any(|s| s == name) {
            return Err(SyncError::UnknownNode(name.to_string()));
        }
        self.tree.grow(name, self.lister, &self.ignore).await
    }

    /// Grow the whole project from its root, without subproject structure.
    pub async fn grow_all(&mut self) -> Result<usize> {
        let root = self.tree.root().to_string();
        self.tree.grow(&root, self.lister, &self.ignore).await
    }

    pub fn subprojects(&self) -> &[String] {
        &self.subprojects
    }

    pub fn record(&self) -> &RemoteRecord {
        &self.record
    }

    pub fn tree(&self) -> &SourceTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut SourceTree {
        &mut self.tree
    }

    pub fn into_tree(self) -> SourceTree {
        self.tree
    }
}
