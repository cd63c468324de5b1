//! The source tree: an arena of nodes keyed by remote identifier.
//!
//! Parent/child links are stored as identifiers, so the full tree and any
//! [`Subtree`] projection read the same nodes. A destination handle set
//! through the tree is visible through every projection taken afterwards.
//!
//! Children keep the order the [`Lister`] returned them in. Traversals are
//! pre-order over that order.

use std::collections::HashMap;

use anyhow::Context;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::models::{DestHandle, RemoteRecord};
use crate::pattern::IgnoreMatcher;
use crate::traits::Lister;

/// Tag carried by the project root node.
pub const PROJECT_TAG: &str = "project";
/// Tag carried by every registered subproject node.
pub const SUBPROJECT_TAG: &str = "subproject";

/// Structural role of a node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Project,
    Subproject,
    Content,
}

/// One source object.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub identifier: String,
    pub tag: String,
    pub role: NodeRole,
    /// The remote listing record this node was built from.
    pub record: RemoteRecord,
    /// Set once, when the node is materialized.
    pub destination: Option<DestHandle>,
    parent: Option<String>,
    children: Vec<String>,
}

impl TreeNode {
    pub fn new(
        identifier: impl Into<String>,
        tag: impl Into<String>,
        role: NodeRole,
        record: RemoteRecord,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            tag: tag.into(),
            role,
            record,
            destination: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// A content node keyed and labeled by its record.
    pub fn from_record(record: RemoteRecord) -> Self {
        Self::new(record.id.clone(), record.title.clone(), NodeRole::Content, record)
    }

    /// True for file nodes. Containers are never leaves, even when empty.
    pub fn is_leaf(&self) -> bool {
        self.record.is_file()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// True once the destination system has stored this node.
    pub fn is_persisted(&self) -> bool {
        self.destination
            .as_ref()
            .map(DestHandle::is_persisted)
            .unwrap_or(false)
    }
}

/// A rooted, labeled tree of source objects.
#[derive(Debug, Clone)]
pub struct SourceTree {
    nodes: HashMap<String, TreeNode>,
    root: String,
}

impl SourceTree {
    /// Create a tree holding only its root.
    pub fn build_root(
        identifier: impl Into<String>,
        tag: impl Into<String>,
        record: RemoteRecord,
    ) -> Self {
        let root = TreeNode::new(identifier, tag, NodeRole::Project, record);
        let root_id = root.identifier.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            nodes,
            root: root_id,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn node(&self, id: &str) -> Result<&TreeNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| SyncError::UnknownNode(id.to_string()))
    }

    pub fn node_mut(&mut self, id: &str) -> Result<&mut TreeNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SyncError::UnknownNode(id.to_string()))
    }

    /// Attach `node` as the last child of `parent`.
    ///
    /// Fails with [`SyncError::DuplicateNode`] if the identifier is already
    /// registered anywhere in the tree.
    pub fn add_node(&mut self, mut node: TreeNode, parent: &str) -> Result<()> {
        if self.nodes.contains_key(&node.identifier) {
            return Err(SyncError::DuplicateNode {
                id: node.identifier,
                parent: parent.to_string(),
            });
        }
        let parent_node = self.node_mut(parent)?;
        parent_node.children.push(node.identifier.clone());
        node.parent = Some(parent.to_string());
        self.nodes.insert(node.identifier.clone(), node);
        Ok(())
    }

    /// Grow the tree below `id` by listing the source depth-first.
    ///
    /// Children whose title matches `ignore` are skipped along with
    /// everything below them. Returns the number of nodes added.
    pub async fn grow(
        &mut self,
        id: &str,
        lister: &dyn Lister,
        ignore: &IgnoreMatcher,
    ) -> Result<usize> {
        let mut added = 0;
        let mut stack = vec![id.to_string()];

        while let Some(current) = stack.pop() {
            let record = self.node(&current)?.record.clone();
            if record.is_file() {
                continue;
            }

            let listed = lister
                .list(&record)
                .await
                .with_context(|| format!("Failed to list children of '{}'", record.title))?;

            let mut pending = Vec::with_capacity(listed.len());
            for child in listed {
                if ignore.matches(&child.title) {
                    debug!(name = %child.title, parent = %current, "ignored");
                    continue;
                }
                let node = TreeNode::from_record(child);
                let child_id = node.identifier.clone();
                self.add_node(node, &current)?;
                added += 1;
                pending.push(child_id);
            }
            stack.extend(pending.into_iter().rev());
        }

        debug!(node = %id, added, "grew subtree");
        Ok(added)
    }

    /// Bind a destination handle to a node.
    pub fn set_destination(&mut self, id: &str, handle: DestHandle) -> Result<()> {
        self.node_mut(id)?.destination = Some(handle);
        Ok(())
    }

    /// A projection of the whole tree.
    pub fn view(&self) -> Subtree<'_> {
        Subtree {
            tree: self,
            root: self.root.clone(),
        }
    }

    /// A live projection rooted at `id`.
    pub fn subtree(&self, id: &str) -> Result<Subtree<'_>> {
        self.node(id)?;
        Ok(Subtree {
            tree: self,
            root: id.to_string(),
        })
    }

    pub fn paths_to_leaves(&self) -> Vec<Vec<String>> {
        self.view().paths_to_leaves()
    }

    pub fn filter_leaf_paths<F>(&self, predicate: F) -> Vec<Vec<&TreeNode>>
    where
        F: Fn(&[&TreeNode]) -> bool,
    {
        self.view().filter_leaf_paths(predicate)
    }

    /// File nodes in pre-order.
    pub fn leaves(&self) -> Vec<&TreeNode> {
        self.view().leaves()
    }

    /// Render in the familiar `tree` layout, optionally with identifiers.
    pub fn render(&self, show_ids: bool) -> String {
        let mut out = String::new();
        let root = &self.nodes[&self.root];
        out.push_str(&label(root, show_ids));
        out.push('\n');
        self.render_children(&self.root, "", show_ids, &mut out);
        out
    }

    fn render_children(&self, id: &str, prefix: &str, show_ids: bool, out: &mut String) {
        let children = &self.nodes[id].children;
        for (i, child_id) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            let child = &self.nodes[child_id];
            out.push_str(prefix);
            out.push_str(if last { "└── " } else { "├── " });
            out.push_str(&label(child, show_ids));
            out.push('\n');
            let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
            self.render_children(child_id, &next, show_ids, out);
        }
    }
}

fn label(node: &TreeNode, show_ids: bool) -> String {
    if show_ids {
        format!("{} [{}]", node.tag, node.identifier)
    } else {
        node.tag.clone()
    }
}

/// A read-only projection of a [`SourceTree`] rooted at one node.
#[derive(Debug, Clone)]
pub struct Subtree<'a> {
    tree: &'a SourceTree,
    root: String,
}

impl<'a> Subtree<'a> {
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn tree(&self) -> &'a SourceTree {
        self.tree
    }

    /// True if `id` is the projection root or one of its descendants.
    pub fn contains(&self, id: &str) -> bool {
        let mut cursor = self.tree.get(id);
        while let Some(node) = cursor {
            if node.identifier == self.root {
                return true;
            }
            cursor = node.parent().and_then(|p| self.tree.get(p));
        }
        false
    }

    /// Look up a node that is reachable from the projection root.
    pub fn node(&self, id: &str) -> Result<&'a TreeNode> {
        if !self.contains(id) {
            return Err(SyncError::UnknownNode(id.to_string()));
        }
        let tree: &'a SourceTree = self.tree;
        tree.node(id)
    }

    /// Identifiers in pre-order, starting at the projection root.
    pub fn pre_order(&self) -> Vec<&'a str> {
        let tree: &'a SourceTree = self.tree;
        let mut order = Vec::new();
        let mut stack = vec![tree.nodes[self.root.as_str()].identifier.as_str()];
        while let Some(id) = stack.pop() {
            let node = &tree.nodes[id];
            order.push(node.identifier.as_str());
            stack.extend(node.children.iter().rev().map(String::as_str));
        }
        order
    }

    /// File nodes in pre-order.
    pub fn leaves(&self) -> Vec<&'a TreeNode> {
        let tree: &'a SourceTree = self.tree;
        self.pre_order()
            .into_iter()
            .map(|id| &tree.nodes[id])
            .filter(|n| n.is_leaf())
            .collect()
    }

    /// Every path from the projection root to a leaf, as identifiers.
    pub fn paths_to_leaves(&self) -> Vec<Vec<String>> {
        self.node_paths()
            .into_iter()
            .map(|path| path.iter().map(|n| n.identifier.clone()).collect())
            .collect()
    }

    /// Root-to-leaf paths whose full node list satisfies `predicate`.
    pub fn filter_leaf_paths<F>(&self, predicate: F) -> Vec<Vec<&'a TreeNode>>
    where
        F: Fn(&[&TreeNode]) -> bool,
    {
        self.node_paths()
            .into_iter()
            .filter(|path| predicate(path.as_slice()))
            .collect()
    }

    fn node_paths(&self) -> Vec<Vec<&'a TreeNode>> {
        let tree: &'a SourceTree = self.tree;
        self.leaves()
            .into_iter()
            .map(|leaf| {
                let mut path = vec![leaf];
                let mut cursor = leaf;
                while cursor.identifier != self.root {
                    match cursor.parent().and_then(|p| tree.get(p)) {
                        Some(parent) => {
                            path.push(parent);
                            cursor = parent;
                        }
                        None => break,
                    }
                }
                path.reverse();
                path
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySource;

    fn root_record() -> RemoteRecord {
        RemoteRecord::container("root-id", "root")
    }

    /// root → {A(file), B(folder) → {C(file)}}
    fn sample_source() -> InMemorySource {
        InMemorySource::new()
            .with_children(
                "root-id",
                vec![
                    RemoteRecord::file("a", "A", 10),
                    RemoteRecord::container("b", "B"),
                ],
            )
            .with_children("b", vec![RemoteRecord::file("c", "C", 20)])
    }

    async fn grown(ignore: &IgnoreMatcher) -> SourceTree {
        let source = sample_source();
        let mut tree = SourceTree::build_root("root-id", PROJECT_TAG, root_record());
        tree.grow("root-id", &source, ignore).await.unwrap();
        tree
    }

    #[tokio::test]
    async fn test_grow_builds_structure_in_listing_order() {
        let tree = grown(&IgnoreMatcher::default()).await;
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.node("root-id").unwrap().children(), ["a", "b"]);
        assert_eq!(tree.node("b").unwrap().children(), ["c"]);
        assert_eq!(tree.node("c").unwrap().parent(), Some("b"));
        assert!(tree.node("a").unwrap().is_leaf());
        assert!(!tree.node("b").unwrap().is_leaf());
    }

    #[tokio::test]
    async fn test_grow_skips_ignored_names() {
        let ignore = IgnoreMatcher::new(["C"]).unwrap();
        let tree = grown(&ignore).await;
        assert!(!tree.contains("c"));
        assert_eq!(tree.len(), 3);
    }

    #[tokio::test]
    async fn test_ignored_container_prunes_descendants() {
        let source = sample_source();
        let ignore = IgnoreMatcher::new(["B"]).unwrap();
        let mut tree = SourceTree::build_root("root-id", PROJECT_TAG, root_record());
        tree.grow("root-id", &source, &ignore).await.unwrap();
        assert!(!tree.contains("b"));
        assert!(!tree.contains("c"));
        assert_eq!(source.listed(), vec!["root-id".to_string()]);
    }

    #[tokio::test]
    async fn test_paths_to_leaves_cover_all_files() {
        let tree = grown(&IgnoreMatcher::default()).await;
        let paths = tree.paths_to_leaves();
        assert_eq!(
            paths,
            vec![
                vec!["root-id".to_string(), "a".to_string()],
                vec!["root-id".to_string(), "b".to_string(), "c".to_string()],
            ]
        );
        let file_count = tree.nodes.values().filter(|n| n.is_leaf()).count();
        assert_eq!(paths.len(), file_count);
        for path in &paths {
            assert_eq!(path[0], tree.root());
            assert!(tree.node(path.last().unwrap()).unwrap().is_leaf());
        }
    }

    #[tokio::test]
    async fn test_empty_container_is_not_a_leaf() {
        let source = InMemorySource::new()
            .with_children("root-id", vec![RemoteRecord::container("empty", "empty")]);
        let mut tree = SourceTree::build_root("root-id", PROJECT_TAG, root_record());
        tree.grow("root-id", &source, &IgnoreMatcher::default())
            .await
            .unwrap();
        assert!(tree.paths_to_leaves().is_empty());
        assert!(tree.leaves().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_identifier_is_rejected() {
        let mut tree = grown(&IgnoreMatcher::default()).await;
        let err = tree
            .add_node(TreeNode::from_record(RemoteRecord::file("c", "C", 1)), "root-id")
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateNode { ref id, .. } if id == "c"));
        assert_eq!(tree.node("root-id").unwrap().children().len(), 2);
    }

    #[tokio::test]
    async fn test_subtree_is_projection() {
        let mut tree = grown(&IgnoreMatcher::default()).await;
        {
            let sub = tree.subtree("b").unwrap();
            assert!(sub.contains("c"));
            assert!(!sub.contains("a"));
            assert_eq!(sub.paths_to_leaves(), vec![vec!["b".to_string(), "c".to_string()]]);
            assert!(sub.node("a").is_err());
        }
        tree.set_destination("c", DestHandle::file("C", "syn2", None))
            .unwrap();
        let sub = tree.subtree("b").unwrap();
        assert!(sub.node("c").unwrap().destination.is_some());
    }

    #[tokio::test]
    async fn test_filter_leaf_paths_applies_predicate() {
        let tree = grown(&IgnoreMatcher::default()).await;
        let paths = tree.filter_leaf_paths(|nodes| nodes.iter().any(|n| n.tag == "B"));
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].last().unwrap().identifier, "c");
    }

    #[tokio::test]
    async fn test_render_with_ids() {
        let tree = grown(&IgnoreMatcher::default()).await;
        let rendered = tree.render(true);
        assert_eq!(
            rendered,
            "project [root-id]\n├── A [a]\n└── B [b]\n    └── C [c]\n"
        );
        assert!(tree.render(false).starts_with("project\n"));
    }

    #[test]
    fn test_unknown_subtree_root() {
        let tree = SourceTree::build_root("root-id", PROJECT_TAG, root_record());
        assert!(matches!(
            tree.subtree("nope"),
            Err(SyncError::UnknownNode(_))
        ));
    }
}
