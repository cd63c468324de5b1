//! Destination materialization.
//!
//! Walks a [`SourceTree`] in pre-order and binds a destination handle to
//! every node. Folders are created (and stored) immediately. Files only get
//! an unpersisted handle here; they are stored by the
//! [`binder`](crate::binder) once their activity, if any, is known.

use anyhow::Context;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::models::DestHandle;
use crate::traits::Creator;
use crate::tree::{NodeRole, SourceTree, TreeNode};

/// Counts from one materialization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    pub folders: usize,
    pub files: usize,
    /// Nodes that already had a handle and were left alone.
    pub skipped: usize,
}

/// Destination folder name for a container node.
///
/// Subproject nodes are tagged structurally, so their folder takes the
/// identifier (the subproject's title) instead.
pub fn folder_name(node: &TreeNode) -> &str {
    match node.role {
        NodeRole::Subproject => &node.identifier,
        _ => &node.tag,
    }
}

/// Bind `project` to the root and create handles for every other node.
///
/// Nodes that already carry a handle are skipped, so a second pass over a
/// grown tree only materializes what was added since.
pub async fn materialize(
    tree: &mut SourceTree,
    project: DestHandle,
    creator: &dyn Creator,
) -> Result<MaterializeStats> {
    let mut stats = MaterializeStats::default();
    let root = tree.root().to_string();

    if tree.node(&root)?.destination.is_none() {
        tree.set_destination(&root, project)?;
    } else {
        stats.skipped += 1;
    }

    let order: Vec<String> = tree
        .view()
        .pre_order()
        .into_iter()
        .skip(1)
        .map(str::to_string)
        .collect();

    for id in order {
        let node = tree.node(&id)?;
        if node.destination.is_some() {
            stats.skipped += 1;
            continue;
        }

        let parent_id = node
            .parent()
            .ok_or_else(|| SyncError::UnknownNode(id.clone()))?;
        let parent = tree
            .node(parent_id)?
            .destination
            .clone()
            .ok_or_else(|| SyncError::NotMaterialized(parent_id.to_string()))?;

        let handle = if node.is_leaf() {
            let handle = creator
                .create_file(&node.tag, &parent, node.record.download_url.as_deref())
                .with_context(|| format!("Failed to create file '{}'", node.tag))?;
            stats.files += 1;
            handle
        } else {
            let name = folder_name(node).to_string();
            let handle = creator
                .create_folder(&name, &parent)
                .await
                .with_context(|| format!("Failed to create folder '{}'", name))?;
            stats.folders += 1;
            handle
        };

        debug!(node = %id, name = %handle.name, id = ?handle.id, "materialized");
        tree.set_destination(&id, handle)?;
    }

    info!(
        folders = stats.folders,
        files = stats.files,
        skipped = stats.skipped,
        "materialized destination tree"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DestinationCall, InMemoryDestination, InMemorySource};
    use crate::models::RemoteRecord;
    use crate::pattern::IgnoreMatcher;
    use crate::tree::{PROJECT_TAG, SUBPROJECT_TAG};

    async fn sample_tree() -> SourceTree {
        let source = InMemorySource::new()
            .with_children(
                "root-id",
                vec![
                    RemoteRecord::file("a", "A", 1).with_download_url("https://src/a"),
                    RemoteRecord::container("b", "B"),
                ],
            )
            .with_children("b", vec![RemoteRecord::file("c", "C", 2)]);
        let mut tree = SourceTree::build_root(
            "root-id",
            PROJECT_TAG,
            RemoteRecord::container("root-id", "root"),
        );
        tree.grow("root-id", &source, &IgnoreMatcher::default())
            .await
            .unwrap();
        tree
    }

    #[tokio::test]
    async fn test_materialize_sample_tree() {
        let mut tree = sample_tree().await;
        let dest = InMemoryDestination::new();
        let project = dest.ensure_project("proj");

        let stats = materialize(&mut tree, project.clone(), &dest).await.unwrap();
        assert_eq!(stats, MaterializeStats { folders: 1, files: 2, skipped: 0 });

        assert_eq!(tree.node("root-id").unwrap().destination, Some(project.clone()));
        let b = tree.node("b").unwrap().destination.clone().unwrap();
        assert!(b.is_persisted());
        assert_eq!(b.parent_id, project.id);

        let a = tree.node("a").unwrap().destination.clone().unwrap();
        let c = tree.node("c").unwrap().destination.clone().unwrap();
        assert!(!a.is_persisted());
        assert!(!c.is_persisted());
        assert_eq!(c.parent_id, b.id);
        assert_eq!(
            a.kind,
            crate::models::DestKind::File {
                external_url: Some("https://src/a".into())
            }
        );

        // project + folder B; files are not stored yet
        assert_eq!(dest.objects().len(), 2);
    }

    #[tokio::test]
    async fn test_parent_created_before_child() {
        let mut tree = sample_tree().await;
        let dest = InMemoryDestination::new();
        let project = dest.ensure_project("proj");
        materialize(&mut tree, project, &dest).await.unwrap();

        let calls = dest.calls();
        let folder_b = calls
            .iter()
            .position(|c| matches!(c, DestinationCall::CreateFolder { name, .. } if name == "B"))
            .unwrap();
        let file_c = calls
            .iter()
            .position(|c| matches!(c, DestinationCall::CreateFile { name, .. } if name == "C"))
            .unwrap();
        assert!(folder_b < file_c);
        let b_id = tree.node("b").unwrap().destination.clone().unwrap().id.unwrap();
        assert!(matches!(
            &calls[file_c],
            DestinationCall::CreateFile { parent_id, .. } if *parent_id == b_id
        ));
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let mut tree = sample_tree().await;
        let dest = InMemoryDestination::new();
        let project = dest.ensure_project("proj");
        materialize(&mut tree, project.clone(), &dest).await.unwrap();
        let calls = dest.calls().len();

        let stats = materialize(&mut tree, project, &dest).await.unwrap();
        assert_eq!(stats.skipped, 4);
        assert_eq!(dest.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_subproject_folder_named_by_identifier() {
        let mut tree = SourceTree::build_root(
            "proj",
            PROJECT_TAG,
            RemoteRecord::container("p", "proj"),
        );
        tree.add_node(
            TreeNode::new(
                "QMP",
                SUBPROJECT_TAG,
                NodeRole::Subproject,
                RemoteRecord::container("q", "QMP"),
            ),
            "proj",
        )
        .unwrap();
        let dest = InMemoryDestination::new();
        let project = dest.ensure_project("proj");
        materialize(&mut tree, project, &dest).await.unwrap();
        assert_eq!(tree.node("QMP").unwrap().destination.as_ref().unwrap().name, "QMP");
    }
}
