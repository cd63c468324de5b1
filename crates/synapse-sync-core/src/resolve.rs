//! Resolution of provenance entity paths to tree leaves.
//!
//! An entity path such as `rawdata/sample1.biom` is matched against every
//! root-to-leaf path of a (sub)tree. A tree path matches when *every* tag
//! along it appears among the entity's segments, with the structural tags
//! `project` and `subproject` always counted as present. The check is a set
//! containment, not a positional comparison: segment order does not matter
//! and the entity may name segments the tree lacks.
//!
//! # Limitation
//!
//! Containment is only precise when tags are distinct across the tree. A
//! tree reusing the same tag at different depths can make a path match a
//! leaf it was not written for. Such trees are outside the supported input;
//! the ambiguity check only catches the case where more than one leaf
//! matches.

use std::collections::HashSet;

use crate::error::{Result, SyncError};
use crate::provenance::ProvenanceEntity;
use crate::tree::{Subtree, PROJECT_TAG, SUBPROJECT_TAG};

/// Tags assumed present in every entity path.
pub const STRUCTURAL_TAGS: [&str; 2] = [PROJECT_TAG, SUBPROJECT_TAG];

/// Resolve an entity to the identifier of the single leaf it names.
pub fn resolve(entity: &ProvenanceEntity, view: &Subtree<'_>) -> Result<String> {
    resolve_path(&entity.local_part, view)
}

/// Resolve a slash-delimited path to the identifier of the single leaf it
/// names within `view`.
pub fn resolve_path(path: &str, view: &Subtree<'_>) -> Result<String> {
    let mut segments: HashSet<&str> = STRUCTURAL_TAGS.into_iter().collect();
    segments.extend(path.split('/'));

    let candidates: Vec<String> = view
        .filter_leaf_paths(|nodes| nodes.iter().all(|n| segments.contains(n.tag.as_str())))
        .into_iter()
        .filter_map(|nodes| nodes.last().map(|n| n.identifier.clone()))
        .collect();

    match candidates.len() {
        0 => Err(SyncError::UnresolvedPath {
            path: path.to_string(),
        }),
        1 => Ok(candidates.into_iter().next().unwrap_or_default()),
        _ => Err(SyncError::AmbiguousPath {
            path: path.to_string(),
            candidates,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteRecord;
    use crate::tree::{NodeRole, SourceTree, TreeNode};

    /// project → QMP(subproject) → {rawdata → {X, Z}, derived → {Y}, notes.txt}
    fn tree() -> SourceTree {
        let mut t = SourceTree::build_root(
            "proj",
            PROJECT_TAG,
            RemoteRecord::container("p", "proj"),
        );
        t.add_node(
            TreeNode::new(
                "QMP",
                SUBPROJECT_TAG,
                NodeRole::Subproject,
                RemoteRecord::container("q", "QMP"),
            ),
            "proj",
        )
        .unwrap();
        let add = |t: &mut SourceTree, record: RemoteRecord, parent: &str| {
            t.add_node(TreeNode::from_record(record), parent).unwrap();
        };
        add(&mut t, RemoteRecord::container("raw", "rawdata"), "QMP");
        add(&mut t, RemoteRecord::file("x", "X", 1), "raw");
        add(&mut t, RemoteRecord::file("z", "Z", 1), "raw");
        add(&mut t, RemoteRecord::container("der", "derived"), "QMP");
        add(&mut t, RemoteRecord::file("y", "Y", 1), "der");
        add(&mut t, RemoteRecord::file("n", "notes.txt", 1), "QMP");
        t
    }

    #[test]
    fn test_resolves_unique_leaf() {
        let t = tree();
        let sub = t.subtree("QMP").unwrap();
        assert_eq!(resolve_path("rawdata/X", &sub).unwrap(), "x");
        assert_eq!(resolve_path("derived/Y", &sub).unwrap(), "y");
        assert_eq!(resolve_path("notes.txt", &sub).unwrap(), "n");
    }

    #[test]
    fn test_resolves_against_full_tree() {
        let t = tree();
        assert_eq!(resolve_path("rawdata/Z", &t.view()).unwrap(), "z");
    }

    #[test]
    fn test_segment_order_is_ignored() {
        let t = tree();
        let sub = t.subtree("QMP").unwrap();
        assert_eq!(resolve_path("X/rawdata", &sub).unwrap(), "x");
    }

    #[test]
    fn test_extra_segments_are_tolerated() {
        let t = tree();
        let sub = t.subtree("QMP").unwrap();
        assert_eq!(resolve_path("analysis/rawdata/X", &sub).unwrap(), "x");
    }

    #[test]
    fn test_unresolved() {
        let t = tree();
        let sub = t.subtree("QMP").unwrap();
        let err = resolve_path("rawdata/W", &sub).unwrap_err();
        assert!(matches!(err, SyncError::UnresolvedPath { ref path } if path == "rawdata/W"));
        // the intermediate folder must be named
        assert!(resolve_path("X", &sub).is_err());
    }

    #[test]
    fn test_ambiguous() {
        let mut t = tree();
        t.add_node(TreeNode::from_record(RemoteRecord::file("x2", "X", 1)), "QMP")
            .unwrap();
        let sub = t.subtree("QMP").unwrap();
        match resolve_path("rawdata/X", &sub).unwrap_err() {
            SyncError::AmbiguousPath { candidates, .. } => {
                assert_eq!(candidates, vec!["x".to_string(), "x2".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deterministic() {
        let t = tree();
        let sub = t.subtree("QMP").unwrap();
        let first = resolve(&ProvenanceEntity::parse_qualified("rdata:derived/Y"), &sub).unwrap();
        let second = resolve(&ProvenanceEntity::parse_qualified("rdata:derived/Y"), &sub).unwrap();
        assert_eq!(first, second);
    }
}
