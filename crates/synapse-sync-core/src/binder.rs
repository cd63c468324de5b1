//! Provenance binding and final file storage.
//!
//! Binding runs in two phases over a materialized tree:
//!
//! 1. **Accumulate.** [`ProvenanceBinder::bind`] walks a document's relations
//!    in declaration order. Both endpoints are resolved to leaves of the
//!    document's subtree, and the producing (`from`) node gets one activity
//!    accumulator for the whole pass. The accumulator starts from whatever
//!    activity the destination already holds and is annotated per relation.
//! 2. **Store.** [`ProvenanceBinder::finish`] persists every producing node
//!    exactly once with its complete activity, after the nodes it references,
//!    then stores all remaining unpersisted leaves plainly.
//!
//! Only usage and generation relations make their `to` node a dependency of
//! the producer. For any other kind the `to` node is left to the final sweep,
//! so it may be written after its producer; the stored state is the same.
//!
//! Producers that reference each other, directly or through a relation whose
//! `from` and `to` are the same node, have no valid storage order and fail
//! with [`SyncError::ProvenanceCycle`] before anything is stored.
//!
//! Resolution failures abort the pass and surface to the caller. A failed
//! activity lookup counts as "no prior activity".

use std::collections::HashMap;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};
use crate::models::{Activity, ActivityLookup, DestHandle};
use crate::provenance::{ProvenanceRelation, RelationKind};
use crate::resolve::resolve;
use crate::traits::{ActivityStore, Persister, ProvenanceSource};
use crate::tree::{SourceTree, Subtree};

const NAME_USED: &str = "used";
const NAME_GENERATED: &str = "generated";
const NAME_NOTYPE: &str = "notype";

/// Counts from one binding pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindStats {
    /// Relations resolved and applied.
    pub relations: usize,
    /// Producing nodes stored with an activity.
    pub activities: usize,
    /// Referenced nodes stored ahead of their producers.
    pub dependencies: usize,
    /// Leaves stored plainly by the final sweep.
    pub remaining: usize,
}

/// An activity being assembled for one producing node.
#[derive(Debug)]
struct Accumulator {
    activity: Activity,
    /// Referenced node ids with their `was_executed` flag, in relation order.
    uses: Vec<(String, bool)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Applies provenance relations to a materialized tree.
pub struct ProvenanceBinder<'c> {
    persister: &'c dyn Persister,
    activities: &'c dyn ActivityStore,
    accumulators: HashMap<String, Accumulator>,
    /// Producing node ids in order of first appearance.
    producers: Vec<String>,
    relations: usize,
}

impl<'c> ProvenanceBinder<'c> {
    pub fn new(persister: &'c dyn Persister, activities: &'c dyn ActivityStore) -> Self {
        Self {
            persister,
            activities,
            accumulators: HashMap::new(),
            producers: Vec::new(),
            relations: 0,
        }
    }

    /// Accumulate every relation of `source` against the subtree rooted at
    /// `root`. Returns the number of relations applied.
    pub async fn bind(
        &mut self,
        tree: &SourceTree,
        root: &str,
        source: &dyn ProvenanceSource,
    ) -> Result<usize> {
        let view = tree.subtree(root)?;
        let mut applied = 0;
        for relation in source.relations() {
            self.bind_relation(&view, relation)
                .await
                .inspect_err(|e| error!(relation = %relation, subtree = %root, "binding failed: {}", e))?;
            applied += 1;
        }
        info!(subtree = %root, relations = applied, "bound provenance");
        Ok(applied)
    }

    async fn bind_relation(
        &mut self,
        view: &Subtree<'_>,
        relation: &ProvenanceRelation,
    ) -> Result<()> {
        let from = resolve(&relation.from, view)?;
        let to = resolve(&relation.to, view)?;
        let from_handle = materialized(view, &from)?;
        materialized(view, &to)?;

        if !self.accumulators.contains_key(&from) {
            let activity = self.fetch_or_create(&from, &from_handle).await;
            self.accumulators.insert(
                from.clone(),
                Accumulator {
                    activity,
                    uses: Vec::new(),
                },
            );
            self.producers.push(from.clone());
        }
        let acc = self
            .accumulators
            .get_mut(&from)
            .ok_or_else(|| SyncError::UnknownNode(from.clone()))?;

        match relation.kind {
            RelationKind::Usage => {
                acc.uses.push((to.clone(), false));
                acc.activity.name_or(NAME_USED);
            }
            RelationKind::Generation => {
                acc.uses.push((to.clone(), true));
                acc.activity.name_or(NAME_GENERATED);
            }
            RelationKind::Other(ref kind) => {
                debug!(kind = %kind, "relation kind carries no annotation");
                acc.activity.name_or(NAME_NOTYPE);
            }
        }

        debug!(from = %from, to = %to, kind = %relation.kind, "relation bound");
        self.relations += 1;
        Ok(())
    }

    async fn fetch_or_create(&self, node: &str, handle: &DestHandle) -> Activity {
        match self.activities.fetch_activity(handle).await {
            Ok(ActivityLookup::Found(activity)) => {
                debug!(node = %node, "reusing existing activity");
                activity
            }
            Ok(ActivityLookup::NotFound) => Activity::new(),
            Err(e) => {
                warn!(node = %node, "activity lookup failed, starting empty: {:#}", e);
                Activity::new()
            }
        }
    }

    /// Store every producing node with its activity, then every remaining
    /// unpersisted leaf of `tree` without one.
    pub async fn finish(self, tree: &mut SourceTree) -> Result<BindStats> {
        let mut stats = BindStats {
            relations: self.relations,
            ..BindStats::default()
        };

        for id in self.storage_order()? {
            match self.accumulators.get(&id) {
                Some(acc) => {
                    let mut activity = acc.activity.clone();
                    for (target, was_executed) in &acc.uses {
                        let used = materialized_in(tree, target)?;
                        let target_id = used
                            .id
                            .clone()
                            .ok_or_else(|| SyncError::NotMaterialized(target.clone()))?;
                        activity.used(target_id, used.version, *was_executed);
                    }
                    let handle = materialized_in(tree, &id)?;
                    let stored = self
                        .persister
                        .persist(&handle, Some(&activity), false)
                        .await
                        .with_context(|| format!("Failed to store '{}' with activity", handle.name))?;
                    tree.set_destination(&id, stored)?;
                    stats.activities += 1;
                }
                None => {
                    if store_plain(self.persister, tree, &id).await? {
                        stats.dependencies += 1;
                    }
                }
            }
        }

        stats.remaining = persist_remaining(tree, self.persister).await?;
        info!(
            relations = stats.relations,
            activities = stats.activities,
            dependencies = stats.dependencies,
            remaining = stats.remaining,
            "stored files"
        );
        Ok(stats)
    }

    /// Order in which nodes must be stored: every referenced node before the
    /// producer that references it, producers in order of first appearance.
    fn storage_order(&self) -> Result<Vec<String>> {
        let mut state: HashMap<&str, Visit> = HashMap::new();
        let mut order = Vec::new();

        for producer in &self.producers {
            if state.contains_key(producer.as_str()) {
                continue;
            }
            state.insert(producer.as_str(), Visit::InProgress);
            let mut stack: Vec<(&str, usize)> = vec![(producer.as_str(), 0)];

            while let Some(top) = stack.last_mut() {
                let (id, next) = *top;
                top.1 += 1;
                let uses = self
                    .accumulators
                    .get(id)
                    .map(|acc| acc.uses.as_slice())
                    .unwrap_or(&[]);

                match uses.get(next) {
                    Some((dep, _)) => {
                        let dep = dep.as_str();
                        match state.get(dep).copied() {
                            Some(Visit::Done) => {}
                            Some(Visit::InProgress) => {
                                return Err(SyncError::ProvenanceCycle(dep.to_string()));
                            }
                            None if self.accumulators.contains_key(dep) => {
                                state.insert(dep, Visit::InProgress);
                                stack.push((dep, 0));
                            }
                            None => {
                                state.insert(dep, Visit::Done);
                                order.push(dep.to_string());
                            }
                        }
                    }
                    None => {
                        stack.pop();
                        state.insert(id, Visit::Done);
                        order.push(id.to_string());
                    }
                }
            }
        }
        Ok(order)
    }
}

/// Store every leaf of `tree` that has a handle but no persisted identity.
/// Returns the number of leaves stored.
pub async fn persist_remaining(tree: &mut SourceTree, persister: &dyn Persister) -> Result<usize> {
    let leaves: Vec<String> = tree
        .leaves()
        .into_iter()
        .filter(|n| !n.is_persisted())
        .map(|n| n.identifier.clone())
        .collect();

    let mut stored = 0;
    for id in leaves {
        if store_plain(persister, tree, &id).await? {
            stored += 1;
        }
    }
    Ok(stored)
}

/// Bind every `(subtree root, document)` pair, then store all files.
pub async fn store_files(
    tree: &mut SourceTree,
    documents: &[(String, &dyn ProvenanceSource)],
    persister: &dyn Persister,
    activities: &dyn ActivityStore,
) -> Result<BindStats> {
    let mut binder = ProvenanceBinder::new(persister, activities);
    for (root, document) in documents {
        binder.bind(tree, root, *document).await?;
    }
    binder.finish(tree).await
}

async fn store_plain(persister: &dyn Persister, tree: &mut SourceTree, id: &str) -> Result<bool> {
    let handle = materialized_in(tree, id)?;
    if handle.is_persisted() {
        return Ok(false);
    }
    let stored = persister
        .persist(&handle, None, false)
        .await
        .with_context(|| format!("Failed to store '{}'", handle.name))?;
    debug!(node = %id, id = ?stored.id, "stored");
    tree.set_destination(id, stored)?;
    Ok(true)
}

fn materialized(view: &Subtree<'_>, id: &str) -> Result<DestHandle> {
    view.node(id)?
        .destination
        .clone()
        .ok_or_else(|| SyncError::NotMaterialized(id.to_string()))
}

fn materialized_in(tree: &SourceTree, id: &str) -> Result<DestHandle> {
    materialized(&tree.view(), id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::materialize;
    use crate::memory::{DestinationCall, InMemoryDestination};
    use crate::models::RemoteRecord;
    use crate::provenance::{ProvenanceEntity, ProvenanceGraph};
    use crate::tree::{NodeRole, TreeNode, PROJECT_TAG, SUBPROJECT_TAG};

    /// project → QMP → {rawdata → {X, Z}, derived → {Y}, notes.txt}
    async fn fixture() -> (SourceTree, InMemoryDestination) {
        fixture_with(InMemoryDestination::new()).await
    }

    async fn fixture_with(dest: InMemoryDestination) -> (SourceTree, InMemoryDestination) {
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
        let nodes = [
            (RemoteRecord::container("raw", "rawdata"), "QMP"),
            (RemoteRecord::file("x", "X", 1), "raw"),
            (RemoteRecord::file("z", "Z", 1), "raw"),
            (RemoteRecord::container("der", "derived"), "QMP"),
            (RemoteRecord::file("y", "Y", 1), "der"),
            (RemoteRecord::file("n", "notes.txt", 1), "QMP"),
        ];
        for (record, parent) in nodes {
            t.add_node(TreeNode::from_record(record), parent).unwrap();
        }
        let project = dest.ensure_project("proj");
        materialize(&mut t, project, &dest).await.unwrap();
        (t, dest)
    }

    async fn run(
        tree: &mut SourceTree,
        dest: &InMemoryDestination,
        graph: &ProvenanceGraph,
    ) -> Result<BindStats> {
        let doc: &dyn ProvenanceSource = graph;
        store_files(tree, &[("QMP".to_string(), doc)], dest, dest).await
    }

    fn dest_id(tree: &SourceTree, node: &str) -> String {
        tree.node(node)
            .unwrap()
            .destination
            .as_ref()
            .unwrap()
            .id
            .clone()
            .unwrap()
    }

    fn persisted_names(dest: &InMemoryDestination) -> Vec<String> {
        dest.calls()
            .into_iter()
            .filter_map(|c| match c {
                DestinationCall::Persist { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_generation_stores_target_first() {
        let (mut tree, dest) = fixture().await;
        let mut graph = ProvenanceGraph::new();
        graph.generation("rdata:rawdata/X", "rdata:derived/Y");

        let stats = run(&mut tree, &dest, &graph)
            .await
            .unwrap();
        assert_eq!(stats.relations, 1);
        assert_eq!(stats.activities, 1);
        assert_eq!(stats.dependencies, 1);

        let names = persisted_names(&dest);
        assert_eq!(&names[..2], ["Y", "X"]);

        let x = dest_id(&tree, "x");
        let y = dest_id(&tree, "y");
        let activity = dest.activity_for(&x).unwrap();
        assert_eq!(activity.name.as_deref(), Some("generated"));
        assert_eq!(activity.used.len(), 1);
        assert_eq!(activity.used[0].target_id, y);
        assert!(activity.used[0].was_executed);
    }

    #[tokio::test]
    async fn test_shared_producer_accumulates() {
        let (mut tree, dest) = fixture().await;
        let mut graph = ProvenanceGraph::new();
        graph
            .usage("rawdata/X", "rawdata/Z")
            .generation("rawdata/X", "derived/Y");

        run(&mut tree, &dest, &graph)
            .await
            .unwrap();

        let x = dest_id(&tree, "x");
        let activity = dest.activity_for(&x).unwrap();
        assert_eq!(activity.name.as_deref(), Some("used"));
        let used: Vec<(String, bool)> = activity
            .used
            .iter()
            .map(|u| (u.target_id.clone(), u.was_executed))
            .collect();
        assert_eq!(
            used,
            vec![(dest_id(&tree, "z"), false), (dest_id(&tree, "y"), true)]
        );
        // one lookup for the single producer
        let fetches = dest
            .calls()
            .iter()
            .filter(|c| matches!(c, DestinationCall::FetchActivity { .. }))
            .count();
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn test_every_leaf_persisted_at_most_once() {
        let (mut tree, dest) = fixture().await;
        let mut graph = ProvenanceGraph::new();
        graph
            .usage("rawdata/X", "rawdata/Z")
            .generation("derived/Y", "rawdata/Z")
            .generation("rawdata/X", "derived/Y");

        let stats = run(&mut tree, &dest, &graph)
            .await
            .unwrap();
        assert_eq!(stats.remaining, 1); // notes.txt

        for leaf in tree.leaves() {
            let id = leaf.destination.as_ref().unwrap().id.clone().unwrap();
            assert_eq!(dest.persist_count(&id), 1, "leaf {}", leaf.tag);
        }
        // Y is referenced by X, so it is stored before X
        let names = persisted_names(&dest);
        let pos = |n: &str| names.iter().position(|m| m == n).unwrap();
        assert!(pos("Z") < pos("Y"));
        assert!(pos("Y") < pos("X"));
    }

    #[tokio::test]
    async fn test_unresolved_path_surfaces() {
        let (mut tree, dest) = fixture().await;
        let mut graph = ProvenanceGraph::new();
        graph.usage("rawdata/X", "rawdata/missing.csv");

        let err = run(&mut tree, &dest, &graph)
            .await
            .unwrap_err();
        assert!(err.is_resolution());
        assert!(matches!(err, SyncError::UnresolvedPath { .. }));
        assert!(persisted_names(&dest).is_empty());
    }

    #[tokio::test]
    async fn test_failed_lookup_starts_empty_activity() {
        let (mut tree, dest) =
            fixture_with(InMemoryDestination::new().with_failing_activity_fetch()).await;

        let mut graph = ProvenanceGraph::new();
        graph.usage("rawdata/X", "derived/Y");
        run(&mut tree, &dest, &graph)
            .await
            .unwrap();
        let activity = dest.activity_for(&dest_id(&tree, "x")).unwrap();
        assert_eq!(activity.name.as_deref(), Some("used"));
    }

    #[tokio::test]
    async fn test_other_kind_names_notype() {
        let (mut tree, dest) = fixture().await;
        let mut graph = ProvenanceGraph::new();
        graph.relation(
            RelationKind::Other("Derivation".into()),
            ProvenanceEntity::new("rawdata/X"),
            ProvenanceEntity::new("derived/Y"),
        );
        let stats = run(&mut tree, &dest, &graph)
            .await
            .unwrap();
        let activity = dest.activity_for(&dest_id(&tree, "x")).unwrap();
        assert_eq!(activity.name.as_deref(), Some("notype"));
        assert!(activity.used.is_empty());
        // Y is stored by the sweep, not as a dependency
        assert_eq!(stats.dependencies, 0);
        assert!(tree.node("y").unwrap().is_persisted());
    }

    #[tokio::test]
    async fn test_existing_activity_is_extended() {
        let (mut tree, dest) = fixture().await;
        let x = tree.node("x").unwrap().destination.clone().unwrap();
        let mut prior = Activity::new();
        prior.name = Some("prior".into());
        let stored = dest.persist(&x, Some(&prior), false).await.unwrap();
        tree.set_destination("x", stored).unwrap();

        let mut graph = ProvenanceGraph::new();
        graph.usage("rawdata/X", "derived/Y");
        run(&mut tree, &dest, &graph)
            .await
            .unwrap();

        let activity = dest.activity_for(&dest_id(&tree, "x")).unwrap();
        assert_eq!(activity.name.as_deref(), Some("prior"));
        assert_eq!(activity.used.len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_is_rejected() {
        let (mut tree, dest) = fixture().await;
        let mut graph = ProvenanceGraph::new();
        graph
            .usage("rawdata/X", "derived/Y")
            .usage("derived/Y", "rawdata/X");
        let err = run(&mut tree, &dest, &graph)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ProvenanceCycle(_)));
    }

    #[tokio::test]
    async fn test_self_reference_is_a_cycle() {
        let (mut tree, dest) = fixture().await;
        let mut graph = ProvenanceGraph::new();
        graph.generation("rawdata/X", "rawdata/X");
        let err = run(&mut tree, &dest, &graph)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ProvenanceCycle(ref id) if id == "x"));
        assert!(!tree.node("x").unwrap().is_persisted());
        assert!(!persisted_names(&dest).contains(&"X".to_string()));
    }

    #[tokio::test]
    async fn test_unmaterialized_tree_is_rejected() {
        let mut tree = SourceTree::build_root(
            "proj",
            PROJECT_TAG,
            RemoteRecord::container("p", "proj"),
        );
        tree.add_node(TreeNode::from_record(RemoteRecord::file("a", "A", 1)), "proj")
            .unwrap();
        let dest = InMemoryDestination::new();
        let err = persist_remaining(&mut tree, &dest).await.unwrap_err();
        assert!(matches!(err, SyncError::NotMaterialized(ref id) if id == "a"));
    }
}
