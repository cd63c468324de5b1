//! End-to-end run orchestration.
//!
//! Each `ssync` command is one function here. A sync runs the phases in a
//! fixed order:
//!
//! ```text
//! open project ─▶ ignore ─▶ subprojects (grow) ─▶ destination project
//!      ─▶ materialize ─▶ load PROV ─▶ bind ─▶ store remaining ─▶ summary
//! ```
//!
//! Results are printed to stdout; progress and logs go to stderr.

use anyhow::{bail, Context, Result};
use synapse_sync_core::binder::ProvenanceBinder;
use synapse_sync_core::materialize::materialize;
use synapse_sync_core::memory::InMemoryDestination;
use synapse_sync_core::models::DestHandle;
use synapse_sync_core::project::{SourceProject, SubprojectOutcome};
use synapse_sync_core::traits::{ActivityStore, Creator, Lister, Persister};
use synapse_sync_core::tree::SourceTree;
use tracing::info;

use crate::config::{Config, SourceKind};
use crate::connector_fs::FilesystemLister;
use crate::connector_gdrive::DriveLister;
use crate::progress::{ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::prov::{self, ProvDocument};
use crate::synapse::SynapseClient;

/// Counts printed at the end of a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub tree_nodes: usize,
    pub folders_created: usize,
    pub files_created: usize,
    pub relations_bound: usize,
    pub activities_attached: usize,
    pub files_stored_plainly: usize,
}

fn open_lister(config: &Config) -> Result<Box<dyn Lister>> {
    let lister: Box<dyn Lister> = match config.source.kind {
        SourceKind::Filesystem => {
            let fs = config
                .source
                .filesystem
                .as_ref()
                .context("[source.filesystem] is not configured")?;
            let fs = crate::config::FilesystemSourceConfig {
                root: config.resolve_path(&fs.root),
            };
            Box::new(FilesystemLister::new(&fs)?)
        }
        SourceKind::Gdrive => Box::new(DriveLister::new(&config.source.gdrive)?),
    };
    Ok(lister)
}

/// Open the source project, apply the ignore set, and grow every configured
/// subproject (or the whole project when none are configured).
async fn build_tree(
    config: &Config,
    lister: &dyn Lister,
    reporter: &dyn SyncProgressReporter,
) -> Result<SourceTree> {
    let mut project = SourceProject::open(lister, &config.source.project).await?;
    project.set_ignore(config.ignore_patterns()?)?;

    if config.source.subprojects.is_empty() {
        reporter.report(SyncProgressEvent::Discovering {
            scope: config.source.project.clone(),
        });
        project.grow_all().await?;
        return Ok(project.into_tree());
    }

    for name in &config.source.subprojects {
        reporter.report(SyncProgressEvent::Discovering {
            scope: name.clone(),
        });
        let outcomes = project.add_subprojects(std::slice::from_ref(name), true).await?;
        for (name, outcome) in outcomes {
            match outcome {
                SubprojectOutcome::Added { grown } => {
                    info!(subproject = %name, nodes = grown, "subproject grown");
                }
                SubprojectOutcome::AlreadyPresent => {}
                SubprojectOutcome::Missing => bail!(
                    "Subproject '{}' not found in project '{}'",
                    name,
                    config.source.project
                ),
            }
        }
    }
    Ok(project.into_tree())
}

/// `ssync tree`: print the source tree.
pub async fn run_tree(config: &Config, show_ids: bool, json: bool) -> Result<()> {
    let lister = open_lister(config)?;
    let tree = build_tree(config, lister.as_ref(), &crate::progress::NoProgress).await?;

    if json {
        let paths: Vec<Vec<&str>> = tree
            .view()
            .filter_leaf_paths(|_| true)
            .into_iter()
            .map(|nodes| nodes.iter().map(|n| n.tag.as_str()).collect())
            .collect();
        println!("{}", serde_json::to_string_pretty(&paths)?);
    } else {
        print!("{}", tree.render(show_ids));
    }
    Ok(())
}

/// `ssync check`: load every PROV document and verify its entities against
/// the subproject's home directory, when one is configured.
pub fn run_check(config: &Config) -> Result<()> {
    let mut failed = 0usize;

    for (name, prov_cfg) in &config.provenance {
        let doc = prov::load_prov_json(&config.resolve_path(&prov_cfg.path))?;
        println!("check {}", name);
        println!("  relations: {}", doc.graph.relations.len());
        println!("  entities: {}", doc.declared.len());

        match &prov_cfg.home_dir {
            Some(home) => {
                let home = config.resolve_path(home);
                let missing = prov::missing_entities(&doc, &home);
                for entity in &missing {
                    println!("  missing: {}", entity);
                }
                if !missing.is_empty() {
                    failed += 1;
                }
            }
            None => println!("  home_dir: not set, skipped"),
        }
    }

    if failed > 0 {
        bail!("{} provenance document(s) reference missing files", failed);
    }
    println!("ok");
    Ok(())
}

fn load_documents(config: &Config) -> Result<Vec<(String, ProvDocument)>> {
    config
        .provenance
        .iter()
        .map(|(name, prov_cfg)| {
            let doc = prov::load_prov_json(&config.resolve_path(&prov_cfg.path))?;
            Ok((name.clone(), doc))
        })
        .collect()
}

/// Materialize, bind, and store against any destination.
async fn sync_into<D>(
    tree: &mut SourceTree,
    project: DestHandle,
    destination: &D,
    documents: &[(String, ProvDocument)],
    reporter: &dyn SyncProgressReporter,
) -> Result<SyncSummary>
where
    D: Creator + Persister + ActivityStore,
{
    reporter.report(SyncProgressEvent::Materializing {
        nodes: tree.len() as u64,
    });
    let created = materialize(tree, project, destination).await?;

    let mut binder = ProvenanceBinder::new(destination, destination);
    for (subproject, doc) in documents {
        let relations = binder
            .bind(tree, subproject, doc)
            .await
            .with_context(|| format!("Failed to bind provenance for '{}'", subproject))?;
        reporter.report(SyncProgressEvent::Binding {
            subproject: subproject.clone(),
            relations: relations as u64,
        });
    }

    let leaves = tree.leaves().len() as u64;
    let bound = binder.finish(tree).await?;
    let stored = bound.activities + bound.dependencies + bound.remaining;
    reporter.report(SyncProgressEvent::Storing {
        n: stored as u64,
        total: leaves,
    });

    Ok(SyncSummary {
        tree_nodes: tree.len(),
        folders_created: created.folders,
        files_created: created.files,
        relations_bound: bound.relations,
        activities_attached: bound.activities,
        files_stored_plainly: bound.dependencies + bound.remaining,
    })
}

/// `ssync sync`: mirror the source project into the destination.
pub async fn run_sync(config: &Config, dry_run: bool, progress: ProgressMode) -> Result<()> {
    let reporter = progress.reporter();
    let lister = open_lister(config)?;
    let mut tree = build_tree(config, lister.as_ref(), reporter.as_ref()).await?;
    let documents = load_documents(config)?;

    let summary = if dry_run {
        let destination = InMemoryDestination::new();
        let project = destination.ensure_project(&config.destination.project);
        sync_into(&mut tree, project, &destination, &documents, reporter.as_ref()).await?
    } else {
        let destination = SynapseClient::new(&config.destination)?;
        let project = destination
            .ensure_project(&config.destination.project)
            .await
            .with_context(|| {
                format!("Failed to open Synapse project '{}'", config.destination.project)
            })?;
        sync_into(&mut tree, project, &destination, &documents, reporter.as_ref()).await?
    };

    print_summary(config, dry_run, &summary);
    Ok(())
}

fn print_summary(config: &Config, dry_run: bool, summary: &SyncSummary) {
    if dry_run {
        println!(
            "sync {} -> {} (dry-run)",
            config.source.project, config.destination.project
        );
    } else {
        println!(
            "sync {} -> {}",
            config.source.project, config.destination.project
        );
    }
    println!("  tree nodes: {}", summary.tree_nodes);
    println!("  folders created: {}", summary.folders_created);
    println!("  files created: {}", summary.files_created);
    println!("  relations bound: {}", summary.relations_bound);
    println!("  activities attached: {}", summary.activities_attached);
    println!("  files stored plainly: {}", summary.files_stored_plainly);
    println!("ok");
}
