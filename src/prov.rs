//! PROV-JSON documents.
//!
//! Loads a W3C PROV-JSON file into a [`ProvenanceGraph`]. Only the relation
//! sections that connect two artifacts are read; each becomes a typed
//! relation whose `from` is the annotated endpoint:
//!
//! | Section | Kind | from | to |
//! |---------|------|------|----|
//! | `used` | Usage | `prov:activity` | `prov:entity` |
//! | `wasGeneratedBy` | Generation | `prov:entity` | `prov:activity` |
//! | `wasDerivedFrom` | Derivation | `prov:generatedEntity` | `prov:usedEntity` |
//! | `wasInformedBy` | Communication | `prov:informed` | `prov:informant` |
//! | `wasAttributedTo` | Attribution | `prov:entity` | `prov:agent` |
//! | `wasAssociatedWith` | Association | `prov:activity` | `prov:agent` |
//!
//! Relations keep document order (`serde_json` is built with
//! `preserve_order`).

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use synapse_sync_core::provenance::{
    ProvenanceEntity, ProvenanceGraph, ProvenanceRelation, RelationKind,
};
use synapse_sync_core::traits::ProvenanceSource;
use tracing::{debug, warn};

const DECLARATION_SECTIONS: [&str; 4] = ["prefix", "entity", "activity", "agent"];

/// A loaded provenance document.
#[derive(Debug, Clone, Default)]
pub struct ProvDocument {
    pub graph: ProvenanceGraph,
    /// Entities declared in the `entity` section, in document order.
    pub declared: Vec<ProvenanceEntity>,
}

impl ProvenanceSource for ProvDocument {
    fn relations(&self) -> &[ProvenanceRelation] {
        self.graph.relations()
    }
}

fn section_kind(section: &str) -> Option<(RelationKind, &'static str, &'static str)> {
    let kind = match section {
        "used" => (RelationKind::Usage, "prov:activity", "prov:entity"),
        "wasGeneratedBy" => (RelationKind::Generation, "prov:entity", "prov:activity"),
        "wasDerivedFrom" => (
            RelationKind::Other("Derivation".into()),
            "prov:generatedEntity",
            "prov:usedEntity",
        ),
        "wasInformedBy" => (
            RelationKind::Other("Communication".into()),
            "prov:informed",
            "prov:informant",
        ),
        "wasAttributedTo" => (
            RelationKind::Other("Attribution".into()),
            "prov:entity",
            "prov:agent",
        ),
        "wasAssociatedWith" => (
            RelationKind::Other("Association".into()),
            "prov:activity",
            "prov:agent",
        ),
        _ => return None,
    };
    Some(kind)
}

/// Parse a PROV-JSON document from text.
pub fn parse_prov_json(content: &str) -> Result<ProvDocument> {
    let root: Map<String, Value> =
        serde_json::from_str(content).context("Invalid PROV-JSON: expected a JSON object")?;
    let mut doc = ProvDocument::default();

    if let Some(entities) = root.get("entity").and_then(Value::as_object) {
        for name in entities.keys() {
            let entity = ProvenanceEntity::parse_qualified(name);
            doc.graph.entity(entity.clone());
            doc.declared.push(entity);
        }
    }

    for (section, records) in &root {
        if DECLARATION_SECTIONS.contains(&section.as_str()) {
            continue;
        }
        let Some((kind, from_key, to_key)) = section_kind(section) else {
            warn!(section = %section, "skipping unsupported PROV section");
            continue;
        };
        let records = records
            .as_object()
            .with_context(|| format!("Invalid PROV-JSON: '{}' must be an object", section))?;

        for (id, record) in records {
            // Repeated identifiers are serialized as a list of records.
            let bodies: Vec<&Value> = match record {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for body in bodies {
                let endpoint = |key: &str| -> Result<ProvenanceEntity> {
                    body.get(key)
                        .and_then(Value::as_str)
                        .map(ProvenanceEntity::parse_qualified)
                        .with_context(|| {
                            format!("PROV record '{}' in '{}' has no '{}'", id, section, key)
                        })
                };
                let from = endpoint(from_key)?;
                let to = endpoint(to_key)?;
                doc.graph.entity(from.clone());
                doc.graph.entity(to.clone());
                doc.graph.relations.push(ProvenanceRelation {
                    id: Some(id.clone()),
                    kind: kind.clone(),
                    from,
                    to,
                });
            }
        }
    }

    debug!(
        entities = doc.declared.len(),
        relations = doc.graph.relations.len(),
        "parsed PROV document"
    );
    Ok(doc)
}

pub fn load_prov_json(path: &Path) -> Result<ProvDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read PROV document: {}", path.display()))?;
    parse_prov_json(&content).with_context(|| format!("Failed to load {}", path.display()))
}

/// Declared entities whose path does not exist under `home_dir`.
pub fn missing_entities<'d>(doc: &'d ProvDocument, home_dir: &Path) -> Vec<&'d ProvenanceEntity> {
    doc.declared
        .iter()
        .filter(|e| !home_dir.join(&e.local_part).exists())
        .collect()
}
