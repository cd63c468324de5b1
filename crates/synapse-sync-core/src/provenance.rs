//! Provenance graph model.
//!
//! Entities are logical paths (`rawdata/sample1.biom`), optionally qualified
//! by a namespace prefix as they appear in PROV documents
//! (`biom:rawdata/sample1.biom`). Relations connect two entities and are kept
//! in declaration order; that order decides how shared activities accumulate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::ProvenanceSource;

/// A reference to a produced or consumed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvenanceEntity {
    pub namespace: Option<String>,
    /// Slash-delimited logical path, relative to the project content.
    pub local_part: String,
}

impl ProvenanceEntity {
    pub fn new(local_part: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_part: local_part.into(),
        }
    }

    /// Parse a qualified name of the form `prefix:local/part`.
    pub fn parse_qualified(name: &str) -> Self {
        match name.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() => Self {
                namespace: Some(prefix.to_string()),
                local_part: local.to_string(),
            },
            _ => Self::new(name),
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.local_part.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for ProvenanceEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}:{}", ns, self.local_part),
            None => write!(f, "{}", self.local_part),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    Usage,
    Generation,
    /// Any other relation type the document declares (e.g. `Derivation`).
    Other(String),
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Usage => write!(f, "Usage"),
            RelationKind::Generation => write!(f, "Generation"),
            RelationKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// A directed, typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRelation {
    /// Record identifier within its document, if it has one.
    pub id: Option<String>,
    pub kind: RelationKind,
    /// The producing (annotated) endpoint.
    pub from: ProvenanceEntity,
    pub to: ProvenanceEntity,
}

impl fmt::Display for ProvenanceRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.kind, self.from, self.to)
    }
}

/// An in-memory provenance document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceGraph {
    pub entities: Vec<ProvenanceEntity>,
    pub relations: Vec<ProvenanceRelation>,
}

impl ProvenanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity. Already-declared entities are ignored.
    pub fn entity(&mut self, entity: ProvenanceEntity) -> &mut Self {
        if !self.entities.contains(&entity) {
            self.entities.push(entity);
        }
        self
    }

    /// Append a relation, declaring both endpoints.
    pub fn relation(
        &mut self,
        kind: RelationKind,
        from: ProvenanceEntity,
        to: ProvenanceEntity,
    ) -> &mut Self {
        self.entity(from.clone());
        self.entity(to.clone());
        self.relations.push(ProvenanceRelation {
            id: None,
            kind,
            from,
            to,
        });
        self
    }

    pub fn usage(&mut self, from: &str, to: &str) -> &mut Self {
        self.relation(
            RelationKind::Usage,
            ProvenanceEntity::parse_qualified(from),
            ProvenanceEntity::parse_qualified(to),
        )
    }

    pub fn generation(&mut self, from: &str, to: &str) -> &mut Self {
        self.relation(
            RelationKind::Generation,
            ProvenanceEntity::parse_qualified(from),
            ProvenanceEntity::parse_qualified(to),
        )
    }
}

impl ProvenanceSource for ProvenanceGraph {
    fn relations(&self) -> &[ProvenanceRelation] {
        &self.relations
    }
}
