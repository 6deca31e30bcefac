// src/sources.rs
//! Contracts with the document and knowledge-base stores, plus JSON-backed
//! in-memory implementations.

use crate::core::builder::WaypointTuple;
use crate::core::relation::SpatialTriple;
use crate::core::types::{Candidate, ResourceId, Toponym, ToponymType};
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A place-name mention as stored in the annotated document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToponymRecord {
    pub resource: ResourceId,
    pub xml_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<ToponymRecord> for Toponym {
    fn from(r: ToponymRecord) -> Self {
        Toponym::new(r.resource, r.xml_id, r.name, ToponymType::new(r.kind))
    }
}

/// Administrative levels, in the order they are tried as a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdministrativeLevel {
    Department,
    Region,
    Province,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministrativeEdge {
    pub resource: ResourceId,
    pub level: AdministrativeLevel,
    pub parent: ResourceId,
}

/// Structural view of an annotated document.
pub trait DocumentSource {
    fn toponyms(&self) -> Result<Vec<ToponymRecord>>;
    /// Layout rows, in any order.
    fn waypoint_tuples(&self) -> Result<Vec<WaypointTuple>>;
    /// Spatial relations asserted by the text.
    fn spatial_relations(&self) -> Result<Vec<SpatialTriple>>;
}

/// Spatial and administrative statements of the knowledge base.
pub trait RelationStore {
    fn spatial_triples(&self) -> Result<Vec<SpatialTriple>>;
    fn administrative_edges(&self) -> Result<Vec<AdministrativeEdge>>;
}

/// Every KB entity that may be proposed as a referent. Duplicates are allowed.
pub trait CandidatePoolSource {
    fn candidates(&self) -> Result<Vec<Candidate>>;
}

/// Unwraps a source answer, logging a failure and degrading it to "no results".
pub fn or_empty<T>(what: &str, answer: Result<Vec<T>>) -> Vec<T> {
    match answer {
        Ok(items) => items,
        Err(e) => {
            log::warn!("{what} unavailable, continuing without it: {e}");
            Vec::new()
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// An annotated document held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    #[serde(default)]
    pub toponyms: Vec<ToponymRecord>,
    #[serde(default)]
    pub tuples: Vec<WaypointTuple>,
    #[serde(default)]
    pub relations: Vec<SpatialTriple>,
}

impl AnnotatedDocument {
    pub fn from_path(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

impl DocumentSource for AnnotatedDocument {
    fn toponyms(&self) -> Result<Vec<ToponymRecord>> {
        Ok(self.toponyms.clone())
    }

    fn waypoint_tuples(&self) -> Result<Vec<WaypointTuple>> {
        Ok(self.tuples.clone())
    }

    fn spatial_relations(&self) -> Result<Vec<SpatialTriple>> {
        Ok(self.relations.clone())
    }
}

/// A knowledge-base extract held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub spatial: Vec<SpatialTriple>,
    #[serde(default)]
    pub administrative: Vec<AdministrativeEdge>,
}

impl KnowledgeBase {
    pub fn from_path(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

impl RelationStore for KnowledgeBase {
    fn spatial_triples(&self) -> Result<Vec<SpatialTriple>> {
        Ok(self.spatial.clone())
    }

    fn administrative_edges(&self) -> Result<Vec<AdministrativeEdge>> {
        Ok(self.administrative.clone())
    }
}

impl CandidatePoolSource for KnowledgeBase {
    fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }
}
