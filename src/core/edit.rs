// src/core/edit.rs
use crate::core::types::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One step of an alignment between a mini-graph and the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditOperation {
    Substitution { source: ResourceId, target: ResourceId, cost: f32 },
    Deletion { source: ResourceId, cost: f32 },
    Insertion { target: ResourceId, cost: f32 },
}

impl EditOperation {
    pub fn cost(&self) -> f32 {
        match self {
            EditOperation::Substitution { cost, .. }
            | EditOperation::Deletion { cost, .. }
            | EditOperation::Insertion { cost, .. } => *cost,
        }
    }

    pub fn source(&self) -> Option<&ResourceId> {
        match self {
            EditOperation::Substitution { source, .. } | EditOperation::Deletion { source, .. } => Some(source),
            EditOperation::Insertion { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&ResourceId> {
        match self {
            EditOperation::Substitution { target, .. } | EditOperation::Insertion { target, .. } => Some(target),
            EditOperation::Deletion { .. } => None,
        }
    }
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOperation::Substitution { source, target, cost } => {
                write!(f, "substitute {source} -> {target} ({cost:.3})")
            }
            EditOperation::Deletion { source, cost } => write!(f, "delete {source} ({cost:.3})"),
            EditOperation::Insertion { target, cost } => write!(f, "insert {target} ({cost:.3})"),
        }
    }
}

/// Ordered list of edit operations; its cost is the sum of theirs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditPath {
    operations: Vec<EditOperation>,
}

impl EditPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: EditOperation) {
        self.operations.push(op);
    }

    /// A copy of `self` extended by `op`.
    pub fn extended(&self, op: EditOperation) -> Self {
        let mut next = self.clone();
        next.push(op);
        next
    }

    pub fn operations(&self) -> &[EditOperation] {
        &self.operations
    }

    pub fn last(&self) -> Option<&EditOperation> {
        self.operations.last()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn cost(&self) -> f32 {
        self.operations.iter().map(EditOperation::cost).sum()
    }

    /// Source nodes covered by substitutions and deletions.
    pub fn used_sources(&self) -> HashSet<ResourceId> {
        self.operations.iter().filter_map(|op| op.source().cloned()).collect()
    }

    /// Target nodes covered by substitutions and insertions.
    pub fn used_targets(&self) -> HashSet<ResourceId> {
        self.operations.iter().filter_map(|op| op.target().cloned()).collect()
    }

    pub fn is_complete(&self, sources: &HashSet<ResourceId>, targets: &HashSet<ResourceId>) -> bool {
        let used_sources = self.used_sources();
        let used_targets = self.used_targets();
        sources.iter().all(|s| used_sources.contains(s)) && targets.iter().all(|t| used_targets.contains(t))
    }
}

impl FromIterator<EditOperation> for EditPath {
    fn from_iter<I: IntoIterator<Item = EditOperation>>(iter: I) -> Self {
        Self { operations: iter.into_iter().collect() }
    }
}

/// Result of matching one mini-graph.
///
/// `path` covers every source node. Knowledge-base nodes left unused by it are
/// kept apart in `unmatched_targets` so that ranking variants is not skewed by
/// how many candidates their mentions had.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub path: EditPath,
    pub unmatched_targets: Vec<ResourceId>,
    pub insertion_cost: f32,
}

impl Alignment {
    pub fn cost(&self) -> f32 {
        self.path.cost()
    }

    /// The path closed with one insertion per unused target node.
    pub fn completed(&self) -> EditPath {
        let mut path = self.path.clone();
        for target in &self.unmatched_targets {
            path.push(EditOperation::Insertion { target: target.clone(), cost: self.insertion_cost });
        }
        path
    }
}
