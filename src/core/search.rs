// src/core/search.rs
//! Best-first edit-path search aligning one mini-graph with the knowledge base.

use crate::core::cost::{CostModel, MatchState, ReferentOverlay};
use crate::core::edit::{Alignment, EditOperation, EditPath};
use crate::core::minigraph::{MiniGraph, NodeId};
use crate::core::types::{CriterionToponymCandidate, ResourceId, ToponymSet};
use log::trace;
use std::collections::{BTreeSet, HashSet};

struct Matcher<'g, 'm> {
    graph: &'g MiniGraph,
    toponyms: &'g ToponymSet,
    model: &'m CostModel<'m>,
    /// Source nodes in graph order.
    sources: Vec<(NodeId, ResourceId)>,
    targets: BTreeSet<ResourceId>,
    overlay: ReferentOverlay,
}

impl<'g, 'm> Matcher<'g, 'm> {
    fn new(graph: &'g MiniGraph, toponyms: &'g ToponymSet, model: &'m CostModel<'m>) -> Self {
        let sources: Vec<(NodeId, ResourceId)> = graph
            .source_resources()
            .into_iter()
            .filter_map(|r| graph.resource_node(&r).map(|id| (id, r)))
            .collect();
        let targets = sources
            .iter()
            .filter_map(|(_, r)| toponyms.get(r))
            .flat_map(|t| t.candidates.iter().map(|c| c.resource().clone()))
            .collect();
        Self { graph, toponyms, model, sources, targets, overlay: ReferentOverlay::new() }
    }

    fn state(&self) -> MatchState<'_> {
        MatchState { graph: self.graph, toponyms: self.toponyms, overlay: &self.overlay }
    }

    fn candidates_of(&self, resource: &ResourceId) -> &'g [CriterionToponymCandidate] {
        self.toponyms.get(resource).map(|t| t.candidates.as_slice()).unwrap_or(&[])
    }

    /// Unused source node with the most spatial edges, then the most structural ones.
    fn next_node(&self, used: &HashSet<ResourceId>) -> Option<&(NodeId, ResourceId)> {
        let mut best: Option<(&(NodeId, ResourceId), (usize, usize))> = None;
        for entry in self.sources.iter().filter(|(_, r)| !used.contains(r)) {
            let (spatial, structural) = self
                .graph
                .incident_edges(entry.0)
                .fold((0, 0), |(s, k), e| if e.relation.is_spatial() { (s + 1, k) } else { (s, k + 1) });
            let key = (spatial, structural);
            if best.map_or(true, |(_, b)| key > b) {
                best = Some((entry, key));
            }
        }
        best.map(|(entry, _)| entry)
    }

    fn substitution_cost(&self, resource: &ResourceId, candidate: &CriterionToponymCandidate) -> f32 {
        match self.toponyms.get(resource) {
            Some(toponym) => self.model.substitution(&self.state(), toponym, candidate).total_cost,
            None => self.model.deletion_cost(),
        }
    }

    /// Sum of the `min(n1, n2)` smallest best-candidate costs of the source
    /// nodes `path` has not covered yet.
    fn heuristic(&self, path: &EditPath) -> f32 {
        let used_sources = path.used_sources();
        let used_targets = path.used_targets();
        let n1 = self.sources.iter().filter(|(_, r)| !used_sources.contains(r)).count();
        let n2 = self.targets.iter().filter(|t| !used_targets.contains(*t)).count();

        let mut best: Vec<f32> = self
            .sources
            .iter()
            .filter(|(_, r)| !used_sources.contains(r))
            .filter_map(|(_, r)| {
                self.candidates_of(r)
                    .iter()
                    .map(|c| self.substitution_cost(r, c))
                    .min_by(f32::total_cmp)
            })
            .collect();
        best.sort_by(f32::total_cmp);
        best.iter().take(n1.min(n2)).sum()
    }

    /// Children of `path`: one substitution per candidate of the next node, plus its deletion.
    fn expand(&self, path: &EditPath) -> Vec<EditPath> {
        let Some((_, source)) = self.next_node(&path.used_sources()) else {
            return Vec::new();
        };
        let mut children: Vec<EditPath> = self
            .candidates_of(source)
            .iter()
            .map(|c| {
                path.extended(EditOperation::Substitution {
                    source: source.clone(),
                    target: c.resource().clone(),
                    cost: self.substitution_cost(source, c),
                })
            })
            .collect();
        children.push(path.extended(EditOperation::Deletion {
            source: source.clone(),
            cost: self.model.deletion_cost(),
        }));
        children
    }

    fn covers_sources(&self, path: &EditPath) -> bool {
        let used = path.used_sources();
        self.sources.iter().all(|(_, r)| used.contains(r))
    }

    fn run(mut self) -> Alignment {
        let mut current = EditPath::new();
        let mut open = if self.covers_sources(&current) { Vec::new() } else { self.expand(&current) };

        while !open.is_empty() {
            let scored: Vec<f32> = open.iter().map(|p| p.cost() + self.heuristic(p)).collect();
            let mut best = 0;
            for (i, score) in scored.iter().enumerate() {
                if *score < scored[best] {
                    best = i;
                }
            }
            current = open.swap_remove(best);
            open.clear();
            if let Some(op) = current.last() {
                trace!("popped {op} (g = {:.3})", current.cost());
            }

            if let Some(EditOperation::Substitution { source, target, .. }) = current.last() {
                self.overlay.insert(source.clone(), target.clone());
            }
            if self.covers_sources(&current) {
                break;
            }
            open = self.expand(&current);
        }

        let used_targets = current.used_targets();
        let unmatched_targets = self.targets.iter().filter(|t| !used_targets.contains(*t)).cloned().collect();
        Alignment { path: current, unmatched_targets, insertion_cost: self.model.insertion_cost() }
    }
}

/// Aligns the resource nodes of `graph` with their candidates.
///
/// The returned path covers every source node with a substitution or a
/// deletion. The search is greedy at each depth: the best child by `g + h`
/// is kept and its siblings are dropped.
pub fn match_graph(graph: &MiniGraph, toponyms: &ToponymSet, model: &CostModel<'_>) -> Alignment {
    Matcher::new(graph, toponyms, model).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CostWeights, EditCosts};
    use crate::core::context::ScoringSession;
    use crate::core::relation::{Direction, Relation, SpatialTriple};
    use crate::core::types::{Candidate, Criterion, Toponym, ToponymType};
    use crate::spi::{KbGraph, ShortestPathIndex};
    use std::sync::Arc;

    fn entry(toponym: &str, candidate: &str, value: f32) -> CriterionToponymCandidate {
        CriterionToponymCandidate {
            toponym: toponym.into(),
            candidate: Arc::new(Candidate {
                resource: candidate.into(),
                label: Some(candidate.to_string()),
                name: None,
                types: Default::default(),
            }),
            value,
            criterion: Criterion::ScoreText,
        }
    }

    fn toponym(resource: &str, candidates: Vec<CriterionToponymCandidate>) -> Toponym {
        let mut t = Toponym::new(resource.into(), 1, resource, ToponymType::new("ign:Place"));
        t.candidates = candidates;
        t
    }

    fn run(graph: &MiniGraph, toponyms: &ToponymSet, triples: &[SpatialTriple]) -> Alignment {
        let spi = ShortestPathIndex::new(Arc::new(KbGraph::new(triples, &[])), None, 1);
        let session = ScoringSession::new();
        let (weights, costs) = (CostWeights::default(), EditCosts::default());
        let model = CostModel { weights: &weights, costs: &costs, kb_type_namespace: "", spi: &spi, session: &session };
        match_graph(graph, toponyms, &model)
    }

    #[test]
    fn node_without_candidates_is_deleted() {
        let mut graph = MiniGraph::new();
        let a = graph.add_resource("t1".into());
        let b = graph.add_resource("t2".into());
        graph.add_edge(a, Relation::SameBag, b);
        let toponyms = ToponymSet::new(vec![toponym("t1", vec![entry("t1", "c1", 0.9)]), toponym("t2", vec![])]);

        let alignment = run(&graph, &toponyms, &[]);
        let ops = alignment.path.operations();
        assert_eq!(ops.len(), 2);
        let (t1, t2) = (ResourceId::from("t1"), ResourceId::from("t2"));
        assert!(ops.iter().any(|op| matches!(op, EditOperation::Deletion { source, .. } if *source == t2)));
        assert!(ops.iter().any(|op| matches!(op, EditOperation::Substitution { source, .. } if *source == t1)));
        assert!(alignment.unmatched_targets.is_empty());
    }

    #[test]
    fn accepted_path_covers_every_node() {
        let mut graph = MiniGraph::new();
        let ids: Vec<NodeId> = ["t1", "t2", "t3"].iter().map(|r| graph.add_resource((*r).into())).collect();
        graph.add_edge(ids[0], Relation::Spatial(Direction::North), ids[1]);
        graph.add_edge(ids[1], Relation::SameRoute, ids[2]);
        let toponyms = ToponymSet::new(vec![
            toponym("t1", vec![entry("t1", "c1", 0.9), entry("t1", "c1b", 0.6)]),
            toponym("t2", vec![entry("t2", "c2", 0.7)]),
            toponym("t3", vec![entry("t3", "c3", 0.55)]),
        ]);
        let triples = [SpatialTriple::new("c1", Direction::South, "c2")];

        let alignment = run(&graph, &toponyms, &triples);
        let sources: HashSet<ResourceId> = ["t1", "t2", "t3"].iter().map(|r| (*r).into()).collect();
        let targets: HashSet<ResourceId> = ["c1", "c1b", "c2", "c3"].iter().map(|r| (*r).into()).collect();
        assert_eq!(alignment.path.used_sources(), sources);
        assert!(alignment.completed().is_complete(&sources, &targets));
        assert_eq!(alignment.unmatched_targets, vec![ResourceId::from("c1b")]);
    }

    #[test]
    fn most_constrained_node_is_matched_first() {
        let mut graph = MiniGraph::new();
        let ids: Vec<NodeId> = ["t1", "t2", "t3"].iter().map(|r| graph.add_resource((*r).into())).collect();
        graph.add_edge(ids[0], Relation::SameBag, ids[1]);
        graph.add_edge(ids[1], Relation::Spatial(Direction::East), ids[2]);
        let toponyms = ToponymSet::new(vec![toponym("t1", vec![]), toponym("t2", vec![]), toponym("t3", vec![])]);

        let alignment = run(&graph, &toponyms, &[]);
        assert_eq!(alignment.path.operations()[0].source(), Some(&ResourceId::from("t2")));
        assert!((alignment.cost() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn empty_graph_yields_empty_alignment() {
        let alignment = run(&MiniGraph::new(), &ToponymSet::default(), &[]);
        assert!(alignment.path.is_empty());
        assert!(alignment.unmatched_targets.is_empty());
    }
}
