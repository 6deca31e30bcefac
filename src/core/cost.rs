// src/core/cost.rs
//! Substitution, deletion and insertion costs of the edit-distance search.

use crate::config::{CostWeights, EditCosts};
use crate::core::context::ScoringSession;
use crate::core::minigraph::{Edge, MiniGraph, NodeId};
use crate::core::types::{CriterionToponymCandidate, ResourceId, SubstitutionCostResult, Toponym, ToponymSet};
use crate::spi::ShortestPathIndex;
use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;

/// Referents chosen so far by the running search, keyed by toponym resource.
pub type ReferentOverlay = HashMap<ResourceId, ResourceId>;

/// Everything a cost needs to see of the current search.
pub struct MatchState<'a> {
    pub graph: &'a MiniGraph,
    pub toponyms: &'a ToponymSet,
    pub overlay: &'a ReferentOverlay,
}

impl MatchState<'_> {
    /// Candidates to measure against for neighbour `m`: its chosen referent
    /// when it has one, otherwise its whole candidate list.
    fn neighbour_candidates(&self, m: NodeId) -> Vec<ResourceId> {
        let Some(resource) = self.graph.resource(m) else {
            return Vec::new();
        };
        let Some(toponym) = self.toponyms.get(resource) else {
            return Vec::new();
        };
        let referent = self.overlay.get(resource).or_else(|| toponym.referent.resource());
        if let Some(referent) = referent {
            if let Some(entry) = toponym.candidate(referent) {
                return vec![entry.resource().clone()];
            }
        }
        toponym.candidates.iter().map(|c| c.resource().clone()).collect()
    }
}

/// Shortest length over the longest one observed, ignoring zero-length and
/// unreachable lookups. Defaults to 1 when nothing usable was found.
fn normalized_min(lengths: &[Option<u32>]) -> f32 {
    let max = lengths.iter().flatten().copied().max().unwrap_or(0);
    if max == 0 {
        return 1.0;
    }
    lengths
        .iter()
        .flatten()
        .filter(|&&len| len > 0)
        .map(|&len| len as f32 / max as f32)
        .fold(1.0, f32::min)
}

pub struct CostModel<'a> {
    pub weights: &'a CostWeights,
    pub costs: &'a EditCosts,
    pub kb_type_namespace: &'a str,
    pub spi: &'a ShortestPathIndex,
    pub session: &'a ScoringSession,
}

impl<'a> CostModel<'a> {
    pub fn deletion_cost(&self) -> f32 {
        self.costs.deletion
    }

    pub fn insertion_cost(&self) -> f32 {
        self.costs.insertion
    }

    /// Weighted substitution cost of `toponym` by `candidate`, memoized per pair.
    pub fn substitution(
        &self,
        state: &MatchState<'_>,
        toponym: &Toponym,
        candidate: &CriterionToponymCandidate,
    ) -> SubstitutionCostResult {
        self.session
            .get_or_compute(&toponym.resource, candidate.resource(), || self.compute(state, toponym, candidate))
    }

    fn compute(
        &self,
        state: &MatchState<'_>,
        toponym: &Toponym,
        candidate: &CriterionToponymCandidate,
    ) -> SubstitutionCostResult {
        let label_cost = 1.0 - candidate.value;
        let type_cost = self.type_cost(toponym, candidate);
        let (link_cost, rlsp_cost) = match state.graph.resource_node(&toponym.resource) {
            Some(node) => (
                self.link_cost(state, node, candidate.resource()),
                self.rlsp_cost(state, node, candidate.resource()),
            ),
            None => (1.0, 1.0),
        };
        let w = self.weights;
        let total_cost = w.label * label_cost + w.rlsp * rlsp_cost + w.link * link_cost + w.kind * type_cost;

        let line = format!(
            "{} ({}) -> {} ({label_cost}/{link_cost}/{rlsp_cost}/{type_cost})",
            toponym.resource,
            toponym.name,
            candidate.resource()
        );
        debug!("{line}");
        self.session.record(line);

        SubstitutionCostResult {
            deleted: toponym.resource.clone(),
            inserted: candidate.resource().clone(),
            label_cost,
            link_cost,
            rlsp_cost,
            type_cost,
            total_cost,
        }
    }

    pub fn type_cost(&self, toponym: &Toponym, candidate: &CriterionToponymCandidate) -> f32 {
        if toponym.kind.is_generic_place() {
            return 0.0;
        }
        let wanted = toponym.kind.kb_type(self.kb_type_namespace);
        if candidate.candidate.types.contains(&wanted) {
            0.0
        } else {
            1.0
        }
    }

    /// Mean over the structural edges of `node` of how close `candidate` sits
    /// to the neighbour's candidates in the KB. 1 when there are no such edges.
    pub fn link_cost(&self, state: &MatchState<'_>, node: NodeId, candidate: &ResourceId) -> f32 {
        let edges: Vec<&Edge> = state.graph.incident_edges(node).filter(|e| e.relation.is_structural()).collect();
        if edges.is_empty() {
            return 1.0;
        }
        let sum: f32 = edges
            .iter()
            .map(|edge| {
                let others = state.neighbour_candidates(edge.other(node));
                let lengths: Vec<Option<u32>> = others
                    .par_iter()
                    .map(|end| self.spi.path_length(candidate, end))
                    .collect();
                normalized_min(&lengths)
            })
            .sum();
        sum / edges.len() as f32
    }

    /// Same as [`CostModel::link_cost`] over the spatial edges of `node`,
    /// counting only KB paths that mostly agree with the text direction.
    pub fn rlsp_cost(&self, state: &MatchState<'_>, node: NodeId, candidate: &ResourceId) -> f32 {
        let edges: Vec<&Edge> = state.graph.incident_edges(node).filter(|e| e.relation.is_spatial()).collect();
        if edges.is_empty() {
            return 1.0;
        }
        let sum: f32 = edges
            .iter()
            .map(|edge| {
                let Some(direction) = edge.relation.direction() else {
                    return 1.0;
                };
                let node_is_subject = edge.subject == node;
                let others = state.neighbour_candidates(edge.other(node));
                let lengths: Vec<Option<u32>> = others
                    .par_iter()
                    .map(|end| {
                        if node_is_subject {
                            self.spi.directed_path_length(candidate, end, direction)
                        } else {
                            self.spi.directed_path_length(end, candidate, direction)
                        }
                    })
                    .collect();
                normalized_min(&lengths)
            })
            .sum();
        sum / edges.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relation::{Direction, Relation, SpatialTriple};
    use crate::core::types::{Candidate, Criterion, ToponymType};
    use crate::spi::KbGraph;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    const DBO: &str = "http://dbpedia.org/ontology/";

    fn kb(s: &str) -> ResourceId {
        ResourceId::named(format!("http://kb/{s}"))
    }

    fn entry(toponym: &str, candidate: &str, value: f32, kind: &str) -> CriterionToponymCandidate {
        CriterionToponymCandidate {
            toponym: toponym.into(),
            candidate: Arc::new(Candidate {
                resource: kb(candidate),
                label: Some(candidate.to_string()),
                name: None,
                types: BTreeSet::from([format!("{DBO}{kind}")]),
            }),
            value,
            criterion: Criterion::ScoreText,
        }
    }

    struct Fixture {
        spi: ShortestPathIndex,
        session: ScoringSession,
        weights: CostWeights,
        costs: EditCosts,
        graph: MiniGraph,
        toponyms: ToponymSet,
    }

    impl Fixture {
        /// t1 north-of t2 in the text; KB: c1 --south--> m --south--> c2, far --east--> c2
        fn new() -> Self {
            let graph_kb = KbGraph::new(
                &[
                    SpatialTriple::new(kb("c1"), Direction::South, kb("m")),
                    SpatialTriple::new(kb("m"), Direction::South, kb("c2")),
                    SpatialTriple::new(kb("far"), Direction::East, kb("c2")),
                ],
                &[],
            );
            let mut graph = MiniGraph::new();
            let t1 = graph.add_resource("t1".into());
            let t2 = graph.add_resource("t2".into());
            graph.add_edge(t1, Relation::Spatial(Direction::North), t2);

            let mut a = Toponym::new("t1".into(), 1, "C1", ToponymType::new("ign:City"));
            a.candidates = vec![entry("t1", "c1", 0.9, "City"), entry("t1", "far", 0.6, "Village")];
            let mut b = Toponym::new("t2".into(), 2, "C2", ToponymType::new("ign:City"));
            b.candidates = vec![entry("t2", "c2", 0.8, "City")];

            Self {
                spi: ShortestPathIndex::new(Arc::new(graph_kb), None, 1),
                session: ScoringSession::new(),
                weights: CostWeights::default(),
                costs: EditCosts::default(),
                graph,
                toponyms: ToponymSet::new(vec![a, b]),
            }
        }

        fn model(&self) -> CostModel<'_> {
            CostModel {
                weights: &self.weights,
                costs: &self.costs,
                kb_type_namespace: DBO,
                spi: &self.spi,
                session: &self.session,
            }
        }
    }

    #[test]
    fn normalized_min_defaults_to_one() {
        assert_eq!(normalized_min(&[]), 1.0);
        assert_eq!(normalized_min(&[None, Some(0)]), 1.0);
        assert_eq!(normalized_min(&[Some(2), Some(4), None]), 0.5);
    }

    #[test]
    fn direction_consistent_path_scores_spatial_cost() {
        let f = Fixture::new();
        let overlay = ReferentOverlay::new();
        let state = MatchState { graph: &f.graph, toponyms: &f.toponyms, overlay: &overlay };
        let t1 = f.toponyms.get(&"t1".into()).unwrap();
        let node = f.graph.resource_node(&t1.resource).unwrap();

        // single reachable candidate: its length is also the max
        assert_eq!(f.model().rlsp_cost(&state, node, &kb("c1")), 1.0);
        assert_eq!(f.model().link_cost(&state, node, &kb("c1")), 1.0);

        // the object side walks the reversed table: c2 -> c1 is north, north
        let t2 = f.graph.resource_node(&"t2".into()).unwrap();
        let toponym = f.toponyms.get(&"t2".into()).unwrap();
        let model = f.model();
        let sub = model.substitution(&state, toponym, &toponym.candidates[0]);
        assert_eq!(sub.type_cost, 0.0);
        assert!(sub.rlsp_cost <= 1.0);
        assert_eq!(model.spi.directed_path_length(&kb("c1"), &kb("c2"), Direction::North), Some(2));
        assert!(model.rlsp_cost(&state, t2, &kb("c2")) <= 1.0);
    }

    #[test]
    fn type_mismatch_costs_one() {
        let f = Fixture::new();
        let t1 = f.toponyms.get(&"t1".into()).unwrap();
        assert_eq!(f.model().type_cost(t1, &t1.candidates[0]), 0.0);
        assert_eq!(f.model().type_cost(t1, &t1.candidates[1]), 1.0);

        let place = Toponym::new("p".into(), 9, "X", ToponymType::new("ign:Place"));
        assert_eq!(f.model().type_cost(&place, &t1.candidates[1]), 0.0);
    }

    #[test]
    fn lower_similarity_costs_more() {
        let f = Fixture::new();
        let overlay = ReferentOverlay::new();
        let state = MatchState { graph: &f.graph, toponyms: &f.toponyms, overlay: &overlay };
        let t1 = f.toponyms.get(&"t1".into()).unwrap();
        let good = f.model().substitution(&state, t1, &entry("t1", "c1", 0.9, "City"));

        let g = Fixture::new();
        let state = MatchState { graph: &g.graph, toponyms: &g.toponyms, overlay: &overlay };
        let t1 = g.toponyms.get(&"t1".into()).unwrap();
        let worse = g.model().substitution(&state, t1, &entry("t1", "c1", 0.7, "City"));
        assert!(worse.total_cost > good.total_cost);
    }

    #[test]
    fn substitution_is_computed_once_per_pair() {
        let f = Fixture::new();
        let overlay = ReferentOverlay::new();
        let state = MatchState { graph: &f.graph, toponyms: &f.toponyms, overlay: &overlay };
        let t1 = f.toponyms.get(&"t1".into()).unwrap();
        let model = f.model();
        let a = model.substitution(&state, t1, &t1.candidates[0]);
        let b = model.substitution(&state, t1, &t1.candidates[0]);
        assert_eq!(a.total_cost.to_bits(), b.total_cost.to_bits());
        assert_eq!(a, b);
        assert_eq!(f.session.computations(), 1);
    }
}
