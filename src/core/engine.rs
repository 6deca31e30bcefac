// src/core/engine.rs
use crate::candidates::CandidateIndex;
use crate::config::LinkerConfig;
use crate::core::builder::{build_sequence_graph, explode_alts, prune_useless_alternatives, sequences, WaypointTuple};
use crate::core::context::ScoringSession;
use crate::core::cost::CostModel;
use crate::core::edit::{Alignment, EditOperation, EditPath};
use crate::core::minigraph::MiniGraph;
use crate::core::relation::SpatialTriple;
use crate::core::search::match_graph;
use crate::core::types::{ResourceId, Resolution, Toponym, ToponymSet};
use crate::error::{Error, Result};
use crate::fuzzy;
use crate::persistence;
use crate::sources::{or_empty, AnnotatedDocument, CandidatePoolSource, DocumentSource, KnowledgeBase, RelationStore};
use crate::spi::{KbGraph, ShortestPathIndex};
use log::{debug, info};
use rayon::prelude::*;
use std::cmp::Reverse;
use std::path::Path;
use std::sync::Arc;

/// Links the toponyms of one annotated document to knowledge-base entities.
///
/// The linker owns the document state (toponyms, layout rows, text relations)
/// and the per-sequence caches. [`Linker::compute`] runs the whole pipeline.
pub struct Linker {
    config: LinkerConfig,
    toponyms: ToponymSet,
    tuples: Vec<WaypointTuple>,
    relations: Vec<SpatialTriple>,
    spi: ShortestPathIndex,
    session: ScoringSession,
}

impl Linker {
    /// Reads the document and the KB, and ranks candidates for every toponym.
    ///
    /// A failing source is logged and treated as empty.
    pub fn new(
        document: &dyn DocumentSource,
        relations: &dyn RelationStore,
        pool: &dyn CandidatePoolSource,
        config: LinkerConfig,
    ) -> Self {
        let mut toponyms = ToponymSet::new(
            or_empty("toponyms", document.toponyms())
                .into_iter()
                .map(Toponym::from)
                .collect(),
        );
        let tuples = or_empty("structural tuples", document.waypoint_tuples());
        let text_relations = or_empty("text spatial relations", document.spatial_relations());

        let index = CandidateIndex::new(
            or_empty("candidate pool", pool.candidates()),
            fuzzy::oracle(config.candidates.similarity),
            &config.candidates,
        );
        index.assign(&mut toponyms);

        let graph = Arc::new(KbGraph::from_store(relations));
        info!(
            "linker ready: {} toponyms, {} tuples, {} KB candidates, {} KB resources",
            toponyms.len(),
            tuples.len(),
            index.len(),
            graph.len()
        );
        let spi = ShortestPathIndex::new(graph, config.spi.directory.clone(), config.spi.proxy_depth);

        Self { config, toponyms, tuples, relations: text_relations, spi, session: ScoringSession::new() }
    }

    /// Loads a JSON document and a JSON KB extract from disk.
    pub fn from_paths(document: &Path, kb: &Path, config: LinkerConfig) -> Result<Self> {
        let document = AnnotatedDocument::from_path(document)?;
        let kb = KnowledgeBase::from_path(kb)?;
        Ok(Self::new(&document, &kb, &kb, config))
    }

    pub fn toponyms(&self) -> &ToponymSet {
        &self.toponyms
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// Resolves every sequence of the document, largest first, and reports
    /// one [`Resolution`] per toponym.
    pub fn compute(&mut self) -> Vec<Resolution> {
        let tuples = prune_useless_alternatives(&self.tuples, &mut self.toponyms);

        let mut plans: Vec<(ResourceId, Vec<MiniGraph>)> = sequences(&tuples)
            .into_iter()
            .map(|sequence| {
                let graph = build_sequence_graph(&tuples, &sequence, &self.relations);
                let variants = explode_alts(&graph);
                (sequence, variants)
            })
            .collect();
        plans.sort_by_key(|(_, variants)| Reverse(variants.first().map_or(0, MiniGraph::edge_count)));

        for (sequence, variants) in &plans {
            self.process_sequence(sequence, variants);
        }
        self.toponyms.iter().map(Resolution::from).collect()
    }

    fn process_sequence(&mut self, sequence: &ResourceId, variants: &[MiniGraph]) {
        info!("sequence {sequence}: {} variant(s)", variants.len());
        let pairs = self.edge_candidate_pairs(variants);
        let trees = self.spi.resources_to_preload(&pairs);
        self.spi.preload(&trees);

        if let Some(best) = self.best_alignment(variants) {
            debug!(
                "sequence {sequence}: accepted path of cost {:.3}, {} unmatched target(s)",
                best.cost(),
                best.unmatched_targets.len()
            );
            self.commit(&best.path);
        }

        self.spi.clear();
        self.session.close();
    }

    /// Every (candidate of one endpoint, candidate of the other) pair over the edges of all variants.
    fn edge_candidate_pairs(&self, variants: &[MiniGraph]) -> Vec<(ResourceId, ResourceId)> {
        let mut pairs = Vec::new();
        for graph in variants {
            for edge in graph.edges() {
                let (Some(s), Some(o)) = (graph.resource(edge.subject), graph.resource(edge.object)) else {
                    continue;
                };
                let (Some(s), Some(o)) = (self.toponyms.get(s), self.toponyms.get(o)) else {
                    continue;
                };
                for cs in &s.candidates {
                    for co in &o.candidates {
                        pairs.push((cs.resource().clone(), co.resource().clone()));
                    }
                }
            }
        }
        pairs
    }

    /// Runs the search on every variant and keeps the cheapest path (first one on ties).
    fn best_alignment(&self, variants: &[MiniGraph]) -> Option<Alignment> {
        let model = CostModel {
            weights: &self.config.weights,
            costs: &self.config.costs,
            kb_type_namespace: &self.config.kb_type_namespace,
            spi: &self.spi,
            session: &self.session,
        };
        let toponyms = &self.toponyms;
        let alignments: Vec<Alignment> = if self.config.search.parallel_variants {
            variants.par_iter().map(|g| match_graph(g, toponyms, &model)).collect()
        } else {
            variants.iter().map(|g| match_graph(g, toponyms, &model)).collect()
        };
        alignments.into_iter().min_by(|a, b| a.cost().total_cmp(&b.cost()))
    }

    /// Writes an accepted path back to the toponyms and clears the Alt twins of
    /// every mention it touched.
    fn commit(&mut self, path: &EditPath) {
        for op in path.operations() {
            let Some(source) = op.source() else {
                continue;
            };
            let twins = self.toponyms.twins_of(source);
            match op {
                EditOperation::Substitution { target, .. } => {
                    let cost = self.session.get(source, target);
                    if let Some(toponym) = self.toponyms.get_mut(source) {
                        toponym.resolve(target.clone(), cost);
                    }
                }
                EditOperation::Deletion { .. } => {
                    if let Some(toponym) = self.toponyms.get_mut(source) {
                        toponym.mark_nil();
                    }
                }
                EditOperation::Insertion { .. } => {}
            }
            for twin in twins {
                if let Some(toponym) = self.toponyms.get_mut(&twin) {
                    toponym.clear();
                }
            }
        }
    }

    /// Writes the shortest-path tree of every KB resource to the configured
    /// directory, or to `directory` when given.
    pub fn precompute(&self, directory: Option<&Path>) -> Result<usize> {
        let directory = directory
            .or(self.config.spi.directory.as_deref())
            .ok_or_else(|| Error::unavailable("no shortest-path tree directory configured"))?;
        persistence::precompute_all(self.spi.graph(), directory)
    }
}
