// src/spi.rs
//! Shortest-path index over the knowledge base's spatial subgraph.

use crate::core::relation::{Direction, SpatialTriple};
use crate::core::types::ResourceId;
use crate::persistence;
use crate::sources::{or_empty, AdministrativeEdge, RelationStore};
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Spatial subgraph of the KB, closed under symmetry: `a north b` also yields `b south a`.
#[derive(Debug, Default)]
pub struct KbGraph {
    /// Sorted by URI; the position (1-based) names the tree file of a resource.
    resources: Vec<ResourceId>,
    index: HashMap<ResourceId, usize>,
    adjacency: Vec<Vec<(usize, Direction)>>,
    parents: HashMap<ResourceId, ResourceId>,
}

impl KbGraph {
    pub fn new(triples: &[SpatialTriple], administrative: &[AdministrativeEdge]) -> Self {
        let mut resources: Vec<ResourceId> = triples
            .iter()
            .flat_map(|t| [t.subject.clone(), t.object.clone()])
            .collect();
        resources.sort();
        resources.dedup();
        let index: HashMap<ResourceId, usize> =
            resources.iter().enumerate().map(|(i, r)| (r.clone(), i)).collect();

        let mut adjacency = vec![Vec::new(); resources.len()];
        for t in triples {
            let (Some(&s), Some(&o)) = (index.get(&t.subject), index.get(&t.object)) else {
                continue;
            };
            if s == o {
                continue;
            }
            adjacency[s].push((o, t.direction));
            adjacency[o].push((s, t.direction.opposite()));
        }
        for edges in &mut adjacency {
            edges.sort_unstable();
            edges.dedup();
        }

        let mut ranked: Vec<&AdministrativeEdge> = administrative.iter().collect();
        ranked.sort_by_key(|e| e.level);
        let mut parents = HashMap::new();
        for edge in ranked {
            if edge.resource != edge.parent {
                parents.entry(edge.resource.clone()).or_insert_with(|| edge.parent.clone());
            }
        }

        Self { resources, index, adjacency, parents }
    }

    /// Reads the graph from a relation store; an unavailable store yields an empty graph.
    pub fn from_store(store: &dyn RelationStore) -> Self {
        let triples = or_empty("KB spatial relations", store.spatial_triples());
        let administrative = or_empty("KB administrative relations", store.administrative_edges());
        Self::new(&triples, &administrative)
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, resource: &ResourceId) -> bool {
        self.index.contains_key(resource)
    }

    /// 1-based file number of the resource's tree.
    pub fn file_index(&self, resource: &ResourceId) -> Option<usize> {
        self.index.get(resource).map(|i| i + 1)
    }

    /// Department, else region, else province.
    pub fn administrative_parent(&self, resource: &ResourceId) -> Option<&ResourceId> {
        self.parents.get(resource)
    }

    /// Single-source shortest paths (unit weights) from `source`.
    pub fn shortest_path_tree(&self, source: &ResourceId) -> Option<ShortestPathTree> {
        let &start = self.index.get(source)?;
        let n = self.resources.len();
        let mut dist = vec![u32::MAX; n];
        let mut parent: Vec<Option<(usize, Direction)>> = vec![None; n];
        let mut heap = BinaryHeap::new();
        dist[start] = 0;
        heap.push(Reverse((0u32, start)));
        while let Some(Reverse((d, u))) = heap.pop() {
            if d > dist[u] {
                continue;
            }
            for &(v, direction) in &self.adjacency[u] {
                let nd = d + 1;
                if nd < dist[v] {
                    dist[v] = nd;
                    parent[v] = Some((u, direction));
                    heap.push(Reverse((nd, v)));
                }
            }
        }

        let mut reached: Vec<usize> = (0..n).filter(|&v| dist[v] != u32::MAX).collect();
        reached.sort_by_key(|&v| (dist[v], v));
        let mut position = vec![usize::MAX; n];
        for (i, &v) in reached.iter().enumerate() {
            position[v] = i;
        }
        let nodes = reached
            .iter()
            .map(|&v| TreeNode {
                resource: self.resources[v].clone(),
                distance: dist[v],
                parent: parent[v].map(|(p, direction)| (position[p] as u32, direction)),
            })
            .collect();
        Some(ShortestPathTree::new(source.clone(), nodes))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TreeNode {
    resource: ResourceId,
    distance: u32,
    /// Position of the parent node and the KB predicate leading from it.
    parent: Option<(u32, Direction)>,
}

/// One KB statement walked along a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub from: ResourceId,
    pub direction: Direction,
    pub to: ResourceId,
}

/// Shortest paths from one KB resource to every resource it reaches.
///
/// Only `source` and `nodes` are persisted; the lookup table is rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortestPathTree {
    source: ResourceId,
    nodes: Vec<TreeNode>,
    #[serde(skip)]
    lookup: HashMap<ResourceId, usize>,
}

impl PartialEq for ShortestPathTree {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.nodes == other.nodes
    }
}

impl ShortestPathTree {
    fn new(source: ResourceId, nodes: Vec<TreeNode>) -> Self {
        let mut tree = Self { source, nodes, lookup: HashMap::new() };
        tree.reindex();
        tree
    }

    pub(crate) fn reindex(&mut self) {
        self.lookup = self.nodes.iter().enumerate().map(|(i, n)| (n.resource.clone(), i)).collect();
    }

    pub fn source(&self) -> &ResourceId {
        &self.source
    }

    pub fn reachable(&self) -> usize {
        self.nodes.len()
    }

    pub fn distance(&self, target: &ResourceId) -> Option<u32> {
        self.lookup.get(target).map(|&i| self.nodes[i].distance)
    }

    /// The statements from the source to `target`, in walking order.
    pub fn path_edges(&self, target: &ResourceId) -> Option<Vec<PathStep>> {
        let mut at = *self.lookup.get(target)?;
        let mut steps = Vec::with_capacity(self.nodes[at].distance as usize);
        while let Some((parent, direction)) = self.nodes[at].parent {
            let parent = parent as usize;
            // parents always sit before their children
            if parent >= at {
                return None;
            }
            steps.push(PathStep {
                from: self.nodes[parent].resource.clone(),
                direction,
                to: self.nodes[at].resource.clone(),
            });
            at = parent;
        }
        steps.reverse();
        Some(steps)
    }
}

/// Picks the resources whose trees answer every (subject, object) pair:
/// greedily, the resource touching the most uncovered pairs first.
pub fn cover_pairs(graph: &KbGraph, pairs: &[(ResourceId, ResourceId)]) -> Vec<ResourceId> {
    let mut open: Vec<&(ResourceId, ResourceId)> = pairs
        .iter()
        .filter(|(a, b)| a != b && (graph.contains(a) || graph.contains(b)))
        .collect();
    let mut chosen = Vec::new();
    while !open.is_empty() {
        let mut counts: HashMap<&ResourceId, usize> = HashMap::new();
        for (a, b) in &open {
            for r in [a, b] {
                if graph.contains(r) {
                    *counts.entry(r).or_insert(0) += 1;
                }
            }
        }
        let Some(best) = counts
            .into_iter()
            .max_by(|x, y| x.1.cmp(&y.1).then_with(|| y.0.cmp(x.0)))
            .map(|(r, _)| r.clone())
        else {
            break;
        };
        open.retain(|(a, b)| *a != best && *b != best);
        chosen.push(best);
    }
    chosen
}

/// Lazily loaded shortest-path trees, used as a distance oracle.
///
/// Trees come from the serialization directory when one is configured and
/// are computed from the in-memory graph otherwise. The cache lives until
/// [`ShortestPathIndex::clear`].
pub struct ShortestPathIndex {
    graph: Arc<KbGraph>,
    directory: Option<PathBuf>,
    proxy_depth: usize,
    cache: RwLock<HashMap<ResourceId, Option<Arc<ShortestPathTree>>>>,
}

impl ShortestPathIndex {
    pub fn new(graph: Arc<KbGraph>, directory: Option<PathBuf>, proxy_depth: usize) -> Self {
        Self { graph, directory, proxy_depth, cache: RwLock::new(HashMap::new()) }
    }

    pub fn graph(&self) -> &KbGraph {
        &self.graph
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<ResourceId, Option<Arc<ShortestPathTree>>>> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<ResourceId, Option<Arc<ShortestPathTree>>>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, resource: &ResourceId) -> Option<ShortestPathTree> {
        match &self.directory {
            Some(dir) => {
                let index = self.graph.file_index(resource)?;
                match persistence::load_tree(&persistence::tree_path(dir, index)) {
                    Ok(tree) => Some(tree),
                    Err(e) => {
                        warn!("shortest-path tree of {resource} unreadable: {e}");
                        None
                    }
                }
            }
            None => self.graph.shortest_path_tree(resource),
        }
    }

    /// The tree rooted at `resource`, if the resource is part of the spatial subgraph.
    pub fn get(&self, resource: &ResourceId) -> Option<Arc<ShortestPathTree>> {
        if !self.graph.contains(resource) {
            return None;
        }
        if let Some(hit) = self.read_cache().get(resource) {
            return hit.clone();
        }
        let tree = self.load(resource).map(Arc::new);
        self.write_cache().insert(resource.clone(), tree.clone());
        tree
    }

    /// Loads the given trees in parallel; returns how many are available.
    pub fn preload(&self, resources: &[ResourceId]) -> usize {
        let available = resources.par_iter().filter(|r| self.get(r).is_some()).count();
        debug!("preloaded {available}/{} shortest-path trees", resources.len());
        available
    }

    pub fn cached(&self) -> usize {
        self.read_cache().len()
    }

    pub fn clear(&self) {
        self.write_cache().clear();
    }

    fn either_way(&self, a: &ResourceId, b: &ResourceId) -> Option<u32> {
        self.get(a)
            .and_then(|t| t.distance(b))
            .or_else(|| self.get(b).and_then(|t| t.distance(a)))
    }

    /// Hop count between two resources in either direction.
    ///
    /// When neither endpoint has a tree, each is replaced by its
    /// administrative parent, at most `proxy_depth` times.
    pub fn path_length(&self, a: &ResourceId, b: &ResourceId) -> Option<u32> {
        let mut a = a.clone();
        let mut b = b.clone();
        for _ in 0..=self.proxy_depth {
            if self.get(&a).is_some() || self.get(&b).is_some() {
                return self.either_way(&a, &b);
            }
            let pa = self.graph.administrative_parent(&a).cloned().unwrap_or_else(|| a.clone());
            let pb = self.graph.administrative_parent(&b).cloned().unwrap_or_else(|| b.clone());
            if pa == a && pb == b {
                return None;
            }
            a = pa;
            b = pb;
        }
        None
    }

    /// Hop count of the path from `a` to `b`, accepted only if most of its
    /// statements agree with the text relation `a <direction> b`.
    pub fn directed_path_length(&self, a: &ResourceId, b: &ResourceId, direction: Direction) -> Option<u32> {
        let (steps, allowed) = match self.get(a) {
            Some(tree) => (tree.path_edges(b)?, direction.compatible_kb()),
            None => (self.get(b)?.path_edges(a)?, direction.compatible_kb_reversed()),
        };
        let good = steps.iter().filter(|s| allowed.contains(&s.direction)).count();
        if !steps.is_empty() && 2 * good > steps.len() {
            Some(steps.len() as u32)
        } else {
            None
        }
    }

    /// Resources of the subgraph touched by a set of pairs, for [`cover_pairs`].
    pub fn resources_to_preload(&self, pairs: &[(ResourceId, ResourceId)]) -> Vec<ResourceId> {
        let unique: HashSet<(ResourceId, ResourceId)> = pairs.iter().cloned().collect();
        let pairs: Vec<(ResourceId, ResourceId)> = unique.into_iter().collect();
        cover_pairs(&self.graph, &pairs)
    }
}
