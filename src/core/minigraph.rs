// src/core/minigraph.rs
use crate::core::relation::Relation;
use crate::core::types::ResourceId;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Index of a node inside one [`MiniGraph`]. Only meaningful for the graph that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Resource(ResourceId),
    /// Two readings of one waypoint; must be collapsed before matching.
    Alt { first: ResourceId, second: ResourceId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub subject: NodeId,
    pub relation: Relation,
    pub object: NodeId,
}

impl Edge {
    pub fn touches(&self, node: NodeId) -> bool {
        self.subject == node || self.object == node
    }

    /// The endpoint that is not `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.subject == node {
            self.object
        } else {
            self.subject
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltChoice {
    First,
    Second,
}

/// Relation graph of one text sequence (or one Alt-variant of it).
///
/// Nodes are interned: adding the same resource or the same Alt pair twice
/// yields the same [`NodeId`]. Edges are deduplicated. Transformations return
/// a new graph and leave `self` untouched.
#[derive(Debug, Clone, Default)]
pub struct MiniGraph {
    nodes: Vec<Node>,
    index: HashMap<Node, NodeId>,
    edges: Vec<Edge>,
    edge_set: HashSet<Edge>,
}

impl MiniGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        if let Some(&id) = self.index.get(&node) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.index.insert(node.clone(), id);
        self.nodes.push(node);
        id
    }

    pub fn add_resource(&mut self, resource: ResourceId) -> NodeId {
        self.add_node(Node::Resource(resource))
    }

    pub fn add_alt(&mut self, first: ResourceId, second: ResourceId) -> NodeId {
        self.add_node(Node::Alt { first, second })
    }

    /// Adds an edge; returns `false` for duplicates and self-loops.
    pub fn add_edge(&mut self, subject: NodeId, relation: Relation, object: NodeId) -> bool {
        if subject == object {
            return false;
        }
        let edge = Edge { subject, relation, object };
        if !self.edge_set.insert(edge) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_edge(&self, subject: NodeId, relation: Relation, object: NodeId) -> bool {
        self.edge_set.contains(&Edge { subject, relation, object })
    }

    pub fn resource(&self, id: NodeId) -> Option<&ResourceId> {
        match self.node(id) {
            Node::Resource(r) => Some(r),
            Node::Alt { .. } => None,
        }
    }

    /// Node standing for `resource` itself (not an Alt that mentions it).
    pub fn resource_node(&self, resource: &ResourceId) -> Option<NodeId> {
        self.index.get(&Node::Resource(resource.clone())).copied()
    }

    pub fn alt_node(&self, first: &ResourceId, second: &ResourceId) -> Option<NodeId> {
        self.index
            .get(&Node::Alt { first: first.clone(), second: second.clone() })
            .copied()
    }

    pub fn alt_nodes(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, n)| matches!(n, Node::Alt { .. }))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn has_alt(&self) -> bool {
        self.nodes.iter().any(|n| matches!(n, Node::Alt { .. }))
    }

    /// Every resource the graph refers to, including both readings of each Alt.
    pub fn mentioned_resources(&self) -> BTreeSet<ResourceId> {
        let mut out = BTreeSet::new();
        for node in &self.nodes {
            match node {
                Node::Resource(r) => {
                    out.insert(r.clone());
                }
                Node::Alt { first, second } => {
                    out.insert(first.clone());
                    out.insert(second.clone());
                }
            }
        }
        out
    }

    /// Concrete resource nodes, in insertion order. These are the source nodes of a search.
    pub fn source_resources(&self) -> Vec<ResourceId> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Resource(r) => Some(r.clone()),
                Node::Alt { .. } => None,
            })
            .collect()
    }

    pub fn incident_edges(&self, node: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.touches(node))
    }

    /// Whether `resource` is a concrete endpoint of a same-bag/route/sequence edge.
    pub fn is_structural_endpoint(&self, resource: &ResourceId) -> bool {
        match self.resource_node(resource) {
            Some(id) => self
                .incident_edges(id)
                .any(|e| e.relation.is_structural()),
            None => false,
        }
    }

    /// Returns a copy where the Alt node `alt` is replaced by one of its readings.
    ///
    /// Edges touching the discarded reading are dropped along with its node.
    /// Structural edges touching the Alt are rewired to the kept reading.
    pub fn collapse_alt(&self, alt: NodeId, choice: AltChoice) -> MiniGraph {
        let (kept, dropped) = match self.node(alt) {
            Node::Alt { first, second } => match choice {
                AltChoice::First => (first.clone(), second.clone()),
                AltChoice::Second => (second.clone(), first.clone()),
            },
            Node::Resource(_) => return self.clone(),
        };
        let dropped_id = self.resource_node(&dropped);

        let mut out = MiniGraph::new();
        let mut remap: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        for (id, node) in self.nodes() {
            if Some(id) == dropped_id {
                continue;
            }
            let new_id = if id == alt {
                out.add_resource(kept.clone())
            } else {
                out.add_node(node.clone())
            };
            remap[id.index()] = Some(new_id);
        }
        for edge in &self.edges {
            if edge.touches(alt) && edge.relation.is_spatial() {
                continue;
            }
            if let (Some(s), Some(o)) = (remap[edge.subject.index()], remap[edge.object.index()]) {
                out.add_edge(s, edge.relation, o);
            }
        }
        out
    }
}
