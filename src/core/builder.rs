// src/core/builder.rs
//! Mini-graph construction from the structural layout of a document.

use crate::core::minigraph::{AltChoice, MiniGraph, Node, NodeId};
use crate::core::relation::{Relation, SpatialTriple};
use crate::core::types::{ResourceId, ToponymSet};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One row of the structural query: where a spatial reference sits in the text.
///
/// An ambiguous waypoint is described by two rows sharing `waypoint`, each
/// carrying one reading in `spatial_reference_alt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointTuple {
    pub sequence: ResourceId,
    pub route: ResourceId,
    pub bag: ResourceId,
    pub waypoint: ResourceId,
    #[serde(default)]
    pub spatial_reference: Option<ResourceId>,
    #[serde(default)]
    pub spatial_reference_alt: Option<ResourceId>,
    pub id: i64,
}

impl WaypointTuple {
    fn reference(&self) -> Option<&ResourceId> {
        self.spatial_reference.as_ref().or(self.spatial_reference_alt.as_ref())
    }

    /// Numbering carried by the reference's local name, if it has one.
    pub fn numbering(&self) -> Option<f64> {
        self.reference().and_then(|r| parse_ordinal(r.local_name()))
    }
}

/// Parses the numbering of a spatial reference: `12` -> 12.0, `12_3` -> 12.3.
///
/// Only plain decimal digits count, so names such as `Nan` or `Inf` are not numbers.
pub fn parse_ordinal(local: &str) -> Option<f64> {
    let segment = local.rsplit('/').next().unwrap_or(local);
    let number = |s: &str| -> Option<f64> {
        let digits = !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit() || b == b'.');
        digits.then(|| s.parse::<f64>().ok()).flatten().filter(|v| v.is_finite())
    };
    match segment.split_once('_') {
        Some((n, i)) => Some(number(n)? + 0.1 * number(i)?),
        None => number(segment),
    }
}

/// Sorts rows into text order.
///
/// Reference numbering is used only when every row has one; otherwise the
/// tuple ids order the whole set, so the two scales are never mixed.
fn sort_rows(rows: &mut [&WaypointTuple]) {
    let numbered: Option<Vec<f64>> = rows.iter().map(|t| t.numbering()).collect();
    match numbered {
        Some(keys) => {
            let mut keyed: Vec<(f64, &WaypointTuple)> = keys.into_iter().zip(rows.iter().copied()).collect();
            keyed.sort_by(|(ka, a), (kb, b)| ka.total_cmp(kb).then(a.id.cmp(&b.id)));
            for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
                *slot = row;
            }
        }
        None => rows.sort_by_key(|t| t.id),
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Single(ResourceId),
    Alt(ResourceId, ResourceId),
}

struct Bag {
    route: ResourceId,
    id: ResourceId,
    slots: Vec<NodeId>,
}

/// Distinct sequences in document order.
pub fn sequences(tuples: &[WaypointTuple]) -> Vec<ResourceId> {
    let mut sorted: Vec<&WaypointTuple> = tuples.iter().collect();
    sort_rows(&mut sorted);
    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|t| seen.insert(t.sequence.clone()))
        .map(|t| t.sequence.clone())
        .collect()
}

/// Builds the mini-graph of one sequence: the three structural edge families,
/// then the text's spatial relations whose endpoints both belong to the sequence.
pub fn build_sequence_graph(
    tuples: &[WaypointTuple],
    sequence: &ResourceId,
    spatial: &[SpatialTriple],
) -> MiniGraph {
    let mut rows: Vec<&WaypointTuple> = tuples.iter().filter(|t| &t.sequence == sequence).collect();
    sort_rows(&mut rows);

    let mut graph = MiniGraph::new();
    let mut bags: Vec<Bag> = Vec::new();
    let mut i = 0;
    while i < rows.len() {
        let row = rows[i];
        let mut j = i + 1;
        while j < rows.len() && rows[j].waypoint == row.waypoint && rows[j].bag == row.bag {
            j += 1;
        }
        if let Some(slot) = slot_of(&rows[i..j]) {
            let node = match slot {
                Slot::Single(r) => graph.add_resource(r),
                Slot::Alt(a, b) => graph.add_alt(a, b),
            };
            match bags.last_mut() {
                Some(bag) if bag.id == row.bag => {
                    if !bag.slots.contains(&node) {
                        bag.slots.push(node);
                    }
                }
                _ => bags.push(Bag { route: row.route.clone(), id: row.bag.clone(), slots: vec![node] }),
            }
        }
        i = j;
    }

    link_same_bag(&mut graph, &bags);
    link_same_route(&mut graph, &bags);
    link_same_sequence(&mut graph, &bags);
    add_spatial_relations(&mut graph, spatial);
    debug!(
        "sequence {}: {} nodes, {} edges",
        sequence,
        graph.node_count(),
        graph.edge_count()
    );
    graph
}

fn slot_of(rows: &[&WaypointTuple]) -> Option<Slot> {
    let mut readings: Vec<ResourceId> = Vec::new();
    for row in rows {
        if let Some(alt) = &row.spatial_reference_alt {
            if !readings.contains(alt) {
                readings.push(alt.clone());
            }
        }
    }
    match readings.len() {
        0 => rows.iter().find_map(|r| r.spatial_reference.clone()).map(Slot::Single),
        1 => readings.pop().map(Slot::Single),
        _ => {
            let second = readings.swap_remove(1);
            let first = readings.swap_remove(0);
            Some(Slot::Alt(first, second))
        }
    }
}

fn link_all(graph: &mut MiniGraph, from: &[NodeId], to: &[NodeId], relation: Relation) {
    for &s in from {
        for &o in to {
            graph.add_edge(s, relation, o);
        }
    }
}

fn link_same_bag(graph: &mut MiniGraph, bags: &[Bag]) {
    for bag in bags {
        for pair in bag.slots.windows(2) {
            graph.add_edge(pair[0], Relation::SameBag, pair[1]);
        }
    }
}

fn link_same_route(graph: &mut MiniGraph, bags: &[Bag]) {
    for (i, bag) in bags.iter().enumerate() {
        let next = bags[i + 1..].iter().find(|b| b.route == bag.route && b.id != bag.id);
        if let Some(next) = next {
            link_all(graph, &bag.slots, &next.slots, Relation::SameRoute);
        }
    }
}

fn link_same_sequence(graph: &mut MiniGraph, bags: &[Bag]) {
    for pair in bags.windows(2) {
        let (last, first) = (&pair[0], &pair[1]);
        if last.route != first.route {
            link_all(graph, &last.slots, &first.slots, Relation::SameSequence);
        }
    }
}

fn add_spatial_relations(graph: &mut MiniGraph, spatial: &[SpatialTriple]) {
    let present = graph.mentioned_resources();
    for triple in spatial {
        if present.contains(&triple.subject) && present.contains(&triple.object) {
            let s = graph.add_resource(triple.subject.clone());
            let o = graph.add_resource(triple.object.clone());
            graph.add_edge(s, Relation::Spatial(triple.direction), o);
        }
    }
}

/// Expands every Alt node into its two readings, one Alt at a time.
///
/// An Alt whose first reading is already a structural endpoint of a variant
/// produced so far is a duplicate: it is collapsed in place rather than
/// doubling the variant set.
pub fn explode_alts(graph: &MiniGraph) -> Vec<MiniGraph> {
    let mut variants = vec![graph.clone()];
    let alts: Vec<(ResourceId, ResourceId)> = graph
        .alt_nodes()
        .into_iter()
        .filter_map(|id| match graph.node(id) {
            Node::Alt { first, second } => Some((first.clone(), second.clone())),
            Node::Resource(_) => None,
        })
        .collect();

    for (first, second) in alts {
        let duplicate = variants.iter().any(|v| v.is_structural_endpoint(&first));
        let mut next = Vec::with_capacity(variants.len() * 2);
        for variant in &variants {
            let Some(alt) = variant.alt_node(&first, &second) else {
                next.push(variant.clone());
                continue;
            };
            if duplicate {
                let choice = if !variant.is_structural_endpoint(&first)
                    && variant.is_structural_endpoint(&second)
                {
                    AltChoice::Second
                } else {
                    AltChoice::First
                };
                next.push(variant.collapse_alt(alt, choice));
            } else {
                next.push(variant.collapse_alt(alt, AltChoice::First));
                next.push(variant.collapse_alt(alt, AltChoice::Second));
            }
        }
        variants = next;
    }
    variants
}

/// Removes readings of ambiguous waypoints that have no candidate while a
/// sibling reading (same text anchor) does.
///
/// The removed rows disappear, the surviving reading becomes a plain
/// waypoint and the removed toponym is resolved to nil.
pub fn prune_useless_alternatives(tuples: &[WaypointTuple], toponyms: &mut ToponymSet) -> Vec<WaypointTuple> {
    let mut removed: HashSet<ResourceId> = HashSet::new();
    for (xml_id, members) in toponyms.by_xml_id() {
        if members.len() < 2 {
            continue;
        }
        let (empty, with_candidates): (Vec<_>, Vec<_>) = members.iter().partition(|r| {
            toponyms.get(r).map(|t| t.candidates.is_empty()).unwrap_or(true)
        });
        if empty.is_empty() || with_candidates.is_empty() {
            continue;
        }
        for resource in empty {
            info!("dropping candidate-less reading {} of text anchor {}", resource, xml_id);
            removed.insert(resource.clone());
        }
    }
    for resource in &removed {
        if let Some(t) = toponyms.get_mut(resource) {
            t.mark_nil();
        }
    }

    let affected: HashSet<(ResourceId, ResourceId)> = tuples
        .iter()
        .filter(|t| t.reference().map(|r| removed.contains(r)).unwrap_or(false))
        .map(|t| (t.bag.clone(), t.waypoint.clone()))
        .collect();

    tuples
        .iter()
        .filter(|t| !t.reference().map(|r| removed.contains(r)).unwrap_or(false))
        .map(|t| {
            let mut t = t.clone();
            if affected.contains(&(t.bag.clone(), t.waypoint.clone())) {
                if let Some(kept) = t.spatial_reference_alt.take() {
                    t.spatial_reference = Some(kept);
                }
            }
            t
        })
        .collect()
}
