// src/core/types.rs
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a node, shared by the text graph and the knowledge base.
///
/// Named resources compare by URI, ignoring case. Anonymous (blank) resources
/// compare by their handle only and never equal a named resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceId {
    Named(String),
    Anonymous(String),
}

const BLANK_PREFIX: &str = "_:";

impl ResourceId {
    pub fn named(uri: impl Into<String>) -> Self {
        ResourceId::Named(uri.into())
    }

    pub fn anonymous(handle: impl Into<String>) -> Self {
        ResourceId::Anonymous(handle.into())
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, ResourceId::Anonymous(_))
    }

    /// The last segment of the URI (after the final `/` or `#`).
    pub fn local_name(&self) -> &str {
        match self {
            ResourceId::Named(uri) => uri.rsplit(['/', '#']).next().unwrap_or(uri),
            ResourceId::Anonymous(handle) => handle,
        }
    }

    fn folded(s: &str) -> impl Iterator<Item = char> + '_ {
        s.chars().flat_map(char::to_lowercase)
    }
}

/// Explicit form of the identity rule used everywhere graphs are compared.
pub fn same_resource(a: &ResourceId, b: &ResourceId) -> bool {
    match (a, b) {
        (ResourceId::Named(x), ResourceId::Named(y)) => {
            ResourceId::folded(x).eq(ResourceId::folded(y))
        }
        (ResourceId::Anonymous(x), ResourceId::Anonymous(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        same_resource(self, other)
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ResourceId::Named(uri) => {
                0u8.hash(state);
                for c in ResourceId::folded(uri) {
                    c.hash(state);
                }
            }
            ResourceId::Anonymous(handle) => {
                1u8.hash(state);
                handle.hash(state);
            }
        }
    }
}

impl Ord for ResourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ResourceId::Named(x), ResourceId::Named(y)) => {
                ResourceId::folded(x).cmp(ResourceId::folded(y))
            }
            (ResourceId::Anonymous(x), ResourceId::Anonymous(y)) => x.cmp(y),
            (ResourceId::Named(_), ResourceId::Anonymous(_)) => Ordering::Less,
            (ResourceId::Anonymous(_), ResourceId::Named(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for ResourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        match s.strip_prefix(BLANK_PREFIX) {
            Some(handle) => ResourceId::Anonymous(handle.to_string()),
            None => ResourceId::Named(s),
        }
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId::from(s.to_string())
    }
}

impl From<ResourceId> for String {
    fn from(r: ResourceId) -> Self {
        match r {
            ResourceId::Named(uri) => uri,
            ResourceId::Anonymous(handle) => format!("{BLANK_PREFIX}{handle}"),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Named(uri) => f.write_str(uri),
            ResourceId::Anonymous(handle) => write!(f, "{BLANK_PREFIX}{handle}"),
        }
    }
}

/// A knowledge-base entity that may be proposed as a referent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub resource: ResourceId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub types: BTreeSet<String>,
}

/// Semantic type of a mention, as written by the annotator (e.g. `City`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToponymType(pub String);

impl ToponymType {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// The generic place type matches any candidate.
    pub fn is_generic_place(&self) -> bool {
        self.0.ends_with("Place")
    }

    /// The knowledge-base type this mention type maps to.
    pub fn kb_type(&self, namespace: &str) -> String {
        let local = self.0.rsplit([':', '/', '#']).next().unwrap_or(&self.0);
        format!("{namespace}{local}")
    }
}

/// Which scoring criterion produced a [`CriterionToponymCandidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    ScoreText,
}

/// The score of one candidate for one toponym under one criterion.
#[derive(Debug, Clone)]
pub struct CriterionToponymCandidate {
    pub toponym: ResourceId,
    pub candidate: Arc<Candidate>,
    pub value: f32,
    pub criterion: Criterion,
}

impl CriterionToponymCandidate {
    pub fn resource(&self) -> &ResourceId {
        &self.candidate.resource
    }
}

/// Memoized breakdown of one substitution cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionCostResult {
    pub deleted: ResourceId,
    pub inserted: ResourceId,
    pub label_cost: f32,
    pub link_cost: f32,
    pub rlsp_cost: f32,
    pub type_cost: f32,
    pub total_cost: f32,
}

/// Resolution state of a toponym.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Referent {
    #[default]
    Unresolved,
    /// No valid candidate: the mention was deleted.
    Nil,
    Resolved(ResourceId),
}

impl Referent {
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            Referent::Resolved(r) => Some(r),
            Referent::Unresolved | Referent::Nil => None,
        }
    }
}

/// A place-name mention of the annotated text.
#[derive(Debug, Clone)]
pub struct Toponym {
    /// Graph node standing for the mention.
    pub resource: ResourceId,
    /// Text anchor. Not unique: both readings of an ambiguous waypoint share it.
    pub xml_id: i64,
    pub name: String,
    pub kind: ToponymType,
    /// Ranked, best first.
    pub candidates: Vec<CriterionToponymCandidate>,
    pub referent: Referent,
    pub cost: Option<SubstitutionCostResult>,
}

impl Toponym {
    pub fn new(resource: ResourceId, xml_id: i64, name: impl Into<String>, kind: ToponymType) -> Self {
        Self {
            resource,
            xml_id,
            name: name.into(),
            kind,
            candidates: Vec::new(),
            referent: Referent::Unresolved,
            cost: None,
        }
    }

    pub fn candidate(&self, resource: &ResourceId) -> Option<&CriterionToponymCandidate> {
        self.candidates.iter().find(|c| c.resource() == resource)
    }

    pub fn resolve(&mut self, referent: ResourceId, cost: Option<SubstitutionCostResult>) {
        self.referent = Referent::Resolved(referent);
        self.cost = cost;
    }

    pub fn mark_nil(&mut self) {
        self.referent = Referent::Nil;
        self.cost = None;
    }

    /// Back to unresolved, unless the mention was already pruned to nil.
    pub fn clear(&mut self) {
        if self.referent != Referent::Nil {
            self.referent = Referent::Unresolved;
        }
        self.cost = None;
    }
}

/// All toponyms of a document, addressable by their graph resource.
#[derive(Debug, Clone, Default)]
pub struct ToponymSet {
    toponyms: Vec<Toponym>,
    by_resource: HashMap<ResourceId, usize>,
}

impl ToponymSet {
    pub fn new(toponyms: Vec<Toponym>) -> Self {
        let mut set = Self::default();
        for toponym in toponyms {
            set.insert(toponym);
        }
        set
    }

    /// Inserts a mention; a second mention with the same resource replaces the first.
    pub fn insert(&mut self, toponym: Toponym) {
        match self.by_resource.get(&toponym.resource) {
            Some(&idx) => self.toponyms[idx] = toponym,
            None => {
                self.by_resource.insert(toponym.resource.clone(), self.toponyms.len());
                self.toponyms.push(toponym);
            }
        }
    }

    pub fn get(&self, resource: &ResourceId) -> Option<&Toponym> {
        self.by_resource.get(resource).map(|&idx| &self.toponyms[idx])
    }

    pub fn get_mut(&mut self, resource: &ResourceId) -> Option<&mut Toponym> {
        self.by_resource.get(resource).map(|&idx| &mut self.toponyms[idx])
    }

    pub fn contains(&self, resource: &ResourceId) -> bool {
        self.by_resource.contains_key(resource)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toponym> {
        self.toponyms.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Toponym> {
        self.toponyms.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.toponyms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toponyms.is_empty()
    }

    /// Other mentions sharing the text anchor of `resource`.
    pub fn twins_of(&self, resource: &ResourceId) -> Vec<ResourceId> {
        let Some(toponym) = self.get(resource) else {
            return Vec::new();
        };
        self.toponyms
            .iter()
            .filter(|t| t.xml_id == toponym.xml_id && t.resource != *resource)
            .map(|t| t.resource.clone())
            .collect()
    }

    /// Mentions grouped by text anchor, in first-seen order.
    pub fn by_xml_id(&self) -> Vec<(i64, Vec<ResourceId>)> {
        let mut groups: Vec<(i64, Vec<ResourceId>)> = Vec::new();
        for toponym in &self.toponyms {
            match groups.iter_mut().find(|(id, _)| *id == toponym.xml_id) {
                Some((_, members)) => members.push(toponym.resource.clone()),
                None => groups.push((toponym.xml_id, vec![toponym.resource.clone()])),
            }
        }
        groups
    }
}

/// What the matcher reports for one toponym.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub xml_id: i64,
    pub resource: ResourceId,
    pub name: String,
    /// `None` is the nil referent.
    pub referent: Option<ResourceId>,
    pub cost: Option<SubstitutionCostResult>,
}

impl From<&Toponym> for Resolution {
    fn from(t: &Toponym) -> Self {
        Self {
            xml_id: t.xml_id,
            resource: t.resource.clone(),
            name: t.name.clone(),
            referent: t.referent.resource().cloned(),
            cost: t.cost.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn named_resources_ignore_case() {
        let a = ResourceId::named("http://fr.dbpedia.org/resource/Lille");
        let b = ResourceId::named("HTTP://FR.DBPEDIA.ORG/resource/lille");
        assert!(same_resource(&a, &b));
        let set: HashSet<ResourceId> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn anonymous_resources_compare_by_handle() {
        let a = ResourceId::anonymous("b1");
        assert_eq!(a, ResourceId::anonymous("b1"));
        assert_ne!(a, ResourceId::anonymous("B1"));
        assert_ne!(a, ResourceId::named("b1"));
        assert_eq!(ResourceId::from("_:b1"), a);
        assert_eq!(String::from(a), "_:b1");
    }

    #[test]
    fn kb_type_uses_local_name() {
        let ns = "http://dbpedia.org/ontology/";
        assert_eq!(ToponymType::new("ign:City").kb_type(ns), "http://dbpedia.org/ontology/City");
        assert!(ToponymType::new("ign:Place").is_generic_place());
        assert!(!ToponymType::new("River").is_generic_place());
    }

    #[test]
    fn clear_keeps_nil() {
        let mut t = Toponym::new("p1".into(), 1, "Lille", ToponymType::new("City"));
        t.mark_nil();
        t.clear();
        assert_eq!(t.referent, Referent::Nil);
        t.resolve("kb".into(), None);
        t.clear();
        assert_eq!(t.referent, Referent::Unresolved);
    }
}
