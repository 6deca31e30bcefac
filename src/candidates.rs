// src/candidates.rs
use crate::config::CandidateConfig;
use crate::core::types::{Candidate, Criterion, CriterionToponymCandidate, ResourceId, ToponymSet};
use crate::fuzzy::SimilarityOracle;
use log::{debug, info};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Ranked candidate lookup over the knowledge-base pool.
pub struct CandidateIndex {
    pool: Vec<Arc<Candidate>>,
    oracle: Box<dyn SimilarityOracle>,
    threshold: f32,
    max_candidates: usize,
}

impl CandidateIndex {
    /// Builds the index. Records of the same resource are merged (types are
    /// unioned); records with neither a label nor a name are dropped.
    pub fn new(records: Vec<Candidate>, oracle: Box<dyn SimilarityOracle>, config: &CandidateConfig) -> Self {
        let mut merged: BTreeMap<ResourceId, Candidate> = BTreeMap::new();
        for record in records {
            if record.label.is_none() && record.name.is_none() {
                continue;
            }
            match merged.get_mut(&record.resource) {
                Some(existing) => {
                    existing.types.extend(record.types);
                    if existing.label.is_none() {
                        existing.label = record.label;
                    }
                    if existing.name.is_none() {
                        existing.name = record.name;
                    }
                }
                None => {
                    merged.insert(record.resource.clone(), record);
                }
            }
        }
        info!("{} candidates in the pool", merged.len());
        Self {
            pool: merged.into_values().map(Arc::new).collect(),
            oracle,
            threshold: config.threshold,
            max_candidates: config.max_candidates,
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Candidates for `label`, best first, thresholded and truncated to top-K.
    pub fn rank(&self, label: &str) -> Vec<(Arc<Candidate>, f32)> {
        // Similarity per distinct candidate string; synonymous candidates share it.
        let mut memo: HashMap<&str, f32> = HashMap::new();
        let mut scored: Vec<(Arc<Candidate>, f32)> = Vec::new();
        for candidate in &self.pool {
            let mut best = 0.0f32;
            for text in [candidate.name.as_deref(), candidate.label.as_deref()].into_iter().flatten() {
                let score = *memo
                    .entry(text)
                    .or_insert_with(|| self.oracle.similarity(label, text));
                best = best.max(score);
            }
            if best >= self.threshold {
                scored.push((Arc::clone(candidate), best));
            }
        }
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.resource.cmp(&b.0.resource))
        });
        scored.truncate(self.max_candidates);
        scored
    }

    /// Fills the candidate list of every toponym. Labels are scored once each, in parallel.
    pub fn assign(&self, toponyms: &mut ToponymSet) {
        let mut labels: Vec<&str> = toponyms.iter().map(|t| t.name.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();

        let ranked: HashMap<String, Vec<(Arc<Candidate>, f32)>> = labels
            .par_iter()
            .map(|label| (label.to_string(), self.rank(label)))
            .collect();
        debug!("ranked {} distinct labels", ranked.len());

        for toponym in toponyms.iter_mut() {
            let Some(list) = ranked.get(&toponym.name) else {
                continue;
            };
            toponym.candidates = list
                .iter()
                .map(|(candidate, score)| CriterionToponymCandidate {
                    toponym: toponym.resource.clone(),
                    candidate: Arc::clone(candidate),
                    value: *score,
                    criterion: Criterion::ScoreText,
                })
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Toponym, ToponymType};
    use crate::fuzzy::DamerauLevenshtein;
    use std::collections::BTreeSet;

    fn candidate(uri: &str, label: &str, kind: &str) -> Candidate {
        Candidate {
            resource: ResourceId::named(uri),
            label: Some(label.to_string()),
            name: None,
            types: BTreeSet::from([kind.to_string()]),
        }
    }

    fn index(records: Vec<Candidate>, max: usize) -> CandidateIndex {
        let config = CandidateConfig { max_candidates: max, ..CandidateConfig::default() };
        CandidateIndex::new(records, Box::new(DamerauLevenshtein), &config)
    }

    #[test]
    fn duplicate_records_merge_types() {
        let idx = index(
            vec![
                candidate("http://kb/Lille", "Lille", "City"),
                candidate("http://KB/lille", "Lille", "Place"),
                Candidate {
                    resource: ResourceId::named("http://kb/x"),
                    label: None,
                    name: None,
                    types: BTreeSet::new(),
                },
            ],
            10,
        );
        assert_eq!(idx.len(), 1);
        let ranked = idx.rank("Lille");
        assert_eq!(ranked[0].0.types.len(), 2);
    }

    #[test]
    fn rank_applies_threshold_order_and_top_k() {
        let idx = index(
            vec![
                candidate("http://kb/Lillers", "Lillers", "City"),
                candidate("http://kb/Lille", "Lille", "City"),
                candidate("http://kb/Lyon", "Lyon", "City"),
                candidate("http://kb/Lilles", "Lilles", "City"),
            ],
            2,
        );
        let ranked = idx.rank("Lille");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0.resource, ResourceId::named("http://kb/Lille"));
        assert!(ranked[0].1 >= ranked[1].1);
        assert!(ranked.iter().all(|(c, _)| c.label.as_deref() != Some("Lyon")));
    }

    #[test]
    fn toponyms_sharing_a_label_share_the_selection() {
        let idx = index(vec![candidate("http://kb/Arras", "Arras", "City")], 10);
        let mut set = ToponymSet::new(vec![
            Toponym::new("t1".into(), 1, "Arras", ToponymType::new("City")),
            Toponym::new("t2".into(), 2, "Arras", ToponymType::new("City")),
            Toponym::new("t3".into(), 3, "Zzyzx", ToponymType::new("City")),
        ]);
        idx.assign(&mut set);
        let t1 = set.get(&"t1".into()).unwrap();
        let t2 = set.get(&"t2".into()).unwrap();
        assert_eq!(t1.candidates.len(), 1);
        assert_eq!(t1.candidates[0].resource(), t2.candidates[0].resource());
        assert_eq!(t2.candidates[0].toponym, ResourceId::from("t2"));
        assert!(set.get(&"t3".into()).unwrap().candidates.is_empty());
    }
}
