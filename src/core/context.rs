// File: src/core/context.rs
use crate::core::types::{ResourceId, SubstitutionCostResult};
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type PairKey = (ResourceId, ResourceId);

/// Per-sequence scoring state: the substitution-cost memo and the cost log.
///
/// The memo is append-only and keyed by (toponym resource, candidate resource);
/// the first result stored for a key is the one every later lookup sees.
#[derive(Debug, Default)]
pub struct ScoringSession {
    memo: Mutex<HashMap<PairKey, SubstitutionCostResult>>,
    computations: AtomicUsize,
    log: Mutex<BTreeSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScoringSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, toponym: &ResourceId, candidate: &ResourceId) -> Option<SubstitutionCostResult> {
        lock(&self.memo).get(&(toponym.clone(), candidate.clone())).cloned()
    }

    /// Returns the memoized result for the pair, computing it on first use.
    ///
    /// `compute` runs without the memo lock held, so it may itself use the rayon pool.
    pub fn get_or_compute<F>(&self, toponym: &ResourceId, candidate: &ResourceId, compute: F) -> SubstitutionCostResult
    where
        F: FnOnce() -> SubstitutionCostResult,
    {
        if let Some(hit) = self.get(toponym, candidate) {
            return hit;
        }
        let fresh = compute();
        self.computations.fetch_add(1, Ordering::Relaxed);
        lock(&self.memo)
            .entry((toponym.clone(), candidate.clone()))
            .or_insert(fresh)
            .clone()
    }

    /// How many times a cost was actually computed.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        lock(&self.memo).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&self, line: String) {
        lock(&self.log).insert(line);
    }

    /// Emits the sorted cost log and empties the session.
    pub fn close(&self) {
        let lines = std::mem::take(&mut *lock(&self.log));
        for line in &lines {
            debug!("{line}");
        }
        lock(&self.memo).clear();
        self.computations.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(total: f32) -> SubstitutionCostResult {
        SubstitutionCostResult {
            deleted: "t".into(),
            inserted: "c".into(),
            label_cost: total,
            link_cost: 1.0,
            rlsp_cost: 1.0,
            type_cost: 0.0,
            total_cost: total,
        }
    }

    #[test]
    fn second_lookup_is_served_from_the_memo() {
        let session = ScoringSession::new();
        let (t, c) = ("t".into(), "c".into());
        let first = session.get_or_compute(&t, &c, || result(0.25));
        let second = session.get_or_compute(&t, &c, || result(0.75));
        assert_eq!(first, second);
        assert_eq!(second.total_cost.to_bits(), 0.25f32.to_bits());
        assert_eq!(session.computations(), 1);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn close_empties_the_session() {
        let session = ScoringSession::new();
        session.get_or_compute(&"t".into(), &"c".into(), || result(0.5));
        session.record("t -> c".to_string());
        session.close();
        assert!(session.is_empty());
        assert_eq!(session.computations(), 0);
    }
}
