// src/fuzzy/similarity.rs
use crate::config::SimilarityKind;

/// A normalized string similarity: 1.0 for identical strings, 0.0 for nothing in common.
pub trait SimilarityOracle: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f32;
}

/// Normalized Damerau-Levenshtein similarity, case-insensitive.
#[derive(Debug, Default, Clone, Copy)]
pub struct DamerauLevenshtein;

impl SimilarityOracle for DamerauLevenshtein {
    fn similarity(&self, a: &str, b: &str) -> f32 {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();
        strsim::normalized_damerau_levenshtein(&a, &b) as f32
    }
}

/// Token-overlap similarity: each token of the shorter string is paired with
/// its best match among the tokens of the other, scores are averaged.
///
/// Tolerates reordered words and separators, e.g. `Saint-Omer` vs `Omer (Saint)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenOverlap;

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl SimilarityOracle for TokenOverlap {
    fn similarity(&self, a: &str, b: &str) -> f32 {
        let (ta, tb) = (tokens(a), tokens(b));
        if ta.is_empty() && tb.is_empty() {
            return 1.0;
        }
        if ta.is_empty() || tb.is_empty() {
            return 0.0;
        }
        let (short, long) = if ta.len() <= tb.len() { (&ta, &tb) } else { (&tb, &ta) };
        let total: f64 = short
            .iter()
            .map(|t| {
                long.iter()
                    .map(|u| strsim::normalized_damerau_levenshtein(t, u))
                    .fold(0.0, f64::max)
            })
            .sum();
        // unmatched tokens of the longer side count as zero
        (total / long.len() as f64) as f32
    }
}

pub fn oracle(kind: SimilarityKind) -> Box<dyn SimilarityOracle> {
    match kind {
        SimilarityKind::DamerauLevenshtein => Box::new(DamerauLevenshtein),
        SimilarityKind::TokenOverlap => Box::new(TokenOverlap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(DamerauLevenshtein.similarity("Lille", "lille"), 1.0);
        assert_eq!(TokenOverlap.similarity("Saint-Omer", "saint omer"), 1.0);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        for (a, b) in [("Lille", "Lyon"), ("", "Paris"), ("Arras", "")] {
            for s in [DamerauLevenshtein.similarity(a, b), TokenOverlap.similarity(a, b)] {
                assert!((0.0..=1.0).contains(&s), "{a} / {b} -> {s}");
            }
        }
    }

    #[test]
    fn transposition_is_cheap() {
        let swapped = DamerauLevenshtein.similarity("Lille", "Lilel");
        let unrelated = DamerauLevenshtein.similarity("Lille", "Dijon");
        assert!(swapped > unrelated);
        assert!(swapped >= 0.8);
    }

    #[test]
    fn token_overlap_ignores_word_order() {
        let s = TokenOverlap.similarity("Omer Saint", "Saint-Omer");
        assert_eq!(s, 1.0);
        assert!(TokenOverlap.similarity("Saint-Omer", "Omer") > 0.4);
    }
}
