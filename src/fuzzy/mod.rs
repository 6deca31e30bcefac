// src/fuzzy/mod.rs
pub mod similarity;

pub use similarity::{oracle, DamerauLevenshtein, SimilarityOracle, TokenOverlap};
