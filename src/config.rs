// src/config.rs
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Namespace prepended to a mention type to get the KB class it maps to.
    pub kb_type_namespace: String,
    pub candidates: CandidateConfig,
    pub weights: CostWeights,
    pub costs: EditCosts,
    pub spi: SpiConfig,
    pub search: SearchConfig,
}

/// Candidate selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Top-K kept per label.
    pub max_candidates: usize,
    /// Candidates scoring below this similarity are discarded.
    pub threshold: f32,
    pub similarity: SimilarityKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    DamerauLevenshtein,
    TokenOverlap,
}

/// Weights of the four substitution sub-costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub label: f32,
    pub rlsp: f32,
    pub link: f32,
    #[serde(rename = "type")]
    pub kind: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditCosts {
    pub deletion: f32,
    pub insertion: f32,
}

/// Shortest-path index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    /// Directory of precomputed trees. `None` computes trees in memory.
    pub directory: Option<PathBuf>,
    /// How many administrative levels a lookup may climb when no tree covers an endpoint.
    pub proxy_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Score the Alt-variants of a sequence on the rayon pool.
    pub parallel_variants: bool,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            kb_type_namespace: "http://dbpedia.org/ontology/".to_string(),
            candidates: CandidateConfig::default(),
            weights: CostWeights::default(),
            costs: EditCosts::default(),
            spi: SpiConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            threshold: 0.5,
            similarity: SimilarityKind::DamerauLevenshtein,
        }
    }
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            label: 0.4,
            rlsp: 0.4,
            link: 0.1,
            kind: 0.1,
        }
    }
}

impl Default for EditCosts {
    fn default() -> Self {
        Self {
            deletion: 1.0,
            insertion: 1.0,
        }
    }
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            directory: None,
            proxy_depth: 1,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            parallel_variants: false,
        }
    }
}

impl LinkerConfig {
    /// Strict parse of a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from `path`.
    /// Returns `Default` if the file is missing or unparseable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse config at {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                log::debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkerConfig::default();
        assert_eq!(config.candidates.max_candidates, 10);
        assert_eq!(config.candidates.threshold, 0.5);
        assert_eq!(config.weights.label, 0.4);
        assert_eq!(config.weights.kind, 0.1);
        assert_eq!(config.costs.deletion, 1.0);
        assert_eq!(config.spi.proxy_depth, 1);
        assert!(config.spi.directory.is_none());
        assert!(!config.search.parallel_variants);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = LinkerConfig::load(Path::new("/nonexistent/matcher.toml"));
        assert_eq!(config.candidates.max_candidates, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LinkerConfig::from_toml_str(
            r#"
            [candidates]
            max_candidates = 3
            similarity = "token_overlap"

            [weights]
            type = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.candidates.max_candidates, 3);
        assert_eq!(config.candidates.similarity, SimilarityKind::TokenOverlap);
        assert_eq!(config.candidates.threshold, 0.5);
        assert_eq!(config.weights.kind, 0.2);
        assert_eq!(config.weights.rlsp, 0.4);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(LinkerConfig::from_toml_str("[candidates\nmax_candidates = ").is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = LinkerConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized = LinkerConfig::from_toml_str(&serialized).unwrap();
        assert_eq!(deserialized.candidates.max_candidates, config.candidates.max_candidates);
        assert_eq!(deserialized.kb_type_namespace, config.kb_type_namespace);
    }
}
