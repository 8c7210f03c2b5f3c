use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_AMBIGUITY_MARGIN: f64 = 0.10;
pub const DEFAULT_MIN_FUZZY_LENGTH: usize = 5;
pub const DEFAULT_ISOLATION_THRESHOLD: usize = 0;
pub const DEFAULT_COMMUNITY_RESOLUTION: f64 = 1.0;
pub const DEFAULT_MAX_COMMUNITY_PASSES: usize = 100;

/// How repeated nominations of the same pair contribute to edge weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Weight 1 per distinct (from, to, relation) pair.
    Binary,
    /// Weight grows with every mention.
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClosenessMode {
    /// Distances follow edge direction, measured along incoming paths.
    Directed,
    /// Edge direction is ignored.
    Undirected,
}

/// Tunables for one analysis run.
///
/// Every field has an explicit default so a missing or partial TOML file
/// yields a fully specified configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Minimum normalized edit similarity for two names to merge.
    pub similarity_threshold: f64,
    /// Scores in `[threshold - margin, threshold)` are reported as ambiguous.
    pub ambiguity_margin: f64,
    /// Names shorter than this (in characters, after normalization) only merge on exact match.
    pub min_fuzzy_length: usize,
    /// Nodes with total degree at or below this are flagged isolated.
    pub isolation_threshold: usize,
    pub weight_mode: WeightMode,
    pub closeness_mode: ClosenessMode,
    pub allow_self_loops: bool,
    pub community_resolution: f64,
    pub max_community_passes: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            ambiguity_margin: DEFAULT_AMBIGUITY_MARGIN,
            min_fuzzy_length: DEFAULT_MIN_FUZZY_LENGTH,
            isolation_threshold: DEFAULT_ISOLATION_THRESHOLD,
            weight_mode: WeightMode::Frequency,
            closeness_mode: ClosenessMode::Directed,
            allow_self_loops: false,
            community_resolution: DEFAULT_COMMUNITY_RESOLUTION,
            max_community_passes: DEFAULT_MAX_COMMUNITY_PASSES,
        }
    }
}

impl AnalysisOptions {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let options: Self = toml::from_str(raw).context("invalid analysis options")?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read options from {}", path.display()))?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            anyhow::bail!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            );
        }
        if !(0.0..1.0).contains(&self.ambiguity_margin) {
            anyhow::bail!(
                "ambiguity_margin must be in [0, 1), got {}",
                self.ambiguity_margin
            );
        }
        if self.community_resolution <= 0.0 || !self.community_resolution.is_finite() {
            anyhow::bail!(
                "community_resolution must be positive, got {}",
                self.community_resolution
            );
        }
        if self.max_community_passes == 0 {
            anyhow::bail!("max_community_passes must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_explicit() {
        let options = AnalysisOptions::default();
        assert_eq!(options.similarity_threshold, 0.85);
        assert_eq!(options.isolation_threshold, 0);
        assert_eq!(options.weight_mode, WeightMode::Frequency);
        assert!(!options.allow_self_loops);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let options = AnalysisOptions::from_toml_str(
            "similarity_threshold = 0.9\nweight_mode = \"binary\"\n",
        )
        .unwrap();
        assert_eq!(options.similarity_threshold, 0.9);
        assert_eq!(options.weight_mode, WeightMode::Binary);
        assert_eq!(options.closeness_mode, ClosenessMode::Directed);
        assert_eq!(options.min_fuzzy_length, DEFAULT_MIN_FUZZY_LENGTH);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(AnalysisOptions::from_toml_str("similarity_threshold = 1.5").is_err());
        assert!(AnalysisOptions::from_toml_str("community_resolution = 0.0").is_err());
    }

    #[test]
    fn load_without_path_uses_defaults() {
        let options = AnalysisOptions::load(None).unwrap();
        assert_eq!(options, AnalysisOptions::default());
    }
}
