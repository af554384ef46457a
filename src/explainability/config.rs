//! Explainer configuration

use crate::error::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest feature count accepted by [`ExplainStrategy::Exact`]
pub const MAX_EXACT_FEATURES: usize = 16;

/// How Shapley values are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExplainStrategy {
    /// Permutation sampling with antithetic orderings; works on any model
    MonteCarlo {
        /// Number of sampled orderings (each is also evaluated reversed)
        n_permutations: usize,
    },
    /// Exact polynomial-time TreeSHAP; needs an inspectable tree
    TreePath,
    /// Exhaustive enumeration of every coalition; small feature counts only
    Exact,
}

impl ExplainStrategy {
    /// Short label used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            ExplainStrategy::MonteCarlo { .. } => "monte_carlo",
            ExplainStrategy::TreePath => "tree_path",
            ExplainStrategy::Exact => "exact",
        }
    }
}

impl Default for ExplainStrategy {
    fn default() -> Self {
        ExplainStrategy::MonteCarlo { n_permutations: 32 }
    }
}

impl std::fmt::Display for ExplainStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplainStrategy::MonteCarlo { n_permutations } => {
                write!(f, "monte_carlo({} permutations)", n_permutations)
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Configuration for the attribution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerConfig {
    /// Attribution strategy
    pub strategy: ExplainStrategy,

    /// Seed for permutation sampling and background subsampling
    pub seed: u64,

    /// Cap on background rows; larger sets are subsampled with `seed`
    pub max_background: Option<usize>,

    /// Wall-clock budget for the sampling loop of one batch, in milliseconds.
    /// Results are only reproducible when this is unset.
    pub time_budget_ms: Option<u64>,

    /// Keep the per-observation attributions inside global results
    pub include_local: bool,

    /// Number of worker threads (None = rayon global pool)
    pub n_workers: Option<usize>,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            strategy: ExplainStrategy::default(),
            seed: 42,
            max_background: None,
            time_budget_ms: None,
            include_local: true,
            n_workers: None,
        }
    }
}

impl ExplainerConfig {
    /// Create a new explainer configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: ExplainerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder method to set the strategy
    pub fn with_strategy(mut self, strategy: ExplainStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builder method for Monte-Carlo sampling with `n` orderings
    pub fn with_permutations(mut self, n: usize) -> Self {
        self.strategy = ExplainStrategy::MonteCarlo { n_permutations: n };
        self
    }

    /// Builder method to set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to cap the background size
    pub fn with_max_background(mut self, n: usize) -> Self {
        self.max_background = Some(n);
        self
    }

    /// Builder method to bound sampling time
    pub fn with_time_budget_ms(mut self, ms: u64) -> Self {
        self.time_budget_ms = Some(ms);
        self
    }

    /// Builder method to keep or drop local attributions in global results
    pub fn with_include_local(mut self, include: bool) -> Self {
        self.include_local = include;
        self
    }

    /// Builder method to set number of workers
    pub fn with_n_workers(mut self, n: usize) -> Self {
        self.n_workers = Some(n);
        self
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if let ExplainStrategy::MonteCarlo { n_permutations } = self.strategy {
            if n_permutations == 0 {
                return Err(ExplainError::invalid(
                    "n_permutations",
                    n_permutations,
                    "at least one ordering is required",
                ));
            }
        }
        if self.max_background == Some(0) {
            return Err(ExplainError::invalid(
                "max_background",
                0,
                "the background needs at least one row",
            ));
        }
        if self.n_workers == Some(0) {
            return Err(ExplainError::invalid("n_workers", 0, "use None for the global pool"));
        }
        Ok(())
    }
}
