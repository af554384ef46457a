//! Shapley feature attribution
//!
//! Explains classifier predictions by splitting `prediction - baseline`
//! between the input features:
//! - Permutation sampling with antithetic orderings (any model)
//! - Exact TreeSHAP for inspectable decision trees
//! - Exhaustive coalition enumeration for small feature counts
//! - Local attributions, ranked views and global importance

mod attribution;
mod config;
mod engine;
mod exact;
mod importance;
mod sampling;
mod tree_path;

pub use attribution::{AttributionMatrix, LocalExplanation};
pub use config::{ExplainStrategy, ExplainerConfig, MAX_EXACT_FEATURES};
pub use engine::AttributionEngine;
pub use importance::{AttributionSummary, GlobalImportance};
