//! Shapley Explain - additive feature attribution for classifiers
//!
//! Given a trained classifier, a background reference set and observations,
//! this crate splits each predicted class probability into per-feature
//! contributions that sum to `prediction - baseline`, and aggregates them
//! into a global feature ranking.
//!
//! # Modules
//!
//! - [`model`] - Classifier interface, tree and logistic models, JSON loading
//! - [`explainability`] - Attribution engine and strategies
//! - [`report`] - JSON reports
//! - [`utils`] - CSV loading
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use shapley_explain::prelude::*;
//! use ndarray::array;
//!
//! # fn main() -> shapley_explain::Result<()> {
//! let model = LogisticClassifier::binary(vec![1.5, -0.5], 0.1);
//! let reference = array![[0.0, 1.0], [1.0, 0.0], [0.5, 0.5]];
//! let engine = AttributionEngine::new(
//!     model,
//!     reference,
//!     vec!["age".into(), "income".into()],
//!     vec!["no".into(), "yes".into()],
//!     ExplainerConfig::default().with_strategy(ExplainStrategy::Exact),
//! )?;
//!
//! let local = engine.explain_local(&array![[2.0, 0.0]])?;
//! assert!(local.verify_additivity(1e-6));
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Models and attribution
pub mod model;
pub mod explainability;

// Output and input
pub mod report;
pub mod utils;

// Services
pub mod cli;

pub use error::{ExplainError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ExplainError, Result};

    // Models
    pub use crate::model::{
        Classifier, FnClassifier, LogisticClassifier, ModelSpec, TreeClassifier, TreeNode,
    };

    // Explainability
    pub use crate::explainability::{
        AttributionEngine, AttributionMatrix, AttributionSummary, ExplainStrategy,
        ExplainerConfig, GlobalImportance, LocalExplanation,
    };

    // Reports
    pub use crate::report::{GlobalReport, LocalReport};

    // Data loading
    pub use crate::utils::{DataLoader, FeatureTable};
}
