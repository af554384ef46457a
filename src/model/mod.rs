//! Model interface consumed by the attribution engine
//!
//! The engine never trains anything. It only needs a probability interface:
//! - [`Classifier`] - the capability every explained model provides
//! - [`FnClassifier`] - adapter for plain prediction closures
//! - [`TreeClassifier`] - decision tree whose structure can be inspected
//! - [`LogisticClassifier`] - linear softmax model
//! - [`ModelSpec`] - JSON model definitions used by the CLI

mod linear;
mod tree;

pub use linear::LogisticClassifier;
pub use tree::{TreeClassifier, TreeNode};

use crate::error::{ExplainError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A trained probabilistic classifier.
///
/// Implementations must be deterministic and side-effect free: the engine
/// calls `predict_proba` many times on synthetic rows, possibly from
/// several threads at once.
pub trait Classifier: Send + Sync {
    /// Per-class probabilities, one row per observation
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Predicted class index per observation (argmax of the probabilities)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.map_axis(Axis(1), |row| argmax(row.iter().copied())))
    }

    /// Input width the model was built for, if it declares one
    fn n_features(&self) -> Option<usize> {
        None
    }

    /// Inspectable tree structure, for exact path-based attribution
    fn tree(&self) -> Option<&TreeClassifier> {
        None
    }
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        (**self).predict_proba(x)
    }

    fn n_features(&self) -> Option<usize> {
        (**self).n_features()
    }

    fn tree(&self) -> Option<&TreeClassifier> {
        (**self).tree()
    }
}

/// Black-box classifier backed by a prediction closure
pub struct FnClassifier<F>
where
    F: Fn(&Array2<f64>) -> Result<Array2<f64>> + Send + Sync,
{
    predict_fn: F,
    n_features: Option<usize>,
}

impl<F> FnClassifier<F>
where
    F: Fn(&Array2<f64>) -> Result<Array2<f64>> + Send + Sync,
{
    /// Wrap a closure returning per-class probabilities
    pub fn new(predict_fn: F) -> Self {
        Self {
            predict_fn,
            n_features: None,
        }
    }

    /// Declare the expected input width
    pub fn with_n_features(mut self, n_features: usize) -> Self {
        self.n_features = Some(n_features);
        self
    }
}

impl<F> Classifier for FnClassifier<F>
where
    F: Fn(&Array2<f64>) -> Result<Array2<f64>> + Send + Sync,
{
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        (self.predict_fn)(x)
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }
}

/// Serialized model definition, tagged by `"type"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    Tree(TreeClassifier),
    Logistic(LogisticClassifier),
}

/// Model definition as parsed, before structural checks
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawModelSpec {
    Tree(tree::RawTree),
    Logistic(linear::RawLogistic),
}

impl TryFrom<RawModelSpec> for ModelSpec {
    type Error = ExplainError;

    fn try_from(raw: RawModelSpec) -> Result<Self> {
        Ok(match raw {
            RawModelSpec::Tree(tree) => ModelSpec::Tree(tree.try_into()?),
            RawModelSpec::Logistic(model) => ModelSpec::Logistic(model.try_into()?),
        })
    }
}

impl ModelSpec {
    /// Load and validate a model definition from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let raw: RawModelSpec = serde_json::from_reader(std::io::BufReader::new(file))?;
        raw.try_into()
    }

    /// Parse and validate a model definition from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawModelSpec = serde_json::from_str(json)?;
        raw.try_into()
    }

    /// Structural checks that serde cannot express
    pub fn validate(&self) -> Result<()> {
        match self {
            ModelSpec::Tree(tree) => tree.validate(),
            ModelSpec::Logistic(model) => model.validate(),
        }
    }

    /// Short model kind label
    pub fn kind(&self) -> &'static str {
        match self {
            ModelSpec::Tree(_) => "tree",
            ModelSpec::Logistic(_) => "logistic",
        }
    }

    /// Number of output classes
    pub fn n_classes(&self) -> usize {
        match self {
            ModelSpec::Tree(tree) => tree.n_classes(),
            ModelSpec::Logistic(model) => model.n_classes(),
        }
    }

    /// Class names from the definition, or `class_0..class_{C-1}`
    pub fn class_names(&self) -> Vec<String> {
        let declared = match self {
            ModelSpec::Tree(tree) => &tree.class_names,
            ModelSpec::Logistic(model) => &model.class_names,
        };
        if declared.is_empty() {
            default_names("class", self.n_classes())
        } else {
            declared.clone()
        }
    }
}

impl Classifier for ModelSpec {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            ModelSpec::Tree(tree) => tree.predict_proba(x),
            ModelSpec::Logistic(model) => model.predict_proba(x),
        }
    }

    fn n_features(&self) -> Option<usize> {
        match self {
            ModelSpec::Tree(tree) => Classifier::n_features(tree),
            ModelSpec::Logistic(model) => Classifier::n_features(model),
        }
    }

    fn tree(&self) -> Option<&TreeClassifier> {
        match self {
            ModelSpec::Tree(tree) => Some(tree),
            ModelSpec::Logistic(_) => None,
        }
    }
}

/// `prefix_0..prefix_{n-1}`
pub fn default_names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}_{}", prefix, i)).collect()
}

/// Call `predict_proba` and reject malformed output.
///
/// Checks the row count, the class count (when `n_classes` is known) and
/// that every entry is finite.
pub(crate) fn predict_checked(
    model: &(impl Classifier + ?Sized),
    x: &Array2<f64>,
    n_classes: Option<usize>,
) -> Result<Array2<f64>> {
    let proba = model.predict_proba(x)?;

    if proba.nrows() != x.nrows() {
        return Err(ExplainError::schema(
            format!("{} prediction rows", x.nrows()),
            format!("{} prediction rows", proba.nrows()),
        ));
    }
    if let Some(c) = n_classes {
        if proba.ncols() != c {
            return Err(ExplainError::schema(
                format!("{} classes", c),
                format!("{} classes", proba.ncols()),
            ));
        }
    }
    if let Some(((row, class), value)) = proba.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(ExplainError::NonFiniteOutput(format!(
            "predict_proba returned {} at row {}, class {}",
            value, row, class
        )));
    }

    Ok(proba)
}

/// Index of the largest value; the first one wins on ties
fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn constant_model(p: f64) -> FnClassifier<impl Fn(&Array2<f64>) -> Result<Array2<f64>> + Send + Sync> {
        FnClassifier::new(move |x: &Array2<f64>| {
            let mut out = Array2::zeros((x.nrows(), 2));
            out.column_mut(0).fill(1.0 - p);
            out.column_mut(1).fill(p);
            Ok(out)
        })
    }

    #[test]
    fn test_predict_argmax() {
        let model = constant_model(0.8);
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let labels = model.predict(&x).unwrap();
        assert_eq!(labels.to_vec(), vec![1, 1]);
    }

    #[test]
    fn test_argmax_ties_pick_first() {
        assert_eq!(argmax([0.5, 0.5].into_iter()), 0);
        assert_eq!(argmax([0.2, 0.4, 0.4].into_iter()), 1);
    }

    #[test]
    fn test_predict_checked_rejects_nan() {
        let model = FnClassifier::new(|x: &Array2<f64>| {
            let mut out = Array2::from_elem((x.nrows(), 2), 0.5);
            out[[0, 1]] = f64::NAN;
            Ok(out)
        });
        let x = array![[1.0]];
        let err = predict_checked(&model, &x, Some(2)).unwrap_err();
        assert!(matches!(err, ExplainError::NonFiniteOutput(_)));
    }

    #[test]
    fn test_predict_checked_rejects_class_count() {
        let model = constant_model(0.3);
        let x = array![[1.0]];
        let err = predict_checked(&model, &x, Some(3)).unwrap_err();
        assert!(matches!(err, ExplainError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_model_spec_from_json() {
        let json = r#"{
            "type": "logistic",
            "coefficients": [[1.0, -1.0]],
            "intercepts": [0.0]
        }"#;
        let spec = ModelSpec::from_json(json).unwrap();
        assert_eq!(spec.kind(), "logistic");
        assert_eq!(spec.n_classes(), 2);
        assert_eq!(spec.class_names(), vec!["class_0", "class_1"]);
        assert!(spec.tree().is_none());
    }

    #[test]
    fn test_model_spec_tree_exposes_structure() {
        let json = r#"{
            "type": "tree",
            "n_features": 1,
            "class_names": ["no", "yes"],
            "root": {
                "split": {
                    "feature": 0,
                    "threshold": 0.5,
                    "left": { "leaf": { "distribution": [0.9, 0.1] } },
                    "right": { "leaf": { "distribution": [0.2, 0.8] } }
                }
            }
        }"#;
        let spec = ModelSpec::from_json(json).unwrap();
        assert!(spec.tree().is_some());
        assert_eq!(spec.class_names(), vec!["no", "yes"]);
        assert_eq!(Classifier::n_features(&spec), Some(1));
    }
}
