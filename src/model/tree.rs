//! Decision tree classifier with an inspectable structure

use super::Classifier;
use crate::error::{ExplainError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Leaf node holding the class distribution it predicts
    Leaf { distribution: Vec<f64> },
    /// Internal node: `x[feature] <= threshold` goes left, everything else
    /// (including NaN) goes right
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    /// Leaf constructor
    pub fn leaf(distribution: Vec<f64>) -> Self {
        TreeNode::Leaf { distribution }
    }

    /// Split constructor
    pub fn split(feature: usize, threshold: f64, left: TreeNode, right: TreeNode) -> Self {
        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }
}

/// Trained decision tree classifier.
///
/// The tree is evaluated, never fitted here: it is built from nodes or
/// deserialized from JSON and checked with [`TreeClassifier::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTree")]
pub struct TreeClassifier {
    /// Tree root
    root: TreeNode,
    /// Number of input features
    n_features: usize,
    /// Optional class labels, one per distribution entry
    #[serde(default)]
    pub class_names: Vec<String>,
}

/// Unchecked wire form of [`TreeClassifier`]
#[derive(Deserialize)]
pub(crate) struct RawTree {
    root: TreeNode,
    n_features: usize,
    #[serde(default)]
    class_names: Vec<String>,
}

impl TryFrom<RawTree> for TreeClassifier {
    type Error = ExplainError;

    fn try_from(raw: RawTree) -> Result<Self> {
        let tree = Self {
            root: raw.root,
            n_features: raw.n_features,
            class_names: raw.class_names,
        };
        tree.validate()?;
        Ok(tree)
    }
}

impl TreeClassifier {
    /// Create a tree and validate its structure
    pub fn new(root: TreeNode, n_features: usize) -> Result<Self> {
        let tree = Self {
            root,
            n_features,
            class_names: Vec::new(),
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Set class labels
    pub fn with_class_names(mut self, names: Vec<String>) -> Self {
        self.class_names = names;
        self
    }

    /// Check feature indices, thresholds and leaf distributions
    pub fn validate(&self) -> Result<()> {
        let n_classes = first_leaf(&self.root).len();
        if n_classes == 0 {
            return Err(ExplainError::InvalidModel(
                "leaf distributions must not be empty".to_string(),
            ));
        }
        if !self.class_names.is_empty() && self.class_names.len() != n_classes {
            return Err(ExplainError::InvalidModel(format!(
                "{} class names for {} classes",
                self.class_names.len(),
                n_classes
            )));
        }
        self.validate_node(&self.root, n_classes)
    }

    fn validate_node(&self, node: &TreeNode, n_classes: usize) -> Result<()> {
        match node {
            TreeNode::Leaf { distribution } => {
                if distribution.len() != n_classes {
                    return Err(ExplainError::InvalidModel(format!(
                        "leaf distribution has {} entries, expected {}",
                        distribution.len(),
                        n_classes
                    )));
                }
                if distribution.iter().any(|p| !p.is_finite() || *p < 0.0) {
                    return Err(ExplainError::InvalidModel(format!(
                        "leaf distribution {:?} must be finite and non-negative",
                        distribution
                    )));
                }
                Ok(())
            }
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= self.n_features {
                    return Err(ExplainError::InvalidModel(format!(
                        "split on feature {} but the tree has {} features",
                        feature, self.n_features
                    )));
                }
                if !threshold.is_finite() {
                    return Err(ExplainError::InvalidModel(format!(
                        "split threshold {} on feature {} is not finite",
                        threshold, feature
                    )));
                }
                self.validate_node(left, n_classes)?;
                self.validate_node(right, n_classes)
            }
        }
    }

    /// Tree root
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Number of input features
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of classes (length of every leaf distribution)
    pub fn n_classes(&self) -> usize {
        first_leaf(&self.root).len()
    }

    /// Distribution of the leaf reached by `sample`.
    ///
    /// Entries past the end of `sample` count as missing and go right.
    pub fn leaf_distribution(&self, sample: &[f64]) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if goes_left(sample, *feature, *threshold) { &**left } else { &**right };
                }
            }
        }
    }

    /// Preorder index of the leaf reached by `sample`
    pub fn leaf_index(&self, sample: &[f64]) -> usize {
        let mut node = &self.root;
        let mut index = 0;
        loop {
            match node {
                TreeNode::Leaf { .. } => return index,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if goes_left(sample, *feature, *threshold) {
                        index += 1;
                        node = &**left;
                    } else {
                        index += 1 + count_nodes(left);
                        node = &**right;
                    }
                }
            }
        }
    }

    /// Get tree depth (a single leaf has depth 1)
    pub fn depth(&self) -> usize {
        node_depth(&self.root)
    }

    /// Get number of leaves
    pub fn n_leaves(&self) -> usize {
        count_leaves(&self.root)
    }

    /// Get number of nodes
    pub fn n_nodes(&self) -> usize {
        count_nodes(&self.root)
    }
}

impl Classifier for TreeClassifier {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(ExplainError::schema(
                format!("{} features", self.n_features),
                format!("{} features", x.ncols()),
            ));
        }

        let n_classes = self.n_classes();
        let mut out = Array2::zeros((x.nrows(), n_classes));
        let mut sample = vec![0.0; self.n_features];
        for (i, row) in x.rows().into_iter().enumerate() {
            sample.iter_mut().zip(row.iter()).for_each(|(s, v)| *s = *v);
            let distribution = self.leaf_distribution(&sample);
            if distribution.len() != n_classes {
                return Err(ExplainError::InvalidModel(format!(
                    "leaf distribution has {} entries, expected {}",
                    distribution.len(),
                    n_classes
                )));
            }
            for (c, p) in distribution.iter().enumerate() {
                out[[i, c]] = *p;
            }
        }
        Ok(out)
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn tree(&self) -> Option<&TreeClassifier> {
        Some(self)
    }
}

#[inline]
fn goes_left(sample: &[f64], feature: usize, threshold: f64) -> bool {
    sample.get(feature).is_some_and(|v| *v <= threshold)
}

fn first_leaf(node: &TreeNode) -> &[f64] {
    match node {
        TreeNode::Leaf { distribution } => distribution,
        TreeNode::Split { left, .. } => first_leaf(left),
    }
}

fn node_depth(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
    }
}

fn count_leaves(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => count_leaves(left) + count_leaves(right),
    }
}

fn count_nodes(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => 1 + count_nodes(left) + count_nodes(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_level_tree() -> TreeClassifier {
        // f0 <= 0.5 ? (f1 <= 1.0 ? A : B) : C
        let root = TreeNode::split(
            0,
            0.5,
            TreeNode::split(
                1,
                1.0,
                TreeNode::leaf(vec![0.9, 0.1]),
                TreeNode::leaf(vec![0.6, 0.4]),
            ),
            TreeNode::leaf(vec![0.2, 0.8]),
        );
        TreeClassifier::new(root, 2).unwrap()
    }

    #[test]
    fn test_predict_proba_routes_samples() {
        let tree = two_level_tree();
        let x = array![[0.0, 0.0], [0.0, 2.0], [1.0, 0.0]];
        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba, array![[0.9, 0.1], [0.6, 0.4], [0.2, 0.8]]);
    }

    #[test]
    fn test_nan_goes_right() {
        let tree = two_level_tree();
        let proba = tree.predict_proba(&array![[f64::NAN, 0.0]]).unwrap();
        assert_eq!(proba, array![[0.2, 0.8]]);
    }

    #[test]
    fn test_structure_stats() {
        let tree = two_level_tree();
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.n_nodes(), 5);
        assert_eq!(tree.n_classes(), 2);
    }

    #[test]
    fn test_leaf_index_is_preorder() {
        let tree = two_level_tree();
        assert_eq!(tree.leaf_index(&[0.0, 0.0]), 2);
        assert_eq!(tree.leaf_index(&[0.0, 2.0]), 3);
        assert_eq!(tree.leaf_index(&[1.0, 0.0]), 4);
    }

    #[test]
    fn test_width_mismatch() {
        let tree = two_level_tree();
        let err = tree.predict_proba(&array![[0.0, 0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, ExplainError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_feature() {
        let root = TreeNode::split(3, 0.5, TreeNode::leaf(vec![1.0]), TreeNode::leaf(vec![0.0]));
        let err = TreeClassifier::new(root, 2).unwrap_err();
        assert!(matches!(err, ExplainError::InvalidModel(_)));
    }

    #[test]
    fn test_validate_rejects_ragged_leaves() {
        let root = TreeNode::split(
            0,
            0.5,
            TreeNode::leaf(vec![0.5, 0.5]),
            TreeNode::leaf(vec![1.0]),
        );
        assert!(TreeClassifier::new(root, 1).is_err());
    }

    #[test]
    fn test_deserialize_rejects_bad_feature() {
        let json = r#"{"n_features": 2, "root": {"split": {"feature": 7, "threshold": 0.5,
            "left": {"leaf": {"distribution": [1.0, 0.0]}},
            "right": {"leaf": {"distribution": [0.0, 1.0]}}}}}"#;
        let err = serde_json::from_str::<TreeClassifier>(json).unwrap_err();
        assert!(err.to_string().contains("feature 7"), "{}", err);
    }

    #[test]
    fn test_deserialize_rejects_class_name_count() {
        let json = r#"{"n_features": 1, "class_names": ["a"],
            "root": {"leaf": {"distribution": [0.5, 0.5]}}}"#;
        assert!(serde_json::from_str::<TreeClassifier>(json).is_err());
    }

    #[test]
    fn test_short_sample_goes_right() {
        let tree = two_level_tree();
        assert_eq!(tree.leaf_distribution(&[]), &[0.2, 0.8]);
        assert_eq!(tree.leaf_distribution(&[0.0]), &[0.6, 0.4]);
    }

    #[test]
    fn test_json_roundtrip() {
        let tree = two_level_tree().with_class_names(vec!["a".into(), "b".into()]);
        let json = serde_json::to_string(&tree).unwrap();
        let back: TreeClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back.root(), tree.root());
        assert_eq!(back.class_names, vec!["a", "b"]);
    }
}
