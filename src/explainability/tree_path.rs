//! Exact TreeSHAP for decision trees.
//!
//! Implements the polynomial-time path algorithm from Lundberg et al. (2020):
//! "From local explanations to global understanding with explainable AI for trees".
//!
//! Node covers are counted by routing the background rows through the tree,
//! so the expected value of the path game equals the mean model output over
//! the background and the attributions add up to `f(x) - baseline`.

use crate::error::{ExplainError, Result};
use crate::model::{TreeClassifier, TreeNode};
use ndarray::{Array2, ArrayView1};

/// One element of the unique feature path
#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// Split feature; `None` for the root placeholder
    feature: Option<usize>,
    /// Fraction of cover flowing this way when the feature is absent
    zero_fraction: f64,
    /// Whether the observation flows this way when the feature is present
    one_fraction: f64,
    /// Permutation weight
    pweight: f64,
}

#[derive(Debug, Clone)]
enum FlatNode {
    Leaf {
        value: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Flattened tree with background covers
#[derive(Debug, Clone)]
pub(crate) struct PathTree {
    /// Nodes in preorder; the root is node 0
    nodes: Vec<FlatNode>,
    /// Leaf distributions, indexed by `FlatNode::Leaf::value`
    values: Vec<Vec<f64>>,
    /// Number of background rows reaching each node
    covers: Vec<f64>,
    n_features: usize,
    n_classes: usize,
}

impl PathTree {
    /// Flatten `tree` and count covers from `background`
    pub fn new(tree: &TreeClassifier, background: &Array2<f64>) -> Result<Self> {
        tree.validate()?;
        if background.ncols() != tree.n_features() {
            return Err(ExplainError::schema(
                format!("{} features", tree.n_features()),
                format!("{} features", background.ncols()),
            ));
        }

        let mut flat = Self {
            nodes: Vec::with_capacity(tree.n_nodes()),
            values: Vec::with_capacity(tree.n_leaves()),
            covers: Vec::new(),
            n_features: tree.n_features(),
            n_classes: tree.n_classes(),
        };
        flat.push_node(tree.root());
        flat.covers = vec![0.0; flat.nodes.len()];

        for row in background.rows() {
            let mut node = 0;
            loop {
                flat.covers[node] += 1.0;
                match flat.nodes[node] {
                    FlatNode::Leaf { .. } => break,
                    FlatNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        node = if row[feature] <= threshold { left } else { right };
                    }
                }
            }
        }

        Ok(flat)
    }

    fn push_node(&mut self, node: &TreeNode) -> usize {
        let index = self.nodes.len();
        match node {
            TreeNode::Leaf { distribution } => {
                self.nodes.push(FlatNode::Leaf {
                    value: self.values.len(),
                });
                self.values.push(distribution.clone());
            }
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                // Placeholder until the children have indices
                self.nodes.push(FlatNode::Leaf { value: usize::MAX });
                let left = self.push_node(left);
                let right = self.push_node(right);
                self.nodes[index] = FlatNode::Split {
                    feature: *feature,
                    threshold: *threshold,
                    left,
                    right,
                };
            }
        }
        index
    }

    /// Cover-weighted mean of the leaf values
    pub fn expected_value(&self) -> Vec<f64> {
        let total = self.covers[0];
        let mut expected = vec![0.0; self.n_classes];
        if total <= 0.0 {
            return expected;
        }
        for (node, cover) in self.nodes.iter().zip(&self.covers) {
            if let FlatNode::Leaf { value } = node {
                for (e, v) in expected.iter_mut().zip(&self.values[*value]) {
                    *e += v * cover / total;
                }
            }
        }
        expected
    }

    /// Contributions `[feature, class]` for one observation
    pub fn shap_values(&self, x: ArrayView1<'_, f64>) -> Array2<f64> {
        let mut phi = Array2::zeros((self.n_features, self.n_classes));
        self.recurse(0, x, &mut phi, &[], 1.0, 1.0, None);
        phi
    }

    /// Recursive TreeSHAP walk.
    ///
    /// `parent_path` is the unique path above `node`; the new element for
    /// the edge into `node` is described by the fractions and `feature`.
    #[allow(clippy::too_many_arguments)]
    fn recurse(
        &self,
        node: usize,
        x: ArrayView1<'_, f64>,
        phi: &mut Array2<f64>,
        parent_path: &[PathElement],
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        let mut path = Vec::with_capacity(parent_path.len() + 1);
        path.extend_from_slice(parent_path);
        extend_path(&mut path, zero_fraction, one_fraction, feature);

        match self.nodes[node] {
            FlatNode::Leaf { value } => {
                let leaf = &self.values[value];
                for i in 1..path.len() {
                    let element = path[i];
                    let Some(f) = element.feature else { continue };
                    let scale =
                        unwound_path_sum(&path, i) * (element.one_fraction - element.zero_fraction);
                    for (c, v) in leaf.iter().enumerate() {
                        phi[[f, c]] += scale * v;
                    }
                }
            }
            FlatNode::Split {
                feature: split,
                threshold,
                left,
                right,
            } => {
                let (hot, cold) = if x[split] <= threshold {
                    (left, right)
                } else {
                    (right, left)
                };

                let cover = self.covers[node];
                let (hot_zero, cold_zero) = if cover > 0.0 {
                    (self.covers[hot] / cover, self.covers[cold] / cover)
                } else {
                    // No background row reaches this node: split the (zero) mass evenly
                    (0.5, 0.5)
                };

                // A feature already on the path is merged into one element
                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = path.iter().position(|e| e.feature == Some(split)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, k);
                }

                for (child, zero, one) in [
                    (hot, hot_zero * incoming_zero, incoming_one),
                    (cold, cold_zero * incoming_zero, 0.0),
                ] {
                    // Both fractions zero: nothing below can contribute
                    if zero == 0.0 && one == 0.0 {
                        continue;
                    }
                    self.recurse(child, x, phi, &path, zero, one, Some(split));
                }
            }
        }
    }
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let scale = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / scale;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / scale;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let scale = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * scale / ((i + 1) as f64 * one);
            next_one_portion = tmp - path[i].pweight * zero * (depth - i) as f64 / scale;
        } else {
            path[i].pweight = path[i].pweight * scale / (zero * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let scale = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = next_one_portion * scale / ((i + 1) as f64 * one);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero * (depth - i) as f64 / scale;
        } else if zero != 0.0 {
            total += path[i].pweight / zero / ((depth - i) as f64 / scale);
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Classifier;
    use ndarray::{array, Axis};

    /// Path-dependent value of coalition `mask`: features in the mask follow
    /// `x`, the others split by cover.
    fn coalition_value(tree: &PathTree, node: usize, x: &[f64], mask: usize) -> Vec<f64> {
        match tree.nodes[node] {
            FlatNode::Leaf { value } => tree.values[value].clone(),
            FlatNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if mask & (1 << feature) != 0 {
                    let next = if x[feature] <= threshold { left } else { right };
                    coalition_value(tree, next, x, mask)
                } else {
                    let cover = tree.covers[node];
                    let (wl, wr) = if cover > 0.0 {
                        (tree.covers[left] / cover, tree.covers[right] / cover)
                    } else {
                        (0.5, 0.5)
                    };
                    let l = coalition_value(tree, left, x, mask);
                    let r = coalition_value(tree, right, x, mask);
                    l.iter().zip(&r).map(|(a, b)| wl * a + wr * b).collect()
                }
            }
        }
    }

    /// Exhaustive Shapley values of the path-dependent game
    fn brute_force(tree: &PathTree, x: &[f64]) -> Array2<f64> {
        let n = tree.n_features;
        let mut phi = Array2::zeros((n, tree.n_classes));
        let fact = |k: usize| (1..=k).map(|v| v as f64).product::<f64>();
        for f in 0..n {
            for mask in 0..(1usize << n) {
                if mask & (1 << f) != 0 {
                    continue;
                }
                let s = mask.count_ones() as usize;
                let w = fact(s) * fact(n - s - 1) / fact(n);
                let with = coalition_value(tree, 0, x, mask | (1 << f));
                let without = coalition_value(tree, 0, x, mask);
                for c in 0..tree.n_classes {
                    phi[[f, c]] += w * (with[c] - without[c]);
                }
            }
        }
        phi
    }

    /// Three features, feature 0 split twice on one path
    fn tree() -> TreeClassifier {
        let root = TreeNode::split(
            0,
            0.5,
            TreeNode::split(
                1,
                0.5,
                TreeNode::leaf(vec![0.9, 0.1]),
                TreeNode::split(
                    0,
                    0.25,
                    TreeNode::leaf(vec![0.7, 0.3]),
                    TreeNode::leaf(vec![0.4, 0.6]),
                ),
            ),
            TreeNode::split(
                2,
                1.0,
                TreeNode::leaf(vec![0.3, 0.7]),
                TreeNode::leaf(vec![0.05, 0.95]),
            ),
        );
        TreeClassifier::new(root, 3).unwrap()
    }

    fn background() -> Array2<f64> {
        array![
            [0.0, 0.0, 0.0],
            [0.1, 1.0, 2.0],
            [0.4, 1.0, 0.5],
            [0.9, 0.0, 0.0],
            [0.8, 1.0, 2.0],
            [0.3, 0.2, 1.5],
            [0.7, 0.7, 1.2],
        ]
    }

    #[test]
    fn test_covers_count_background_rows() {
        let path_tree = PathTree::new(&tree(), &background()).unwrap();
        assert_eq!(path_tree.covers[0], 7.0);
        // Preorder: 0 root, 1 split(f1), 2 leaf, 3 split(f0), 4 leaf, 5 leaf, 6 split(f2), 7 leaf, 8 leaf
        assert_eq!(path_tree.covers[1], 4.0);
        assert_eq!(path_tree.covers[6], 3.0);
        assert_eq!(path_tree.covers[2], 2.0);
        assert_eq!(path_tree.covers[3], 2.0);
    }

    #[test]
    fn test_expected_value_is_background_mean() {
        let t = tree();
        let bg = background();
        let path_tree = PathTree::new(&t, &bg).unwrap();
        let mean = t.predict_proba(&bg).unwrap().mean_axis(Axis(0)).unwrap();
        for (e, m) in path_tree.expected_value().iter().zip(mean.iter()) {
            assert!((e - m).abs() < 1e-12);
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let path_tree = PathTree::new(&tree(), &background()).unwrap();
        for x in [
            array![0.1, 0.9, 0.0],
            array![0.3, 0.9, 3.0],
            array![0.6, 0.0, 0.5],
            array![0.9, 0.9, 1.5],
        ] {
            let fast = path_tree.shap_values(x.view());
            let slow = brute_force(&path_tree, x.as_slice().unwrap());
            for (a, b) in fast.iter().zip(slow.iter()) {
                assert!((a - b).abs() < 1e-10, "fast {} vs brute force {}", a, b);
            }
        }
    }

    #[test]
    fn test_additivity_against_background_mean() {
        let t = tree();
        let bg = background();
        let path_tree = PathTree::new(&t, &bg).unwrap();
        let expected = path_tree.expected_value();

        let x = array![0.3, 0.9, 3.0];
        let phi = path_tree.shap_values(x.view());
        let prediction = t.leaf_distribution(x.as_slice().unwrap());
        for c in 0..2 {
            let total = phi.column(c).sum();
            assert!((total - (prediction[c] - expected[c])).abs() < 1e-10);
        }
        // Feature 2 is never on this observation's path but still matters
        // through the cold branch of the root split
        assert!(phi[[2, 1]].abs() > 0.0);
    }

    #[test]
    fn test_unreached_subtree_is_safe() {
        // Background never reaches the right subtree
        let bg = array![[0.0, 0.0, 0.0], [0.2, 1.0, 0.0]];
        let t = tree();
        let path_tree = PathTree::new(&t, &bg).unwrap();
        let x = array![0.9, 0.0, 2.0];
        let phi = path_tree.shap_values(x.view());
        assert!(phi.iter().all(|v| v.is_finite()));

        let expected = path_tree.expected_value();
        let prediction = t.leaf_distribution(x.as_slice().unwrap());
        for c in 0..2 {
            assert!((phi.column(c).sum() - (prediction[c] - expected[c])).abs() < 1e-10);
        }
    }

    #[test]
    fn test_width_mismatch() {
        let err = PathTree::new(&tree(), &array![[0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, ExplainError::SchemaMismatch { .. }));
    }
}
