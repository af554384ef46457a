//! Exact Shapley values by enumerating every coalition
//!
//! Uses the same interventional value function as the sampler,
//! `v(S) = mean_r f(x_S, r_rest)`, evaluated for all `2^F` coalitions.

use super::config::MAX_EXACT_FEATURES;
use super::sampling::mean_rows;
use crate::error::{ExplainError, Result};
use crate::model::{predict_checked, Classifier};
use ndarray::{Array1, Array2, ArrayView1};

/// Shapley weight `|S|! (F - |S| - 1)! / F!` for every coalition size
fn coalition_weights(n_features: usize) -> Vec<f64> {
    // 1 / (F * C(F-1, s))
    let mut weights = Vec::with_capacity(n_features);
    let mut binom = 1.0f64;
    for s in 0..n_features {
        if s > 0 {
            binom = binom * (n_features - s) as f64 / s as f64;
        }
        weights.push(1.0 / (n_features as f64 * binom));
    }
    weights
}

/// Check that exhaustive enumeration is affordable
pub(crate) fn check_feature_count(n_features: usize) -> Result<()> {
    if n_features > MAX_EXACT_FEATURES {
        return Err(ExplainError::invalid(
            "strategy",
            "exact",
            format!(
                "{} features exceeds the exhaustive limit of {}; use monte_carlo or tree_path",
                n_features, MAX_EXACT_FEATURES
            ),
        ));
    }
    Ok(())
}

/// Contributions `[feature, class]` for one observation
pub(crate) fn explain_row<M: Classifier + ?Sized>(
    model: &M,
    x: ArrayView1<'_, f64>,
    background: &Array2<f64>,
    baseline: &Array1<f64>,
    prediction: &Array1<f64>,
) -> Result<Array2<f64>> {
    let n_features = x.len();
    let n_classes = baseline.len();
    let full = (1usize << n_features) - 1;

    // v(S) for every coalition bitmask; the empty and full coalitions are known
    let mut values: Vec<Array1<f64>> = Vec::with_capacity(full + 1);
    let mut coalition = background.clone();
    for mask in 0..=full {
        let value = if mask == 0 {
            baseline.clone()
        } else if mask == full {
            prediction.clone()
        } else {
            for f in 0..n_features {
                if mask & (1 << f) != 0 {
                    coalition.column_mut(f).fill(x[f]);
                } else {
                    coalition.column_mut(f).assign(&background.column(f));
                }
            }
            mean_rows(&predict_checked(model, &coalition, Some(n_classes))?)
        };
        values.push(value);
    }

    let weights = coalition_weights(n_features);
    let mut contributions = Array2::<f64>::zeros((n_features, n_classes));
    for f in 0..n_features {
        let bit = 1usize << f;
        let mut row = contributions.row_mut(f);
        for mask in (0..=full).filter(|m| m & bit == 0) {
            let w = weights[mask.count_ones() as usize];
            row.scaled_add(w, &(&values[mask | bit] - &values[mask]));
        }
    }

    Ok(contributions)
}
