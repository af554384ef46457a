//! Monte-Carlo Shapley estimation by permutation sampling
//!
//! For an observation `x` and background rows `r`, the value of a coalition
//! `S` is the interventional expectation `v(S) = mean_r f(x_S, r_rest)`.
//! Walking one feature ordering and crediting each feature with the change
//! in `v` as it joins telescopes to `f(x) - mean_r f(r)`, so every ordering
//! (and every average of orderings) is exactly additive. Each sampled
//! ordering is also walked in reverse to cancel first-order sampling noise.

use crate::error::Result;
use crate::model::{predict_checked, Classifier};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::time::Instant;

/// Per-observation seed: `seed` mixed with the observation index so that
/// streams do not depend on which worker runs which row.
pub(crate) fn observation_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64)
        .wrapping_add(1)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Permutation sampler for one batch
pub(crate) struct PermutationSampler {
    n_permutations: usize,
    seed: u64,
    deadline: Option<Instant>,
}

/// Result of sampling one observation
pub(crate) struct Sampled {
    /// Contributions `[feature, class]`
    pub values: Array2<f64>,
    /// Orderings actually evaluated (forward and reverse counted separately)
    pub n_orderings: usize,
}

impl PermutationSampler {
    pub fn new(n_permutations: usize, seed: u64, deadline: Option<Instant>) -> Self {
        Self {
            n_permutations,
            seed,
            deadline,
        }
    }

    /// Estimate contributions of every feature of `x`.
    ///
    /// `baseline` must be the mean model output over `background` and
    /// `prediction` the model output for `x`.
    pub fn explain_row<M: Classifier + ?Sized>(
        &self,
        model: &M,
        x: ArrayView1<'_, f64>,
        index: usize,
        background: &Array2<f64>,
        baseline: &Array1<f64>,
        prediction: &Array1<f64>,
    ) -> Result<Sampled> {
        let n_features = x.len();
        let n_classes = baseline.len();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(observation_seed(self.seed, index));

        let mut contributions = Array2::<f64>::zeros((n_features, n_classes));
        let mut n_orderings = 0usize;
        let mut perm: Vec<usize> = (0..n_features).collect();

        for round in 0..self.n_permutations {
            if round > 0 && self.deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }

            perm.shuffle(&mut rng);
            self.walk(model, x, &perm, background, baseline, prediction, &mut contributions)?;

            perm.reverse();
            self.walk(model, x, &perm, background, baseline, prediction, &mut contributions)?;

            n_orderings = n_orderings.saturating_add(2);
        }

        contributions.mapv_inplace(|c| c / n_orderings as f64);

        Ok(Sampled {
            values: contributions,
            n_orderings,
        })
    }

    /// Add the marginal contributions along one ordering
    #[allow(clippy::too_many_arguments)]
    fn walk<M: Classifier + ?Sized>(
        &self,
        model: &M,
        x: ArrayView1<'_, f64>,
        order: &[usize],
        background: &Array2<f64>,
        baseline: &Array1<f64>,
        prediction: &Array1<f64>,
        contributions: &mut Array2<f64>,
    ) -> Result<()> {
        let n_classes = baseline.len();
        let mut coalition = background.clone();
        let mut value_before = baseline.clone();

        for (step, &feature) in order.iter().enumerate() {
            // Once every feature has joined, v(N) is the model output for x
            let value_after = if step + 1 == order.len() {
                prediction.clone()
            } else {
                coalition.column_mut(feature).fill(x[feature]);
                let preds = predict_checked(model, &coalition, Some(n_classes))?;
                mean_rows(&preds)
            };

            let mut row = contributions.row_mut(feature);
            row += &(&value_after - &value_before);
            value_before = value_after;
        }

        Ok(())
    }
}

/// Mean over rows; `preds` is never empty here
pub(crate) fn mean_rows(preds: &Array2<f64>) -> Array1<f64> {
    preds
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(preds.ncols()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FnClassifier;
    use ndarray::array;

    /// p(class 1) = clamp(0.1 * (x0 + 2 x1 + 3 x2), 0, 1), additive inside the clamp
    fn additive_model() -> impl Classifier {
        FnClassifier::new(|x: &Array2<f64>| {
            let mut out = Array2::zeros((x.nrows(), 2));
            for (i, row) in x.rows().into_iter().enumerate() {
                let p = (0.1 * (row[0] + 2.0 * row[1] + 3.0 * row[2])).clamp(0.0, 1.0);
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
            }
            Ok(out)
        })
    }

    fn setup() -> (Array2<f64>, Array1<f64>) {
        let background = array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.5, 0.0, 1.0]];
        let model = additive_model();
        let baseline = mean_rows(&model.predict_proba(&background).unwrap());
        (background, baseline)
    }

    #[test]
    fn test_additive_model_is_exact() {
        let model = additive_model();
        let (background, baseline) = setup();
        let x = array![1.0, 2.0, 0.5];
        let prediction = model.predict_proba(&x.clone().insert_axis(Axis(0))).unwrap().row(0).to_owned();

        let sampler = PermutationSampler::new(5, 42, None);
        let sampled = sampler
            .explain_row(&model, x.view(), 0, &background, &baseline, &prediction)
            .unwrap();

        assert_eq!(sampled.n_orderings, 10);
        // Linear model: contribution = w_f * (x_f - mean background_f), order free
        let means = background.mean_axis(Axis(0)).unwrap();
        let weights = [0.1, 0.2, 0.3];
        for f in 0..3 {
            let expected = weights[f] * (x[f] - means[f]);
            assert!((sampled.values[[f, 1]] - expected).abs() < 1e-9);
            assert!((sampled.values[[f, 0]] + expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sampling_is_additive() {
        let model = additive_model();
        let (background, baseline) = setup();
        let x = array![3.0, 2.0, 1.0]; // clamps at 1.0, so not additive inside
        let prediction = model.predict_proba(&x.clone().insert_axis(Axis(0))).unwrap().row(0).to_owned();

        let sampler = PermutationSampler::new(3, 1, None);
        let sampled = sampler
            .explain_row(&model, x.view(), 4, &background, &baseline, &prediction)
            .unwrap();

        for c in 0..2 {
            let total = sampled.values.column(c).sum();
            assert!((total - (prediction[c] - baseline[c])).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_values() {
        let model = additive_model();
        let (background, baseline) = setup();
        let x = array![3.0, 2.0, 1.0];
        let prediction = model.predict_proba(&x.clone().insert_axis(Axis(0))).unwrap().row(0).to_owned();

        let run = |seed| {
            PermutationSampler::new(4, seed, None)
                .explain_row(&model, x.view(), 0, &background, &baseline, &prediction)
                .unwrap()
                .values
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn test_observation_seeds_differ() {
        assert_ne!(observation_seed(42, 0), observation_seed(42, 1));
        assert_ne!(observation_seed(42, 0), observation_seed(43, 0));
    }
}
