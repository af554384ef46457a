//! Local attributions: per-observation, per-class feature contributions

use super::config::ExplainStrategy;
use super::importance::AttributionSummary;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signed contributions of every feature to every class score for one
/// observation.
///
/// Layout is `[n_features, n_classes]`. For each class the column sums to
/// `prediction[class] - baseline[class]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionMatrix {
    /// Contributions, `[feature, class]`
    values: Array2<f64>,
    /// Model output for the observation
    prediction: Vec<f64>,
    /// Orderings walked, for sampled attributions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n_orderings: Option<usize>,
}

impl AttributionMatrix {
    /// Create a matrix from contributions and the predicted probabilities
    pub fn new(values: Array2<f64>, prediction: Vec<f64>) -> Self {
        debug_assert_eq!(values.ncols(), prediction.len());
        Self {
            values,
            prediction,
            n_orderings: None,
        }
    }

    /// Record how many orderings were averaged
    pub fn with_orderings(mut self, n_orderings: usize) -> Self {
        self.n_orderings = Some(n_orderings);
        self
    }

    /// Orderings averaged by the sampler; `None` for exact strategies
    pub fn n_orderings(&self) -> Option<usize> {
        self.n_orderings
    }

    /// Number of features
    #[inline]
    pub fn n_features(&self) -> usize {
        self.values.nrows()
    }

    /// Number of classes
    #[inline]
    pub fn n_classes(&self) -> usize {
        self.values.ncols()
    }

    /// Contribution of `feature` to `class`
    #[inline]
    pub fn get(&self, feature: usize, class: usize) -> f64 {
        self.values[[feature, class]]
    }

    /// All contributions
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Contributions to one class, indexed by feature
    pub fn class_contributions(&self, class: usize) -> ArrayView1<'_, f64> {
        self.values.column(class)
    }

    /// Predicted probabilities for the observation
    pub fn prediction(&self) -> &[f64] {
        &self.prediction
    }

    /// Sum of contributions to `class`
    pub fn total(&self, class: usize) -> f64 {
        self.values.column(class).sum()
    }

    /// Largest additivity violation across classes
    pub fn additivity_error(&self, baseline: &[f64]) -> f64 {
        (0..self.n_classes())
            .map(|c| (self.total(c) - (self.prediction[c] - baseline[c])).abs())
            .fold(0.0, f64::max)
    }

    /// `(feature, contribution)` for one class, by descending magnitude
    pub fn ranked(&self, class: usize) -> Vec<(usize, f64)> {
        rank_by_magnitude(self.values.column(class).iter().copied())
    }
}

/// Attributions for a batch of observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalExplanation {
    feature_names: Vec<String>,
    class_names: Vec<String>,
    /// Baseline (expected) probability per class
    expected_values: Vec<f64>,
    strategy: ExplainStrategy,
    observations: Vec<AttributionMatrix>,
}

impl LocalExplanation {
    pub(crate) fn new(
        feature_names: Vec<String>,
        class_names: Vec<String>,
        expected_values: Vec<f64>,
        strategy: ExplainStrategy,
        observations: Vec<AttributionMatrix>,
    ) -> Self {
        Self {
            feature_names,
            class_names,
            expected_values,
            strategy,
            observations,
        }
    }

    /// Number of explained observations
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Baseline probability per class
    pub fn expected_values(&self) -> &[f64] {
        &self.expected_values
    }

    /// Strategy that produced these values
    pub fn strategy(&self) -> ExplainStrategy {
        self.strategy
    }

    /// Attributions of one observation
    pub fn observation(&self, index: usize) -> Option<&AttributionMatrix> {
        self.observations.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributionMatrix> {
        self.observations.iter()
    }

    /// Raw values shaped `[class][observation][feature]`
    pub fn local_importance_values(&self) -> Vec<Vec<Vec<f64>>> {
        (0..self.class_names.len())
            .map(|c| {
                self.observations
                    .iter()
                    .map(|m| m.class_contributions(c).to_vec())
                    .collect()
            })
            .collect()
    }

    /// Feature names per class and observation, by descending |contribution|.
    ///
    /// Shape `[class][observation][rank]`, truncated to `top_k` ranks when
    /// given. Pairs index-for-index with [`Self::get_ranked_local_values`].
    pub fn get_ranked_local_names(&self, top_k: Option<usize>) -> Vec<Vec<Vec<String>>> {
        self.ranked_local(top_k, |feature, _| self.feature_names[feature].clone())
    }

    /// Signed contributions per class and observation, by descending magnitude.
    ///
    /// Shape `[class][observation][rank]`.
    pub fn get_ranked_local_values(&self, top_k: Option<usize>) -> Vec<Vec<Vec<f64>>> {
        self.ranked_local(top_k, |_, value| value)
    }

    fn ranked_local<T>(
        &self,
        top_k: Option<usize>,
        pick: impl Fn(usize, f64) -> T,
    ) -> Vec<Vec<Vec<T>>> {
        let k = top_k.unwrap_or(self.feature_names.len());
        (0..self.class_names.len())
            .map(|c| {
                self.observations
                    .iter()
                    .map(|m| {
                        m.ranked(c)
                            .into_iter()
                            .take(k)
                            .map(|(feature, value)| pick(feature, value))
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    /// Feature name → contribution for one observation and class
    pub fn importance_dict(&self, observation: usize, class: usize) -> Option<BTreeMap<String, f64>> {
        let matrix = self.observations.get(observation)?;
        if class >= matrix.n_classes() {
            return None;
        }
        Some(
            self.feature_names
                .iter()
                .cloned()
                .zip(matrix.class_contributions(class).iter().copied())
                .collect(),
        )
    }

    /// Largest additivity violation over all observations and classes
    pub fn max_additivity_error(&self) -> f64 {
        self.observations
            .iter()
            .map(|m| m.additivity_error(&self.expected_values))
            .fold(0.0, f64::max)
    }

    /// Check `sum(contributions) == prediction - baseline` within `tolerance`
    pub fn verify_additivity(&self, tolerance: f64) -> bool {
        self.max_additivity_error() <= tolerance
    }

    /// Distribution statistics of the contributions to `class`
    pub fn summary(&self, class: usize) -> AttributionSummary {
        AttributionSummary::from_explanation(self, class)
    }
}

impl<'a> IntoIterator for &'a LocalExplanation {
    type Item = &'a AttributionMatrix;
    type IntoIter = std::slice::Iter<'a, AttributionMatrix>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

/// Enumerate `values` and sort by descending absolute value, ties by index
pub(crate) fn rank_by_magnitude(values: impl Iterator<Item = f64>) -> Vec<(usize, f64)> {
    let mut indexed: Vec<(usize, f64)> = values.enumerate().collect();
    indexed.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    indexed
}
