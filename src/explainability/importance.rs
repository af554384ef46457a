//! Global feature importance and attribution statistics

use super::attribution::{rank_by_magnitude, LocalExplanation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Global importance: mean absolute contribution per feature.
///
/// Rankings are sorted by descending importance, ties broken by feature
/// index ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalImportance {
    feature_names: Vec<String>,
    class_names: Vec<String>,
    /// Baseline probability per class
    expected_values: Vec<f64>,
    /// `(feature, importance)` averaged over observations and classes
    ranked: Vec<(usize, f64)>,
    /// Same, per class
    per_class: Vec<Vec<(usize, f64)>>,
    /// Number of observations the averages were taken over
    n_observations: usize,
    /// Local attributions the importance was computed from
    local: Option<LocalExplanation>,
}

impl GlobalImportance {
    /// Aggregate local attributions; keeps them when `keep_local` is set
    pub fn from_local(local: LocalExplanation, keep_local: bool) -> Self {
        let n_features = local.feature_names().len();
        let n_classes = local.class_names().len();
        let n_obs = local.len();

        let mut per_class_sums = vec![vec![0.0; n_features]; n_classes];
        for matrix in &local {
            for (f, row) in matrix.values().rows().into_iter().enumerate() {
                for (c, v) in row.iter().enumerate() {
                    per_class_sums[c][f] += v.abs();
                }
            }
        }

        let denom = n_obs.max(1) as f64;
        let per_class_means: Vec<Vec<f64>> = per_class_sums
            .into_iter()
            .map(|sums| sums.into_iter().map(|s| s / denom).collect())
            .collect();

        let overall: Vec<f64> = (0..n_features)
            .map(|f| per_class_means.iter().map(|m| m[f]).sum::<f64>() / n_classes.max(1) as f64)
            .collect();

        Self {
            feature_names: local.feature_names().to_vec(),
            class_names: local.class_names().to_vec(),
            expected_values: local.expected_values().to_vec(),
            ranked: rank_by_magnitude(overall.into_iter()),
            per_class: per_class_means
                .into_iter()
                .map(|m| rank_by_magnitude(m.into_iter()))
                .collect(),
            n_observations: n_obs,
            local: if keep_local { Some(local) } else { None },
        }
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

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// `(feature index, importance)`, most important first
    pub fn ranked(&self) -> &[(usize, f64)] {
        &self.ranked
    }

    /// First `k` entries of [`Self::ranked`]
    pub fn top_k(&self, k: usize) -> &[(usize, f64)] {
        &self.ranked[..k.min(self.ranked.len())]
    }

    /// Importance of one feature
    pub fn value(&self, feature: usize) -> Option<f64> {
        self.ranked.iter().find(|(f, _)| *f == feature).map(|(_, v)| *v)
    }

    /// Feature names, most important first
    pub fn ranked_names(&self, top_k: Option<usize>) -> Vec<String> {
        take(&self.ranked, top_k)
            .map(|(f, _)| self.feature_names[*f].clone())
            .collect()
    }

    /// Importance values matching [`Self::ranked_names`]
    pub fn ranked_values(&self, top_k: Option<usize>) -> Vec<f64> {
        take(&self.ranked, top_k).map(|(_, v)| *v).collect()
    }

    /// Per-class rankings, `[class][rank]`
    pub fn ranked_per_class_names(&self, top_k: Option<usize>) -> Vec<Vec<String>> {
        self.per_class
            .iter()
            .map(|ranked| {
                take(ranked, top_k)
                    .map(|(f, _)| self.feature_names[*f].clone())
                    .collect()
            })
            .collect()
    }

    /// Per-class importance values, `[class][rank]`
    pub fn ranked_per_class_values(&self, top_k: Option<usize>) -> Vec<Vec<f64>> {
        self.per_class
            .iter()
            .map(|ranked| take(ranked, top_k).map(|(_, v)| *v).collect())
            .collect()
    }

    /// Feature name → importance
    pub fn importance_dict(&self) -> BTreeMap<String, f64> {
        self.ranked
            .iter()
            .map(|(f, v)| (self.feature_names[*f].clone(), *v))
            .collect()
    }

    /// Local attributions, when they were kept
    pub fn local(&self) -> Option<&LocalExplanation> {
        self.local.as_ref()
    }

    /// Drop the local attributions and return them
    pub fn take_local(&mut self) -> Option<LocalExplanation> {
        self.local.take()
    }
}

fn take(ranked: &[(usize, f64)], top_k: Option<usize>) -> impl Iterator<Item = &(usize, f64)> {
    ranked.iter().take(top_k.unwrap_or(ranked.len()))
}

/// Summary of contributions to one class across many observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSummary {
    /// Class the summary describes
    pub class: usize,
    /// Feature names
    pub feature_names: Vec<String>,
    /// Mean absolute contribution per feature
    pub mean_abs: Vec<f64>,
    /// Mean contribution per feature
    pub mean: Vec<f64>,
    /// Standard deviation of contributions per feature
    pub std: Vec<f64>,
    /// Min contribution per feature
    pub min: Vec<f64>,
    /// Max contribution per feature
    pub max: Vec<f64>,
}

impl AttributionSummary {
    /// Create from a batch of local attributions
    pub fn from_explanation(explanation: &LocalExplanation, class: usize) -> Self {
        let n_features = explanation.feature_names().len();
        let feature_names = explanation.feature_names().to_vec();

        if explanation.is_empty() || class >= explanation.class_names().len() {
            return Self {
                class,
                feature_names,
                mean_abs: vec![0.0; n_features],
                mean: vec![0.0; n_features],
                std: vec![0.0; n_features],
                min: vec![0.0; n_features],
                max: vec![0.0; n_features],
            };
        }

        let n = explanation.len() as f64;
        let mut mean_abs = vec![0.0; n_features];
        let mut mean = vec![0.0; n_features];
        let mut min = vec![f64::INFINITY; n_features];
        let mut max = vec![f64::NEG_INFINITY; n_features];

        for matrix in explanation {
            for (f, v) in matrix.class_contributions(class).iter().enumerate() {
                mean_abs[f] += v.abs();
                mean[f] += v;
                min[f] = min[f].min(*v);
                max[f] = max[f].max(*v);
            }
        }
        for f in 0..n_features {
            mean_abs[f] /= n;
            mean[f] /= n;
        }

        // Second pass for standard deviation
        let mut sum_sq = vec![0.0; n_features];
        for matrix in explanation {
            for (f, v) in matrix.class_contributions(class).iter().enumerate() {
                sum_sq[f] += (v - mean[f]).powi(2);
            }
        }
        let std = sum_sq.into_iter().map(|s| (s / n).sqrt()).collect();

        Self {
            class,
            feature_names,
            mean_abs,
            mean,
            std,
            min,
            max,
        }
    }

    /// Feature ranking by mean absolute contribution
    pub fn feature_ranking(&self) -> Vec<(usize, f64)> {
        rank_by_magnitude(self.mean_abs.iter().copied())
    }
}
