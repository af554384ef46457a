//! Linear (logistic / softmax) classifier

use super::Classifier;
use crate::error::{ExplainError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Logistic regression scorer.
///
/// One coefficient row gives a binary model with probabilities
/// `[1 - sigmoid(z), sigmoid(z)]`; `k >= 2` rows give a softmax over `k`
/// classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawLogistic")]
pub struct LogisticClassifier {
    /// Coefficient rows, each of length `n_features`
    pub coefficients: Vec<Vec<f64>>,
    /// One intercept per coefficient row
    pub intercepts: Vec<f64>,
    /// Optional class labels
    #[serde(default)]
    pub class_names: Vec<String>,
}

/// Unchecked wire form of [`LogisticClassifier`]
#[derive(Deserialize)]
pub(crate) struct RawLogistic {
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    #[serde(default)]
    class_names: Vec<String>,
}

impl TryFrom<RawLogistic> for LogisticClassifier {
    type Error = ExplainError;

    fn try_from(raw: RawLogistic) -> Result<Self> {
        let model = Self {
            coefficients: raw.coefficients,
            intercepts: raw.intercepts,
            class_names: raw.class_names,
        };
        model.validate()?;
        Ok(model)
    }
}

impl LogisticClassifier {
    /// Binary model from a single weight vector
    pub fn binary(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients: vec![coefficients],
            intercepts: vec![intercept],
            class_names: Vec::new(),
        }
    }

    /// Softmax model from per-class weight vectors
    pub fn multinomial(coefficients: Vec<Vec<f64>>, intercepts: Vec<f64>) -> Result<Self> {
        let model = Self {
            coefficients,
            intercepts,
            class_names: Vec::new(),
        };
        model.validate()?;
        Ok(model)
    }

    /// Check coefficient and intercept shapes
    pub fn validate(&self) -> Result<()> {
        let width = match self.coefficients.first() {
            Some(row) if !row.is_empty() => row.len(),
            _ => {
                return Err(ExplainError::InvalidModel(
                    "logistic model needs at least one non-empty coefficient row".to_string(),
                ))
            }
        };
        if self.coefficients.iter().any(|row| row.len() != width) {
            return Err(ExplainError::InvalidModel(
                "coefficient rows have different lengths".to_string(),
            ));
        }
        if self.intercepts.len() != self.coefficients.len() {
            return Err(ExplainError::InvalidModel(format!(
                "{} intercepts for {} coefficient rows",
                self.intercepts.len(),
                self.coefficients.len()
            )));
        }
        if !self.class_names.is_empty() && self.class_names.len() != self.n_classes() {
            return Err(ExplainError::InvalidModel(format!(
                "{} class names for {} classes",
                self.class_names.len(),
                self.n_classes()
            )));
        }
        Ok(())
    }

    /// Number of classes
    pub fn n_classes(&self) -> usize {
        match self.coefficients.len() {
            1 => 2,
            k => k,
        }
    }

    /// Input width
    pub fn width(&self) -> usize {
        self.coefficients.first().map_or(0, Vec::len)
    }

    fn score(&self, k: usize, row: ndarray::ArrayView1<'_, f64>) -> f64 {
        self.coefficients[k]
            .iter()
            .zip(row.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercepts[k]
    }
}

impl Classifier for LogisticClassifier {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        // Fields are public, so the shape may have changed since construction
        self.validate()?;
        if x.ncols() != self.width() {
            return Err(ExplainError::schema(
                format!("{} features", self.width()),
                format!("{} features", x.ncols()),
            ));
        }

        let n_classes = self.n_classes();
        let mut out = Array2::zeros((x.nrows(), n_classes));

        for (i, row) in x.rows().into_iter().enumerate() {
            if self.coefficients.len() == 1 {
                let p = sigmoid(self.score(0, row));
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
            } else {
                let scores: Vec<f64> = (0..n_classes).map(|k| self.score(k, row)).collect();
                // Shift by the max score for numerical stability
                let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
                let total: f64 = exp.iter().sum();
                for (k, e) in exp.iter().enumerate() {
                    out[[i, k]] = e / total;
                }
            }
        }

        Ok(out)
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.width())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
