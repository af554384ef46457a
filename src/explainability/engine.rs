//! Attribution engine
//!
//! Ties a model, a background reference set and the configured strategy
//! together:
//! - Validates names and probes the model once at construction
//! - Caches the baseline (mean prediction over the background)
//! - Explains batches in parallel via rayon, one observation per task

use super::attribution::{AttributionMatrix, LocalExplanation};
use super::config::{ExplainStrategy, ExplainerConfig};
use super::exact;
use super::importance::GlobalImportance;
use super::sampling::{mean_rows, PermutationSampler};
use super::tree_path::PathTree;
use crate::error::{ExplainError, Result};
use crate::model::{predict_checked, Classifier};
use ndarray::{s, Array1, Array2, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shapley attribution engine for one model and one reference set
pub struct AttributionEngine<M: Classifier> {
    model: M,
    config: ExplainerConfig,
    feature_names: Vec<String>,
    class_names: Vec<String>,
    /// Background rows (after optional subsampling)
    background: Array2<f64>,
    /// Mean `predict_proba` over `background`
    baseline: Array1<f64>,
    /// Tree flattened with covers from `background`, for `TreePath`
    path_tree: Option<PathTree>,
    pool: Option<rayon::ThreadPool>,
}

impl<M: Classifier> std::fmt::Debug for AttributionEngine<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionEngine")
            .field("config", &self.config)
            .field("n_features", &self.feature_names.len())
            .field("n_classes", &self.class_names.len())
            .field("n_background", &self.background.nrows())
            .finish()
    }
}

/// Contributions for one row plus the orderings that produced them
struct RowResult {
    values: Array2<f64>,
    n_orderings: Option<usize>,
}

impl<M: Classifier> AttributionEngine<M> {
    /// Build an engine.
    ///
    /// # Errors
    /// - [`ExplainError::EmptyReferenceSet`] when `reference` has no rows
    /// - [`ExplainError::SchemaMismatch`] when the names disagree with the
    ///   reference width or the model output width
    /// - [`ExplainError::NonFiniteOutput`] when the model returns NaN/Inf
    /// - [`ExplainError::InvalidParameter`] for unusable configuration
    pub fn new(
        model: M,
        reference: Array2<f64>,
        feature_names: Vec<String>,
        class_names: Vec<String>,
        config: ExplainerConfig,
    ) -> Result<Self> {
        config.validate()?;

        if reference.nrows() == 0 {
            return Err(ExplainError::EmptyReferenceSet);
        }

        let n_features = reference.ncols();
        if n_features == 0 {
            return Err(ExplainError::schema("at least one feature", "0 columns"));
        }
        if feature_names.len() != n_features {
            return Err(ExplainError::schema(
                format!("{} feature names", n_features),
                format!("{} feature names", feature_names.len()),
            ));
        }
        if let Some(declared) = model.n_features() {
            if declared != n_features {
                return Err(ExplainError::schema(
                    format!("{} features (model input width)", declared),
                    format!("{} reference columns", n_features),
                ));
            }
        }
        check_unique("feature_names", &feature_names)?;

        // Probe one row to learn the class count
        let probe = predict_checked(&model, &reference.slice(s![0..1, ..]).to_owned(), None)?;
        let n_classes = probe.ncols();
        if n_classes == 0 {
            return Err(ExplainError::schema("at least one class", "0 output columns"));
        }
        if class_names.len() != n_classes {
            return Err(ExplainError::schema(
                format!("{} class names", n_classes),
                format!("{} class names", class_names.len()),
            ));
        }
        check_unique("class_names", &class_names)?;

        match config.strategy {
            ExplainStrategy::TreePath if model.tree().is_none() => {
                return Err(ExplainError::invalid(
                    "strategy",
                    config.strategy,
                    "the model exposes no tree structure",
                ));
            }
            ExplainStrategy::Exact => exact::check_feature_count(n_features)?,
            _ => {}
        }

        let n_reference = reference.nrows();
        let background = subsample(reference, config.max_background, config.seed);
        if background.nrows() < n_reference {
            debug!(
                from = n_reference,
                to = background.nrows(),
                "Subsampled background rows"
            );
        }

        let baseline = mean_rows(&predict_checked(&model, &background, Some(n_classes))?);
        let path_tree = build_path_tree(&model, &config, &background)?;

        let pool = match config.n_workers {
            Some(n_workers) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n_workers)
                    .build()
                    .map_err(|e| ExplainError::invalid("n_workers", n_workers, e.to_string()))?,
            ),
            None => None,
        };

        info!(
            strategy = %config.strategy,
            n_features,
            n_classes,
            n_background = background.nrows(),
            "Attribution engine ready"
        );

        Ok(Self {
            model,
            config,
            feature_names,
            class_names,
            background,
            baseline,
            path_tree,
            pool,
        })
    }

    /// Baseline probability per class: the mean prediction over the background
    pub fn expected_values(&self) -> &Array1<f64> {
        &self.baseline
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn config(&self) -> &ExplainerConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Background rows actually used, after subsampling
    pub fn background(&self) -> &Array2<f64> {
        &self.background
    }

    /// Signed contributions of every feature to every class, per observation.
    ///
    /// For each observation and class the contributions sum to
    /// `predict_proba(x)[c] - expected_values()[c]`.
    pub fn explain_local(&self, observations: &Array2<f64>) -> Result<LocalExplanation> {
        self.check_width(observations)?;
        self.explain_against(
            observations,
            &self.background,
            &self.baseline,
            self.path_tree.as_ref(),
        )
    }

    /// Global importance over `sample_set`.
    ///
    /// The sample set is used both as the rows to explain and as the
    /// background for this call, so the baseline is the mean prediction
    /// over `sample_set` (subsampled when `max_background` is set).
    pub fn explain_global(&self, sample_set: &Array2<f64>) -> Result<GlobalImportance> {
        if sample_set.nrows() == 0 {
            return Err(ExplainError::EmptyReferenceSet);
        }
        self.check_width(sample_set)?;

        let background = subsample(sample_set.clone(), self.config.max_background, self.config.seed);
        let baseline = mean_rows(&predict_checked(
            &self.model,
            &background,
            Some(self.class_names.len()),
        )?);
        let path_tree = build_path_tree(&self.model, &self.config, &background)?;

        let local = self.explain_against(sample_set, &background, &baseline, path_tree.as_ref())?;
        let global = GlobalImportance::from_local(local, self.config.include_local);

        if let Some((feature, value)) = global.ranked().first() {
            info!(
                n_observations = global.n_observations(),
                top_feature = %self.feature_names[*feature],
                top_importance = value,
                "Global importance computed"
            );
        }
        Ok(global)
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.feature_names.len() {
            return Err(ExplainError::schema(
                format!("{} features", self.feature_names.len()),
                format!("{} features", x.ncols()),
            ));
        }
        Ok(())
    }

    fn explain_against(
        &self,
        x: &Array2<f64>,
        background: &Array2<f64>,
        baseline: &Array1<f64>,
        path_tree: Option<&PathTree>,
    ) -> Result<LocalExplanation> {
        let n_classes = self.class_names.len();
        let start = Instant::now();

        let predictions = if x.nrows() == 0 {
            Array2::zeros((0, n_classes))
        } else {
            predict_checked(&self.model, x, Some(n_classes))?
        };

        let deadline = self
            .config
            .time_budget_ms
            .map(|ms| start + Duration::from_millis(ms));

        let explain_rows = || -> Result<Vec<RowResult>> {
            (0..x.nrows())
                .into_par_iter()
                .map(|i| {
                    let row = x.row(i);
                    let prediction = predictions.row(i).to_owned();
                    self.explain_row(row, i, background, baseline, &prediction, path_tree, deadline)
                })
                .collect()
        };

        let rows = match &self.pool {
            Some(pool) => pool.install(explain_rows)?,
            None => explain_rows()?,
        };

        if let ExplainStrategy::MonteCarlo { n_permutations } = self.config.strategy {
            let requested = n_permutations.saturating_mul(2);
            let truncated = rows
                .iter()
                .filter(|r| r.n_orderings.is_some_and(|n| n < requested))
                .count();
            if truncated > 0 {
                warn!(
                    truncated,
                    n_observations = rows.len(),
                    time_budget_ms = self.config.time_budget_ms,
                    "Time budget reached before all orderings were sampled"
                );
            }
        }

        let mut observations = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if let Some(((feature, class), value)) =
                row.values.indexed_iter().find(|(_, v)| !v.is_finite())
            {
                return Err(ExplainError::NonFiniteOutput(format!(
                    "contribution {} for observation {}, feature {}, class {}",
                    value, i, feature, class
                )));
            }
            let mut matrix = AttributionMatrix::new(row.values, predictions.row(i).to_vec());
            if let Some(n) = row.n_orderings {
                matrix = matrix.with_orderings(n);
            }
            observations.push(matrix);
        }

        debug!(
            n_observations = observations.len(),
            n_background = background.nrows(),
            strategy = self.config.strategy.name(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Explained batch"
        );

        Ok(LocalExplanation::new(
            self.feature_names.clone(),
            self.class_names.clone(),
            baseline.to_vec(),
            self.config.strategy,
            observations,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn explain_row(
        &self,
        row: ndarray::ArrayView1<'_, f64>,
        index: usize,
        background: &Array2<f64>,
        baseline: &Array1<f64>,
        prediction: &Array1<f64>,
        path_tree: Option<&PathTree>,
        deadline: Option<Instant>,
    ) -> Result<RowResult> {
        match self.config.strategy {
            ExplainStrategy::MonteCarlo { n_permutations } => {
                let sampled = PermutationSampler::new(n_permutations, self.config.seed, deadline)
                    .explain_row(&self.model, row, index, background, baseline, prediction)?;
                Ok(RowResult {
                    values: sampled.values,
                    n_orderings: Some(sampled.n_orderings),
                })
            }
            ExplainStrategy::TreePath => {
                let tree = path_tree.ok_or_else(|| {
                    ExplainError::invalid("strategy", "tree_path", "the model exposes no tree structure")
                })?;
                Ok(RowResult {
                    values: tree.shap_values(row),
                    n_orderings: None,
                })
            }
            ExplainStrategy::Exact => Ok(RowResult {
                values: exact::explain_row(&self.model, row, background, baseline, prediction)?,
                n_orderings: None,
            }),
        }
    }
}

fn check_unique(field: &str, names: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(ExplainError::invalid(field, name, "names must be unique"));
        }
    }
    Ok(())
}

/// Keep at most `max_rows` rows, drawn without replacement from `seed`.
/// Kept rows stay in their original order.
fn subsample(rows: Array2<f64>, max_rows: Option<usize>, seed: u64) -> Array2<f64> {
    match max_rows {
        Some(max) if rows.nrows() > max => {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            let mut indices = rand::seq::index::sample(&mut rng, rows.nrows(), max).into_vec();
            indices.sort_unstable();
            rows.select(Axis(0), &indices)
        }
        _ => rows,
    }
}

fn build_path_tree<M: Classifier>(
    model: &M,
    config: &ExplainerConfig,
    background: &Array2<f64>,
) -> Result<Option<PathTree>> {
    match (config.strategy, model.tree()) {
        (ExplainStrategy::TreePath, Some(tree)) => Ok(Some(PathTree::new(tree, background)?)),
        _ => Ok(None),
    }
}
