//! JSON reports for global and local explanations
//!
//! Reports are plain serde structures keyed by feature and class names, so
//! they can be consumed without this crate.

use crate::error::Result;
use crate::explainability::{ExplainStrategy, GlobalImportance, LocalExplanation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One entry of a ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFeature {
    pub feature: String,
    pub value: f64,
}

/// Global importance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalReport {
    pub strategy: String,
    pub n_observations: usize,
    pub feature_names: Vec<String>,
    pub class_names: Vec<String>,
    /// Baseline probability per class
    pub expected_values: Vec<f64>,
    /// Mean |contribution| over observations and classes, most important first
    pub importance: Vec<RankedFeature>,
    /// Same ranking per class
    pub per_class: BTreeMap<String, Vec<RankedFeature>>,
    /// Local attributions, when the global result kept them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalReport>,
}

impl GlobalReport {
    /// Build a report, truncating rankings to `top_k` entries when given
    pub fn from_global(
        global: &GlobalImportance,
        strategy: ExplainStrategy,
        top_k: Option<usize>,
    ) -> Self {
        let importance = global
            .ranked_names(top_k)
            .into_iter()
            .zip(global.ranked_values(top_k))
            .map(|(feature, value)| RankedFeature { feature, value })
            .collect();

        let per_class = global
            .class_names()
            .iter()
            .cloned()
            .zip(
                global
                    .ranked_per_class_names(top_k)
                    .into_iter()
                    .zip(global.ranked_per_class_values(top_k)),
            )
            .map(|(class, (names, values))| {
                let ranking = names
                    .into_iter()
                    .zip(values)
                    .map(|(feature, value)| RankedFeature { feature, value })
                    .collect();
                (class, ranking)
            })
            .collect();

        Self {
            strategy: strategy.to_string(),
            n_observations: global.n_observations(),
            feature_names: global.feature_names().to_vec(),
            class_names: global.class_names().to_vec(),
            expected_values: global.expected_values().to_vec(),
            importance,
            per_class,
            local: global.local().map(|l| LocalReport::from_local(l, top_k)),
        }
    }
}

/// Local attribution report.
///
/// `attributions[class][observation][feature]` is the signed contribution;
/// `ranked[class][observation]` lists feature names by descending magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalReport {
    pub strategy: String,
    pub feature_names: Vec<String>,
    pub class_names: Vec<String>,
    pub expected_values: Vec<f64>,
    /// Predicted probabilities, `[observation][class]`
    pub predictions: Vec<Vec<f64>>,
    pub attributions: BTreeMap<String, Vec<BTreeMap<String, f64>>>,
    pub ranked: BTreeMap<String, Vec<Vec<String>>>,
}

impl LocalReport {
    pub fn from_local(local: &LocalExplanation, top_k: Option<usize>) -> Self {
        let attributions = local
            .class_names()
            .iter()
            .enumerate()
            .map(|(c, class)| {
                let per_observation = (0..local.len())
                    .filter_map(|i| local.importance_dict(i, c))
                    .collect();
                (class.clone(), per_observation)
            })
            .collect();

        let ranked = local
            .class_names()
            .iter()
            .cloned()
            .zip(local.get_ranked_local_names(top_k))
            .collect();

        Self {
            strategy: local.strategy().to_string(),
            feature_names: local.feature_names().to_vec(),
            class_names: local.class_names().to_vec(),
            expected_values: local.expected_values().to_vec(),
            predictions: local.iter().map(|m| m.prediction().to_vec()).collect(),
            attributions,
            ranked,
        }
    }

    pub fn n_observations(&self) -> usize {
        self.predictions.len()
    }
}

/// Pretty-printed JSON
pub fn to_json_string<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Write pretty-printed JSON to `path`
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read a report written by [`write_json`]
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}
