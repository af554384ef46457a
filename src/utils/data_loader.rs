//! Data loading utilities

use crate::error::{ExplainError, Result};
use ndarray::Array2;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Numeric feature matrix with its column names
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Column names, in matrix column order
    pub names: Vec<String>,
    /// Values, one row per observation; missing cells are NaN
    pub values: Array2<f64>,
}

impl FeatureTable {
    /// Convert every column of `df` except `exclude` to `f64`
    pub fn from_dataframe(df: &DataFrame, exclude: &[String]) -> Result<Self> {
        for name in exclude {
            if df.column(name).is_err() {
                return Err(ExplainError::DataError(format!(
                    "column '{}' not found",
                    name
                )));
            }
        }
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .filter(|n| !exclude.contains(n))
            .collect();
        let values = columns_to_array2(df, &names)?;
        Ok(Self { names, values })
    }

    /// Reorder columns to `names`; every name must be present
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|name| {
                self.names.iter().position(|n| n == name).ok_or_else(|| {
                    ExplainError::schema(format!("column '{}'", name), "no such column")
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(Self {
            names: names.to_vec(),
            values: self.values.select(ndarray::Axis(1), &indices),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }
}

/// CSV loader for feature tables
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Field separator; `None` picks tab for `.tsv`, comma otherwise
    delimiter: Option<u8>,
    /// Rows used for schema inference
    infer_schema_length: usize,
    /// Columns dropped before conversion (targets, ids)
    exclude: Vec<String>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            delimiter: None,
            infer_schema_length: 100,
            exclude: Vec::new(),
        }
    }

    /// Set the field separator
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Set how many rows are scanned to infer column types
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = n;
        self
    }

    /// Drop these columns when building a [`FeatureTable`]
    pub fn with_exclude(mut self, columns: Vec<String>) -> Self {
        self.exclude = columns;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ExplainError::DataError(format!("{}: {}", path.display(), e)))?;

        let delimiter = self.delimiter.unwrap_or_else(|| {
            let is_tsv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
            if is_tsv {
                b'\t'
            } else {
                b','
            }
        });

        let parse_opts = CsvParseOptions::default().with_separator(delimiter);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| ExplainError::DataError(e.to_string()))
    }

    /// Load a CSV file as a numeric feature table
    pub fn load_features(&self, path: impl AsRef<Path>) -> Result<FeatureTable> {
        let df = self.load_csv(path)?;
        FeatureTable::from_dataframe(&df, &self.exclude)
    }
}

/// Extract named columns from a DataFrame into a row-major `Array2<f64>`
fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let column = df
                .column(col_name)
                .map_err(|_| ExplainError::DataError(format!("column '{}' not found", col_name)))?;
            let series_f64 = column
                .as_materialized_series()
                .strict_cast(&DataType::Float64)
                .map_err(|e| {
                    ExplainError::DataError(format!("column '{}' is not numeric: {}", col_name, e))
                })?;
            let values: Vec<f64> = series_f64
                .f64()
                .map_err(|e| ExplainError::DataError(e.to_string()))?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}
