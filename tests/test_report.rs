//! Integration test: CSV in, engine, JSON report out

use shapley_explain::prelude::*;
use shapley_explain::report::{self, RankedFeature};
use std::fs;
use tempfile::TempDir;

const MODEL_JSON: &str = r#"{
    "type": "logistic",
    "coefficients": [[1.2, -0.7, 0.0]],
    "intercepts": [0.3],
    "class_names": ["denied", "approved"]
}"#;

const REFERENCE_CSV: &str = "\
income,debt,zip,label
1.0,0.5,10,0
0.2,1.5,11,0
2.5,0.1,12,1
1.7,0.9,13,1
0.4,0.3,14,0
";

// Columns in a different order than the reference
const DATA_CSV: &str = "\
debt,zip,income
0.2,99,3.0
2.0,98,0.1
";

struct Fixture {
    _dir: TempDir,
    model: ModelSpec,
    reference: FeatureTable,
    data: FeatureTable,
    out: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("model.json");
    let reference_path = dir.path().join("reference.csv");
    let data_path = dir.path().join("data.csv");
    fs::write(&model_path, MODEL_JSON).unwrap();
    fs::write(&reference_path, REFERENCE_CSV).unwrap();
    fs::write(&data_path, DATA_CSV).unwrap();

    let loader = DataLoader::new().with_exclude(vec!["label".to_string()]);
    let reference = loader.load_features(&reference_path).unwrap();
    let data = DataLoader::new()
        .load_features(&data_path)
        .unwrap()
        .select(&reference.names)
        .unwrap();

    Fixture {
        model: ModelSpec::load(&model_path).unwrap(),
        reference,
        data,
        out: dir.path().join("report.json"),
        _dir: dir,
    }
}

fn build(f: &Fixture, reference: ndarray::Array2<f64>) -> AttributionEngine<ModelSpec> {
    AttributionEngine::new(
        f.model.clone(),
        reference,
        f.reference.names.clone(),
        f.model.class_names(),
        ExplainerConfig::default().with_strategy(ExplainStrategy::Exact),
    )
    .unwrap()
}

#[test]
fn test_columns_follow_reference_order() {
    let f = fixture();
    assert_eq!(f.reference.names, vec!["income", "debt", "zip"]);
    assert_eq!(f.data.values.row(0).to_vec(), vec![3.0, 0.2, 99.0]);
}

#[test]
fn test_local_report_roundtrip() {
    let f = fixture();
    let engine = build(&f, f.reference.values.clone());
    let local = engine.explain_local(&f.data.values).unwrap();

    let written = LocalReport::from_local(&local, Some(2));
    report::write_json(&written, &f.out).unwrap();
    let read: LocalReport = report::read_json(&f.out).unwrap();
    assert_eq!(read, written);

    assert_eq!(read.class_names, vec!["denied", "approved"]);
    assert_eq!(read.n_observations(), 2);
    // zip has a zero coefficient
    assert!(read.attributions["approved"][0]["zip"].abs() < 1e-12);
    assert_eq!(read.ranked["approved"][0], vec!["income", "debt"]);

    // Additivity survives serialization
    for (i, prediction) in read.predictions.iter().enumerate() {
        for (c, class) in read.class_names.iter().enumerate() {
            let total: f64 = read.attributions[class][i].values().sum();
            assert!((total - (prediction[c] - read.expected_values[c])).abs() < 1e-9);
        }
    }
}

#[test]
fn test_global_report_roundtrip() {
    let f = fixture();
    let engine = build(&f, f.reference.values.clone());
    let global = engine.explain_global(&f.reference.values).unwrap();

    let written = GlobalReport::from_global(&global, engine.config().strategy, None);
    report::write_json(&written, &f.out).unwrap();
    let read: GlobalReport = report::read_json(&f.out).unwrap();
    assert_eq!(read, written);

    assert_eq!(read.strategy, "exact");
    assert_eq!(read.n_observations, 5);
    assert_eq!(read.importance[0].feature, "income");
    let last: &RankedFeature = read.importance.last().unwrap();
    assert_eq!(last.feature, "zip");
    assert!(last.value < 1e-12);
    assert_eq!(read.per_class.len(), 2);
    assert!(read.local.is_some());
}

#[test]
fn test_global_report_without_local() {
    let f = fixture();
    let engine = AttributionEngine::new(
        f.model.clone(),
        f.reference.values.clone(),
        f.reference.names.clone(),
        f.model.class_names(),
        ExplainerConfig::default().with_include_local(false),
    )
    .unwrap();
    let global = engine.explain_global(&f.reference.values).unwrap();
    let json = report::to_json_string(&GlobalReport::from_global(&global, engine.config().strategy, Some(1))).unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value.get("local").is_none());
    assert_eq!(value["importance"].as_array().unwrap().len(), 1);
    assert_eq!(value["strategy"], "monte_carlo(32 permutations)");
}

#[test]
fn test_read_missing_report() {
    let err = report::read_json::<GlobalReport>("/nonexistent/report.json").unwrap_err();
    assert!(matches!(err, ExplainError::IoError(_)));
}
