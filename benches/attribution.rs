use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use shapley_explain::model::default_names;
use shapley_explain::prelude::*;

fn random_rows(n_rows: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0)
}

fn logistic(n_features: usize) -> LogisticClassifier {
    let coefficients = (0..n_features).map(|f| (f as f64 - 3.0) * 0.1).collect();
    LogisticClassifier::binary(coefficients, -0.2)
}

/// Complete tree of the given depth, splitting on features round-robin
fn complete_tree(depth: usize, feature: usize, n_features: usize) -> TreeNode {
    if depth == 0 {
        let p = (feature as f64 + 1.0) / (n_features as f64 + 1.0);
        return TreeNode::leaf(vec![1.0 - p, p]);
    }
    let next = (feature + 1) % n_features;
    TreeNode::split(
        feature,
        5.0,
        complete_tree(depth - 1, next, n_features),
        complete_tree(depth - 1, (next + 1) % n_features, n_features),
    )
}

fn engine<M: Classifier>(model: M, reference: Array2<f64>, strategy: ExplainStrategy) -> AttributionEngine<M> {
    let n_features = reference.ncols();
    AttributionEngine::new(
        model,
        reference,
        default_names("f", n_features),
        default_names("class", 2),
        ExplainerConfig::default().with_strategy(strategy),
    )
    .unwrap()
}

fn bench_monte_carlo(c: &mut Criterion) {
    let mut group = c.benchmark_group("monte_carlo");
    group.sample_size(10);

    let observations = random_rows(16, 8, 1);
    for n_background in [10, 50, 100].iter() {
        let engine = engine(
            logistic(8),
            random_rows(*n_background, 8, 2),
            ExplainStrategy::MonteCarlo { n_permutations: 16 },
        );
        group.bench_with_input(
            BenchmarkId::new("explain_local", n_background),
            &observations,
            |b, x| b.iter(|| engine.explain_local(black_box(x)).unwrap()),
        );
    }

    group.finish();
}

fn bench_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("exact");
    group.sample_size(10);

    for n_features in [4, 8, 10].iter() {
        let engine = engine(
            logistic(*n_features),
            random_rows(20, *n_features, 3),
            ExplainStrategy::Exact,
        );
        let observations = random_rows(4, *n_features, 4);
        group.bench_with_input(
            BenchmarkId::new("explain_local", n_features),
            &observations,
            |b, x| b.iter(|| engine.explain_local(black_box(x)).unwrap()),
        );
    }

    group.finish();
}

fn bench_tree_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_path");

    let n_features = 12;
    for depth in [4, 8, 10].iter() {
        let tree = TreeClassifier::new(complete_tree(*depth, 0, n_features), n_features).unwrap();
        let engine = engine(tree, random_rows(500, n_features, 5), ExplainStrategy::TreePath);
        let observations = random_rows(64, n_features, 6);
        group.bench_with_input(
            BenchmarkId::new("explain_local", depth),
            &observations,
            |b, x| b.iter(|| engine.explain_local(black_box(x)).unwrap()),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_monte_carlo, bench_exact, bench_tree_path);
criterion_main!(benches);
