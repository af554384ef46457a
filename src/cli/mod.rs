//! Shapley CLI Module
//!
//! Command-line interface for local and global attribution of saved models.

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::explainability::{AttributionEngine, ExplainStrategy, ExplainerConfig};
use crate::model::{Classifier, ModelSpec, TreeClassifier};
use crate::report::{self, GlobalReport, LocalReport};
use crate::utils::{DataLoader, FeatureTable};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn signed(value: f64) -> ColoredString {
    let text = format!("{:+.4}", value);
    if value >= 0.0 {
        text.truecolor(100, 210, 120)
    } else {
        text.truecolor(240, 110, 110)
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "shapley")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Shapley feature attribution for probabilistic classifiers")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Explain individual predictions against a reference set
    Explain {
        /// Model definition (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Background reference rows (CSV with a header of feature names)
        #[arg(short, long)]
        reference: PathBuf,

        /// Observations to explain (CSV with the same feature columns)
        #[arg(short, long)]
        data: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Rank features by mean absolute contribution over a sample
    Global {
        /// Model definition (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Sample rows, also used as the background (CSV)
        #[arg(short, long)]
        data: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Show model information
    Info {
        /// Model definition (JSON)
        #[arg(short, long)]
        model: PathBuf,
    },
}

/// Attribution strategy selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    MonteCarlo,
    TreePath,
    Exact,
}

/// Options shared by `explain` and `global`
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Attribution strategy (defaults to the config file, else monte-carlo)
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Sampled orderings for monte-carlo (each is also run reversed)
    #[arg(short, long)]
    pub permutations: Option<usize>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Cap on background rows
    #[arg(long)]
    pub max_background: Option<usize>,

    /// Sampling time budget per batch, in milliseconds
    #[arg(long)]
    pub time_budget_ms: Option<u64>,

    /// Worker threads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Explainer configuration (JSON); flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Columns to ignore in the CSV inputs (targets, ids)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Features shown per ranking
    #[arg(short, long, default_value = "5")]
    pub top: usize,

    /// Write the JSON report here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl EngineArgs {
    /// Merge the config file (if any) with command-line overrides
    pub fn to_config(&self) -> anyhow::Result<ExplainerConfig> {
        let mut config = match &self.config {
            Some(path) => ExplainerConfig::from_json_file(path)?,
            None => ExplainerConfig::default(),
        };

        let current_permutations = match config.strategy {
            ExplainStrategy::MonteCarlo { n_permutations } => Some(n_permutations),
            _ => None,
        };
        config.strategy = match (self.strategy, self.permutations) {
            (Some(StrategyArg::TreePath), _) => ExplainStrategy::TreePath,
            (Some(StrategyArg::Exact), _) => ExplainStrategy::Exact,
            (Some(StrategyArg::MonteCarlo), n) => ExplainStrategy::MonteCarlo {
                n_permutations: n.or(current_permutations).unwrap_or(32),
            },
            (None, Some(n)) if current_permutations.is_some() => {
                ExplainStrategy::MonteCarlo { n_permutations: n }
            }
            (None, _) => config.strategy,
        };

        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(n) = self.max_background {
            config.max_background = Some(n);
        }
        if let Some(ms) = self.time_budget_ms {
            config.time_budget_ms = Some(ms);
        }
        if let Some(n) = self.workers {
            config.n_workers = Some(n);
        }

        config.validate()?;
        Ok(config)
    }

    fn loader(&self) -> DataLoader {
        DataLoader::new().with_exclude(self.exclude.clone())
    }
}

// ─── Loading ───────────────────────────────────────────────────────────────────

fn load_model(path: &Path) -> anyhow::Result<ModelSpec> {
    step_run("Loading model");
    let model = ModelSpec::load(path)?;
    step_done(&format!(
        "{} · {} classes",
        model.kind(),
        model.n_classes()
    ));
    Ok(model)
}

fn load_table(loader: &DataLoader, label: &str, path: &Path) -> anyhow::Result<FeatureTable> {
    step_run(&format!("Loading {}", label));
    let start = Instant::now();
    let table = loader.load_features(path)?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        table.n_rows(),
        table.n_cols(),
        start.elapsed()
    ));
    Ok(table)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_explain(
    model_path: &Path,
    reference_path: &Path,
    data_path: &Path,
    args: &EngineArgs,
) -> anyhow::Result<()> {
    section("Explain");

    let config = args.to_config()?;
    let model = load_model(model_path)?;
    let loader = args.loader();
    let reference = load_table(&loader, "reference", reference_path)?;
    let data = load_table(&loader, "observations", data_path)?.select(&reference.names)?;

    let class_names = model.class_names();
    let strategy = config.strategy;

    step_run(&format!("Explaining with {}", strategy.to_string().cyan()));
    let start = Instant::now();
    let engine = AttributionEngine::new(
        model,
        reference.values,
        reference.names,
        class_names,
        config,
    )?;
    let local = engine.explain_local(&data.values)?;
    step_done(&format!("{} observations in {:?}", local.len(), start.elapsed()));

    section("Baseline");
    for (class, value) in engine.class_names().iter().zip(engine.expected_values()) {
        println!("  {:<20} {:.4}", muted(class), value);
    }

    let labels = engine.model().predict(&data.values)?;
    let ranked_names = local.get_ranked_local_names(Some(args.top));
    let ranked_values = local.get_ranked_local_values(Some(args.top));

    section("Attributions");
    for (i, matrix) in local.iter().enumerate() {
        let class = labels[i];
        println!(
            "  {} {}  {} {:.4}",
            muted(&format!("#{:<4}", i)),
            engine.class_names()[class].white().bold(),
            muted("p ="),
            matrix.prediction()[class]
        );
        for (name, value) in ranked_names[class][i].iter().zip(&ranked_values[class][i]) {
            println!("      {:<24} {}", name, signed(*value));
        }
    }

    if let Some(output) = &args.output {
        report::write_json(&LocalReport::from_local(&local, None), output)?;
        println!();
        step_ok(&format!("Report written to {}", output.display()));
    }

    println!();
    Ok(())
}

pub fn cmd_global(model_path: &Path, data_path: &Path, args: &EngineArgs) -> anyhow::Result<()> {
    section("Global importance");

    let config = args.to_config()?;
    let model = load_model(model_path)?;
    let sample = load_table(&args.loader(), "sample", data_path)?;

    let class_names = model.class_names();
    let strategy = config.strategy;

    step_run(&format!("Explaining with {}", strategy.to_string().cyan()));
    let start = Instant::now();
    let engine = AttributionEngine::new(
        model,
        sample.values.clone(),
        sample.names,
        class_names,
        config,
    )?;
    let global = engine.explain_global(&sample.values)?;
    step_done(&format!("{} observations in {:?}", global.n_observations(), start.elapsed()));

    section("Ranking");
    let values = global.ranked_values(Some(args.top));
    let max = values.first().copied().unwrap_or(0.0);
    for (rank, (name, value)) in global.ranked_names(Some(args.top)).iter().zip(&values).enumerate() {
        let width = if max > 0.0 { (value / max * 24.0).round() as usize } else { 0 };
        println!(
            "  {:>3}  {:<24} {:.4}  {}",
            muted(&format!("{}", rank + 1)),
            name,
            value,
            accent(&"█".repeat(width))
        );
    }

    let per_class_names = global.ranked_per_class_names(Some(args.top));
    if per_class_names.len() > 2 {
        section("Per class");
        for (class, names) in global.class_names().iter().zip(&per_class_names) {
            println!("  {:<20} {}", muted(class), names.join(", "));
        }
    }

    if let Some(output) = &args.output {
        report::write_json(&GlobalReport::from_global(&global, strategy, None), output)?;
        println!();
        step_ok(&format!("Report written to {}", output.display()));
    }

    println!();
    Ok(())
}

pub fn cmd_info(model_path: &Path) -> anyhow::Result<()> {
    section("Model Info");

    let model = ModelSpec::load(model_path)?;

    println!("  {:<12} {}", muted("File"), model_path.display());
    println!("  {:<12} {}", muted("Kind"), model.kind());
    if let Some(n) = model.n_features() {
        println!("  {:<12} {}", muted("Features"), n);
    }
    println!("  {:<12} {}", muted("Classes"), model.class_names().join(", "));

    if let Some(tree) = model.tree() {
        print_tree_info(tree);
    }

    println!();
    Ok(())
}

fn print_tree_info(tree: &TreeClassifier) {
    println!("  {:<12} {}", muted("Depth"), tree.depth());
    println!("  {:<12} {}", muted("Leaves"), tree.n_leaves());
    println!("  {:<12} {}", muted("Nodes"), tree.n_nodes());
    println!("  {:<12} {}", muted("Strategies"), "monte-carlo, tree-path, exact".white());
}
