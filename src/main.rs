//! Shapley - Main Entry Point
//!
//! Explains classifier predictions from the command line.

use clap::Parser;
use shapley_explain::cli::{cmd_explain, cmd_global, cmd_info, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shapley_explain=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Explain { model, reference, data, engine } => {
            cmd_explain(&model, &reference, &data, &engine)?;
        }
        Commands::Global { model, data, engine } => {
            cmd_global(&model, &data, &engine)?;
        }
        Commands::Info { model } => {
            cmd_info(&model)?;
        }
    }

    Ok(())
}
