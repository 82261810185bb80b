mod cli;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use pb_pipeline::batcher::{RunOutcome, RunSummary};
use pixelbatch::{config, runner};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on the verbose
    // flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "pixelbatch=trace,pb_pipeline=trace,pb_tree=debug".to_string()
        } else {
            "pixelbatch=info,pb_pipeline=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Run {
            input,
            output,
            flat,
        } => run(&input, output.as_deref(), flat, cli.config.as_deref()),
        Commands::Preview { input, flat } => preview(&input, flat, cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate(path.as_deref())
        }
        Commands::Version => {
            println!("pixelbatch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run(
    input: &Path,
    output: Option<&Path>,
    flat: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::Config::load_or_default(config_path)?;
    if let Some(output) = output {
        config.batch.output_directory = output.to_path_buf();
    }

    tracing::info!("Processing {}", input.display());

    let mut tree = runner::collect_tree(input, flat)?;
    let summary = runner::run_batch_on_tree(&config, &mut tree, false)?;

    println!(
        "{} of {} items processed",
        summary.processed_count, summary.matched_count
    );
    for path in &summary.exported {
        println!("  {}", path.display());
    }
    print_failures(&summary);

    match &summary.outcome {
        RunOutcome::Completed => Ok(()),
        RunOutcome::Canceled => {
            println!("Run canceled");
            Ok(())
        }
        RunOutcome::Failed { error } => anyhow::bail!("run failed: {error}"),
    }
}

fn preview(input: &Path, flat: bool, config_path: Option<&Path>) -> Result<()> {
    let config = config::Config::load_or_default(config_path)?;

    let mut tree = runner::collect_tree(input, flat)?;
    let summary = runner::run_batch_on_tree(&config, &mut tree, true)?;

    println!("Predicted output for {} items:", summary.predicted.len());
    for (name, path) in &summary.predicted {
        println!("  {name} -> {}", path.display());
    }
    print_failures(&summary);

    Ok(())
}

fn validate(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            println!("Validating config: {}", path.display());
            let config = config::Config::load(path)?;
            println!("Configuration is valid");
            println!("  Name pattern: {}", config.batch.name_pattern);
            println!("  File extension: {}", config.batch.file_extension);
            println!(
                "  Output directory: {}",
                config.batch.output_directory.display()
            );
            println!("  Actions: {}", config.actions.len());
            println!(
                "    Enabled: {}",
                config.actions.as_slice().iter().filter(|a| a.enabled).count()
            );
            println!("  Conditions: {}", config.conditions.len());
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("  Name pattern: {}", config.batch.name_pattern);
            println!("  File extension: {}", config.batch.file_extension);
        }
    }

    Ok(())
}

fn print_failures(summary: &RunSummary) {
    for (action, failures) in &summary.failed_actions {
        for failure in failures {
            let item = failure.item.as_deref().unwrap_or("<no item>");
            eprintln!("FAILED [{action}] {item}: {}", failure.message);
        }
    }
    for (condition, failures) in &summary.failed_conditions {
        for failure in failures {
            let item = failure.item.as_deref().unwrap_or("<no item>");
            eprintln!("FAILED [{condition}] {item}: {}", failure.message);
        }
    }
    for (action, skips) in &summary.skipped_actions {
        for skip in skips {
            let item = skip.item.as_deref().unwrap_or("<no item>");
            tracing::info!("skipped [{action}] {item}: {}", skip.message);
        }
    }
}
