use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pixelbatch")]
#[command(author, version, about = "Batch image processing with configurable action pipelines")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a directory of images through the configured pipeline
    Run {
        /// Input directory to process
        #[arg(required = true)]
        input: PathBuf,

        /// Output directory (overrides the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not descend into subdirectories
        #[arg(long)]
        flat: bool,
    },

    /// Show the output names a run would produce, without processing
    Preview {
        /// Input directory to preview
        #[arg(required = true)]
        input: PathBuf,

        /// Do not descend into subdirectories
        #[arg(long)]
        flat: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
