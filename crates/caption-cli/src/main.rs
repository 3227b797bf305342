//! CaptionNet CLI - image captioning with a CNN encoder and sequence decoder
//!
//! Command-line interface for caption preprocessing, feature extraction,
//! captioning and training-batch inspection.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod config;

use commands::batches::BatchesCommand;
use commands::caption::CaptionCommand;
use commands::extract::ExtractCommand;
use commands::preprocess::PreprocessCommand;
use config::CaptionNetConfig;

#[derive(Parser)]
#[command(
    name = "caption-net",
    version,
    about = "Image captioning with greedy and beam-search decoding",
    after_help = "EXAMPLES:\n  \
                  # Clean captions and fit the vocabulary\n  \
                  caption-net preprocess\n\n  \
                  # Extract VGG16 features for every image\n  \
                  caption-net extract --images-dir data/raw/images\n\n  \
                  # Caption an image\n  \
                  caption-net caption photo.jpg --strategy greedy\n  \
                  caption-net caption photo.jpg --beams 5 --json\n\n  \
                  # Inspect the training stream\n  \
                  caption-net batches --count 3 --max-empty-passes 2"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file (defaults are used when omitted)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw captions and fit the vocabulary
    Preprocess(PreprocessCommand),

    /// Extract image embeddings for a directory of images
    Extract(ExtractCommand),

    /// Generate a caption for one image
    Caption(CaptionCommand),

    /// Pull batches from the training stream and report their shapes
    Batches(BatchesCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = CaptionNetConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Preprocess(cmd) => cmd.execute(&config),
        Commands::Extract(cmd) => cmd.execute(&config),
        Commands::Caption(cmd) => cmd.execute(&config),
        Commands::Batches(cmd) => cmd.execute(&config),
    }
}
