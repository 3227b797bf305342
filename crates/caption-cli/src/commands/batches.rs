//! Training stream inspection

use anyhow::{Context as _, Result};
use caption_net_common::{TokenizerAdapter, Vocabulary};
use caption_net_text::{load_clean_descriptions, read_image_ids};
use caption_net_training::{sequence_batch_stream, steps_per_epoch, FeatureStore};
use clap::Args;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::CaptionNetConfig;

#[derive(Args)]
pub struct BatchesCommand {
    /// Number of batches to pull
    #[arg(short = 'n', long, default_value = "1")]
    count: usize,

    /// Stop after this many consecutive passes without a batch
    #[arg(long, value_name = "PASSES")]
    max_empty_passes: Option<usize>,
}

impl BatchesCommand {
    pub fn execute(self, config: &CaptionNetConfig) -> Result<()> {
        let start = Instant::now();

        let vocab = Vocabulary::load(&config.data.vocabulary_file)
            .context("Failed to load vocabulary")?;
        let mut descriptions = load_clean_descriptions(&config.data.descriptions_file)
            .context("Failed to load cleaned descriptions")?;

        let features = if config.data.train_split_file.exists() {
            let train_ids = read_image_ids(&config.data.train_split_file)?;
            descriptions = descriptions.filter(&train_ids);
            FeatureStore::load_filtered(&config.data.features_file, &train_ids)?
        } else {
            warn!(
                "Train split {} not found, using every image",
                config.data.train_split_file.display()
            );
            FeatureStore::load(&config.data.features_file)?
        };

        let mut stream_config = config.stream_config(vocab.vocab_size());
        if self.max_empty_passes.is_some() {
            stream_config.max_empty_passes = self.max_empty_passes;
        }

        let steps = steps_per_epoch(descriptions.len(), stream_config.batch_size);
        println!("Training images:   {}", descriptions.len());
        println!("Feature vectors:   {}", features.len());
        println!("Vocabulary size:   {}", vocab.vocab_size());
        println!("Max length:        {}", stream_config.max_length);
        println!(
            "Steps per epoch:   {} ({} epochs)",
            steps, config.hyperparameters.epochs
        );

        let mut stream = sequence_batch_stream(&descriptions, &features, &vocab, stream_config)?;
        for (i, batch) in stream.by_ref().take(self.count).enumerate() {
            let batch = batch?;
            println!(
                "Batch {}: image_input {:?}, text_input {:?}, targets {:?}",
                i + 1,
                batch.image_input.dim(),
                batch.text_input.dim(),
                batch.targets.dim()
            );
        }

        let stats = stream.stats();
        info!(
            "Pulled {} batches in {:.2}s ({} passes, {} skipped keys, {} mismatched keys, {} empty windows)",
            stats.batches,
            start.elapsed().as_secs_f64(),
            stats.passes,
            stats.skipped_keys,
            stats.mismatched_keys,
            stats.empty_windows
        );
        Ok(())
    }
}
