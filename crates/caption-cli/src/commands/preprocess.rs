//! Raw captions to cleaned descriptions and vocabulary

use anyhow::{Context as _, Result};
use caption_net_common::TokenizerAdapter;
use caption_net_text::{
    clean_descriptions, fit_vocabulary, max_caption_length, read_descriptions, save_descriptions,
};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use crate::config::CaptionNetConfig;

#[derive(Args)]
pub struct PreprocessCommand {
    /// Raw caption file (overrides the configured path)
    #[arg(long, value_name = "FILE")]
    captions: Option<PathBuf>,
}

impl PreprocessCommand {
    pub fn execute(self, config: &CaptionNetConfig) -> Result<()> {
        let start = Instant::now();
        config.ensure_directories()?;

        let caption_file = self.captions.unwrap_or_else(|| config.data.caption_file.clone());
        let mut descriptions = read_descriptions(&caption_file)
            .with_context(|| format!("Failed to load captions from {}", caption_file.display()))?;
        clean_descriptions(&mut descriptions);

        save_descriptions(&descriptions, &config.data.descriptions_file)
            .context("Failed to save cleaned descriptions")?;

        let vocab = fit_vocabulary(&descriptions).context("Failed to fit vocabulary")?;
        vocab
            .save(&config.data.vocabulary_file)
            .context("Failed to save vocabulary")?;

        let max_length = max_caption_length(&descriptions);
        info!(
            "Preprocessed {} images in {:.2}s",
            descriptions.len(),
            start.elapsed().as_secs_f64()
        );

        println!("Images:            {}", descriptions.len());
        println!("Vocabulary size:   {}", vocab.vocab_size());
        println!("Max caption words: {}", max_length);
        println!("Descriptions:      {}", config.data.descriptions_file.display());
        println!("Vocabulary:        {}", config.data.vocabulary_file.display());
        Ok(())
    }
}
