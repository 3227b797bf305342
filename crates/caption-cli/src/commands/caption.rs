//! Caption one image

use anyhow::{Context as _, Result};
use caption_net_common::Vocabulary;
use caption_net_generation::{CaptionGenerator, SearchStrategy};
use caption_net_onnx::{OnnxFeatureExtractor, OnnxOracle};
use clap::Args;
use std::path::PathBuf;

use crate::config::CaptionNetConfig;

#[derive(Args)]
pub struct CaptionCommand {
    /// Image to caption
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Decoding strategy: greedy or beam (anything else selects beam)
    #[arg(short, long)]
    strategy: Option<String>,

    /// Beam width
    #[arg(short, long)]
    beams: Option<usize>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl CaptionCommand {
    pub fn execute(self, config: &CaptionNetConfig) -> Result<()> {
        if !self.image.exists() {
            anyhow::bail!("Input file does not exist: {}", self.image.display());
        }

        let vocab = Vocabulary::load(&config.data.vocabulary_file).with_context(|| {
            format!(
                "Failed to load vocabulary from {}",
                config.data.vocabulary_file.display()
            )
        })?;
        let extractor = OnnxFeatureExtractor::new(&config.models.extractor_model)
            .context("Failed to load feature extractor")?
            .with_image_size(config.hyperparameters.image_size);
        let oracle =
            OnnxOracle::new(&config.models.decoder_model).context("Failed to load decoder")?;

        let caption_config = config.caption_config();
        let strategy = self
            .strategy
            .as_deref()
            .map_or(caption_config.strategy, SearchStrategy::from);
        let num_beams = self.beams.unwrap_or(caption_config.num_beams);

        let mut generator = CaptionGenerator::new(extractor, oracle, vocab, caption_config)?;
        let result = generator
            .generate_caption_with(&self.image, strategy, num_beams)
            .with_context(|| format!("Failed to caption {}", self.image.display()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            println!("{}", result.text);
        }
        Ok(())
    }
}
