//! Project configuration
//!
//! Every field has a default, so a YAML file only needs the values it
//! overrides:
//!
//! ```yaml
//! data:
//!   images_dir: /datasets/flickr8k/images
//! hyperparameters:
//!   batch_size: 16
//! ```

use anyhow::{Context as _, Result};
use caption_net_generation::{CaptionConfig, SearchStrategy};
use caption_net_training::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Dataset inputs and preprocessing outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    /// Raw Flickr8k token file
    pub caption_file: PathBuf,
    pub images_dir: PathBuf,
    /// One training image file name per line
    pub train_split_file: PathBuf,
    pub processed_dir: PathBuf,
    pub descriptions_file: PathBuf,
    pub vocabulary_file: PathBuf,
    pub features_file: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            caption_file: PathBuf::from("data/raw/caption/Flickr8k.token.txt"),
            images_dir: PathBuf::from("data/raw/images"),
            train_split_file: PathBuf::from("data/raw/caption/Flickr_8k.trainImages.txt"),
            processed_dir: PathBuf::from("data/processed"),
            descriptions_file: PathBuf::from("data/processed/descriptions.txt"),
            vocabulary_file: PathBuf::from("data/processed/tokenizer.json"),
            features_file: PathBuf::from("data/processed/features.json"),
        }
    }
}

/// ONNX exports of the two networks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub models_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    /// VGG16 cut at fc2
    pub extractor_model: PathBuf,
    /// Trained caption decoder
    pub decoder_model: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            checkpoint_dir: PathBuf::from("models/checkpoints"),
            extractor_model: PathBuf::from("models/vgg16_fc2.onnx"),
            decoder_model: PathBuf::from("models/final_model.onnx"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub image_size: u32,
    pub max_length: usize,
    pub embedding_dim: usize,
    pub units: usize,
    pub dropout: f32,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f32,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            image_size: 224,
            max_length: 34,
            embedding_dim: 256,
            units: 256,
            dropout: 0.5,
            batch_size: 32,
            epochs: 20,
            learning_rate: 0.001,
        }
    }
}

/// Decoding and batch stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub strategy: SearchStrategy,
    pub num_beams: usize,
    /// Empty passes tolerated by the batch stream; unset keeps skipping
    pub max_empty_passes: Option<usize>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Beam,
            num_beams: 3,
            max_empty_passes: None,
        }
    }
}

/// Full project configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionNetConfig {
    pub data: DataPaths,
    pub models: ModelPaths,
    pub hyperparameters: Hyperparameters,
    pub runtime: RuntimeSettings,
}

impl CaptionNetConfig {
    /// Load configuration overrides from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load `path` if given, otherwise use the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml(path),
            None => Ok(Self::default()),
        }
    }

    /// Create the processed-data, model and checkpoint directories
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.data.processed_dir,
            &self.models.models_dir,
            &self.models.checkpoint_dir,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn caption_config(&self) -> CaptionConfig {
        CaptionConfig {
            max_length: self.hyperparameters.max_length,
            strategy: self.runtime.strategy,
            num_beams: self.runtime.num_beams,
        }
    }

    pub fn stream_config(&self, vocab_size: usize) -> StreamConfig {
        StreamConfig {
            max_length: self.hyperparameters.max_length,
            vocab_size,
            batch_size: self.hyperparameters.batch_size,
            max_empty_passes: self.runtime.max_empty_passes,
            embedding_dim: None,
        }
    }
}
