//! Training-data assembly for the caption decoder
//!
//! Turns cleaned captions and stored image embeddings into supervised
//! (image, prefix, next-token) pairs and groups them into batches.
//!
//! # Features
//! - [`expand_caption`]: every split point of every caption becomes one pair
//! - [`sequence_batch_stream`]: a perpetual batch iterator over a dataset,
//!   skipping images whose embedding is missing
//! - [`FeatureStore`]: persisted per-image embeddings
//!
//! # Example
//! ```no_run
//! use caption_net_common::{TokenizerAdapter, Vocabulary};
//! use caption_net_text::load_clean_descriptions;
//! use caption_net_training::{sequence_batch_stream, FeatureStore, StreamConfig};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptions = load_clean_descriptions("data/processed/descriptions.txt")?;
//! let features = FeatureStore::load("data/processed/features.json")?;
//! let vocab = Vocabulary::load("data/processed/tokenizer.json")?;
//!
//! let config = StreamConfig::new(34, vocab.vocab_size(), 32).with_max_empty_passes(3);
//! for batch in sequence_batch_stream(&descriptions, &features, &vocab, config)?.take(10) {
//!     let batch = batch?;
//!     println!("{} pairs", batch.len());
//! }
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod dataset;
mod expander;
mod stream;

pub use batch::SequenceBatch;
pub use dataset::{steps_per_epoch, FeatureStore};
pub use expander::expand_caption;
pub use stream::{sequence_batch_stream, SequenceBatchStream, StreamConfig, StreamStats};

use caption_net_common::TokenId;
use thiserror::Error;

/// Errors raised while assembling training data
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Target token {token} is outside the vocabulary (size {vocab_size})")]
    TargetOutOfRange { token: TokenId, vocab_size: usize },

    #[error("Embedding has {actual} values, expected {expected}")]
    EmbeddingDimension { expected: usize, actual: usize },

    #[error("No image in the dataset has an embedding ({passes} consecutive empty passes)")]
    NoMatchingData { passes: usize },

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrainingError>;
