/// Common types and utilities shared by the captioning crates
use ndarray::{Array1, ArrayViewD};
use thiserror::Error;

pub mod descriptions;
pub mod oracle;
pub mod vocab;

pub use descriptions::Descriptions;
pub use oracle::{FeatureExtractor, NextTokenOracle, OracleError};
pub use vocab::{ControlTokens, TokenizerAdapter, Vocabulary, END_TOKEN, PAD_TOKEN, START_TOKEN};

/// Vocabulary id of a token
pub type TokenId = u32;

/// Id reserved for padding; never assigned to a real token
pub const PAD_ID: TokenId = 0;

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Left-pad `ids` with [`PAD_ID`] to exactly `max_length` entries.
///
/// Sequences longer than `max_length` keep their last `max_length` ids.
#[must_use]
pub fn pad_sequence(ids: &[TokenId], max_length: usize) -> Vec<TokenId> {
    let kept = &ids[ids.len().saturating_sub(max_length)..];
    let mut padded = vec![PAD_ID; max_length - kept.len()];
    padded.extend_from_slice(kept);
    padded
}

/// Flatten an embedding in the extractor's native layout (e.g. `[1, 4096]`)
/// to a single dimension, in logical (row-major) order.
#[must_use]
pub fn flatten_embedding(embedding: ArrayViewD<'_, f32>) -> Array1<f32> {
    embedding.iter().copied().collect()
}
