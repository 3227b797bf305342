//! Caption decoding from image embeddings
//!
//! This crate turns a fixed-length image embedding into a caption by repeatedly
//! querying a next-token oracle (the trained sequence model) and extending one or
//! more candidate token sequences.
//!
//! # Features
//! - Greedy decoding (argmax at every step)
//! - Beam search with cumulative log-probability scores
//! - End-to-end captioning of image files through a [`FeatureExtractor`]
//!
//! The oracle, the feature extractor and the tokenizer are explicit handles owned
//! by the generator; there is no process-wide model state.
//!
//! # Example
//! ```no_run
//! use caption_net_common::{FeatureExtractor, NextTokenOracle, Vocabulary};
//! use caption_net_generation::{CaptionConfig, CaptionGenerator};
//! use std::path::Path;
//!
//! # fn run<E: FeatureExtractor, O: NextTokenOracle>(extractor: E, oracle: O) -> Result<(), Box<dyn std::error::Error>> {
//! let vocab = Vocabulary::load("data/processed/tokenizer.json")?;
//! let mut generator = CaptionGenerator::new(extractor, oracle, vocab, CaptionConfig::default())?;
//!
//! let caption = generator.generate_caption(Path::new("image.jpg"))?;
//! println!("Caption: {}", caption.text);
//! # Ok(())
//! # }
//! ```

mod generation;

pub use generation::{Candidate, TextGenerator, LOG_EPSILON};

use caption_net_common::{
    flatten_embedding, FeatureExtractor, NextTokenOracle, OracleError, ProcessingError,
    TokenizerAdapter,
};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Decoding strategy
///
/// Parsing is lenient: `"greedy"` selects greedy decoding and every other
/// input selects beam search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SearchStrategy {
    Greedy,
    #[default]
    Beam,
}

impl SearchStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greedy => "greedy",
            Self::Beam => "beam",
        }
    }
}

impl From<&str> for SearchStrategy {
    fn from(s: &str) -> Self {
        if s == "greedy" {
            Self::Greedy
        } else {
            Self::Beam
        }
    }
}

impl From<String> for SearchStrategy {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl FromStr for SearchStrategy {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for caption decoding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Maximum caption length in tokens, including START/END
    pub max_length: usize,
    /// Default decoding strategy
    pub strategy: SearchStrategy,
    /// Number of beams for beam search
    pub num_beams: usize,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            max_length: 34, // Longest cleaned Flickr8k caption
            strategy: SearchStrategy::Beam,
            num_beams: 3,
        }
    }
}

impl CaptionConfig {
    /// Reject zero lengths and zero beam widths
    pub fn validate(&self) -> Result<(), CaptionError> {
        if self.max_length == 0 {
            return Err(CaptionError::InvalidConfig(
                "max_length must be at least 1".to_string(),
            ));
        }
        if self.num_beams == 0 {
            return Err(CaptionError::InvalidConfig(
                "num_beams must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Caption generation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionResult {
    /// Generated caption text
    pub text: String,
    /// Strategy that produced the caption
    pub strategy: SearchStrategy,
    /// Cumulative log score of the chosen beam (beam search only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Errors that can occur during caption generation
#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Feature extraction error: {0}")]
    Extraction(#[from] ProcessingError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CaptionError> for ProcessingError {
    fn from(err: CaptionError) -> Self {
        match err {
            CaptionError::Extraction(inner) => inner,
            other => ProcessingError::Other(other.to_string()),
        }
    }
}

/// End-to-end captioner: feature extractor + decoder
pub struct CaptionGenerator<E, O, T> {
    extractor: E,
    generator: TextGenerator<O, T>,
    config: CaptionConfig,
}

impl<E, O, T> CaptionGenerator<E, O, T>
where
    E: FeatureExtractor,
    O: NextTokenOracle,
    T: TokenizerAdapter,
{
    /// Create a new caption generator
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the tokenizer lacks
    /// the START/END markers
    pub fn new(
        extractor: E,
        oracle: O,
        tokenizer: T,
        config: CaptionConfig,
    ) -> Result<Self, CaptionError> {
        config.validate()?;
        let generator = TextGenerator::from_tokenizer(oracle, tokenizer)?;

        info!(
            "Caption generator ready (vocab size {}, max length {}, default strategy {})",
            generator.tokenizer().vocab_size(),
            config.max_length,
            config.strategy
        );

        Ok(Self {
            extractor,
            generator,
            config,
        })
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.config
    }

    /// Caption an image file with the configured strategy
    pub fn generate_caption(&mut self, image_path: &Path) -> Result<CaptionResult, CaptionError> {
        let (strategy, num_beams) = (self.config.strategy, self.config.num_beams);
        self.generate_caption_with(image_path, strategy, num_beams)
    }

    /// Caption an image file with an explicit strategy and beam width
    pub fn generate_caption_with(
        &mut self,
        image_path: &Path,
        strategy: SearchStrategy,
        num_beams: usize,
    ) -> Result<CaptionResult, CaptionError> {
        let start = Instant::now();
        debug!("Processing image at {}", image_path.display());

        let features = self.extractor.extract(image_path)?;
        let embedding = flatten_embedding(features.view());

        let result = self.caption_embedding(embedding.view(), strategy, num_beams)?;
        info!(
            "Captioned {} with {} search in {:.3}s",
            image_path.display(),
            strategy,
            start.elapsed().as_secs_f64()
        );
        Ok(result)
    }

    /// Caption an already-extracted embedding
    pub fn caption_embedding(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        strategy: SearchStrategy,
        num_beams: usize,
    ) -> Result<CaptionResult, CaptionError> {
        let (text, score) =
            self.generator
                .decode_scored(embedding, strategy, self.config.max_length, num_beams)?;
        Ok(CaptionResult {
            text,
            strategy,
            score,
        })
    }
}
