//! Perpetual batch stream over a captioned dataset
//!
//! Images are visited in the insertion order of the descriptions, `batch_size`
//! keys per window. Every window whose images expand to at least one pair
//! yields one batch; the stream then starts over at the first image. Images
//! without a stored embedding, or whose embedding width differs from the
//! stream's, are skipped and counted, never reported as errors.

use caption_net_common::{flatten_embedding, Descriptions, TokenizerAdapter};
use tracing::{debug, info, warn};

use crate::batch::{BatchBuilder, SequenceBatch};
use crate::dataset::FeatureStore;
use crate::expander::expand_into;
use crate::TrainingError;

/// Batch stream settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Prefix length after padding
    pub max_length: usize,
    /// Width of the one-hot targets
    pub vocab_size: usize,
    /// Image keys per window
    pub batch_size: usize,
    /// Consecutive passes without any batch before the stream gives up.
    /// `None` keeps skipping forever.
    pub max_empty_passes: Option<usize>,
    /// Flattened image embedding width. `None` takes the width of the first
    /// embedding the stream expands.
    pub embedding_dim: Option<usize>,
}

impl StreamConfig {
    #[must_use]
    pub fn new(max_length: usize, vocab_size: usize, batch_size: usize) -> Self {
        Self {
            max_length,
            vocab_size,
            batch_size,
            max_empty_passes: None,
            embedding_dim: None,
        }
    }

    #[must_use]
    pub fn with_max_empty_passes(mut self, passes: usize) -> Self {
        self.max_empty_passes = Some(passes);
        self
    }

    #[must_use]
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = Some(dim);
        self
    }

    fn validate(&self) -> Result<(), TrainingError> {
        for (name, value) in [
            ("max_length", self.max_length),
            ("vocab_size", self.vocab_size),
            ("batch_size", self.batch_size),
        ] {
            if value == 0 {
                return Err(TrainingError::InvalidConfig(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }
        if self.max_empty_passes == Some(0) {
            return Err(TrainingError::InvalidConfig(
                "max_empty_passes must be at least 1".to_string(),
            ));
        }
        if self.embedding_dim == Some(0) {
            return Err(TrainingError::InvalidConfig(
                "embedding_dim must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counters describing what the stream has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Completed passes over the dataset
    pub passes: usize,
    /// Batches yielded
    pub batches: usize,
    /// Image keys skipped for lack of an embedding (counted on every pass)
    pub skipped_keys: usize,
    /// Image keys skipped because their embedding width differs from the
    /// stream's (counted on every pass)
    pub mismatched_keys: usize,
    /// Windows that produced no pair
    pub empty_windows: usize,
    /// Trailing run of completed passes that yielded no batch
    pub consecutive_empty_passes: usize,
}

/// Iterator returned by [`sequence_batch_stream`]
///
/// Yields `Ok(batch)` indefinitely while the dataset produces pairs. Any
/// `Err` is the last item: the stream is exhausted afterwards.
pub struct SequenceBatchStream<'a, T: ?Sized> {
    descriptions: &'a Descriptions,
    features: &'a FeatureStore,
    tokenizer: &'a T,
    config: StreamConfig,
    position: usize,
    pass_batches: usize,
    embedding_dim: Option<usize>,
    stats: StreamStats,
    finished: bool,
}

/// Create a batch stream over `descriptions`, taking embeddings from `features`
///
/// # Errors
/// Returns an error if a length, the vocabulary size or the batch size is
/// zero, or if `max_empty_passes` or `embedding_dim` is `Some(0)`.
pub fn sequence_batch_stream<'a, T>(
    descriptions: &'a Descriptions,
    features: &'a FeatureStore,
    tokenizer: &'a T,
    config: StreamConfig,
) -> Result<SequenceBatchStream<'a, T>, TrainingError>
where
    T: TokenizerAdapter + ?Sized,
{
    config.validate()?;
    info!(
        "Batch stream over {} images ({} with embeddings), batch size {}",
        descriptions.len(),
        descriptions.keys().filter(|k| features.contains(k)).count(),
        config.batch_size
    );

    Ok(SequenceBatchStream {
        descriptions,
        features,
        tokenizer,
        config,
        position: 0,
        pass_batches: 0,
        embedding_dim: config.embedding_dim,
        stats: StreamStats::default(),
        finished: false,
    })
}

impl<'a, T: TokenizerAdapter + ?Sized> SequenceBatchStream<'a, T> {
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Embedding width every batch carries, once known
    pub fn embedding_dim(&self) -> Option<usize> {
        self.embedding_dim
    }

    /// Expand the next window; `Ok(None)` when every key in it was skipped
    fn next_window(&mut self) -> Result<Option<SequenceBatch>, TrainingError> {
        let descriptions: &'a Descriptions = self.descriptions;
        let features: &'a FeatureStore = self.features;
        let tokenizer: &'a T = self.tokenizer;

        let start = self.position;
        let end = (start + self.config.batch_size).min(descriptions.len());
        self.position = end;

        let mut builder = BatchBuilder::new(self.config.max_length, self.config.vocab_size);
        for (key, captions) in (start..end).filter_map(|i| descriptions.entry(i)) {
            let Some(native) = features.get(key) else {
                debug!("No embedding for image {}, skipping", key);
                self.stats.skipped_keys += 1;
                continue;
            };
            let embedding = flatten_embedding(native.view());
            match self.embedding_dim {
                Some(expected) if expected != embedding.len() => {
                    warn!(
                        "DataMismatch: embedding for image {} has {} values, expected {}, skipping",
                        key,
                        embedding.len(),
                        expected
                    );
                    self.stats.mismatched_keys += 1;
                    continue;
                }
                Some(_) => {}
                None => {
                    debug!("Embedding width fixed at {} by image {}", embedding.len(), key);
                    self.embedding_dim = Some(embedding.len());
                }
            }
            expand_into(&mut builder, tokenizer, captions, embedding.view())?;
        }

        if builder.is_empty() {
            warn!(
                "No pairs in window {}..{}: no image in it has a usable embedding",
                start, end
            );
            self.stats.empty_windows += 1;
            return Ok(None);
        }
        builder.finish().map(Some)
    }

    /// Close the current pass; returns the error that ends the stream once
    /// the empty-pass bound is hit
    fn finish_pass(&mut self) -> Option<TrainingError> {
        self.position = 0;
        self.stats.passes += 1;

        if self.pass_batches > 0 {
            self.stats.consecutive_empty_passes = 0;
            self.pass_batches = 0;
            return None;
        }

        self.stats.consecutive_empty_passes += 1;
        let passes = self.stats.consecutive_empty_passes;
        warn!(
            "NoMatchingData: pass {} over {} images yielded no batch ({} consecutive)",
            self.stats.passes,
            self.descriptions.len(),
            passes
        );
        match self.config.max_empty_passes {
            Some(limit) if passes >= limit => Some(TrainingError::NoMatchingData { passes }),
            _ => None,
        }
    }
}

impl<T: TokenizerAdapter + ?Sized> Iterator for SequenceBatchStream<'_, T> {
    type Item = Result<SequenceBatch, TrainingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if self.position >= self.descriptions.len() {
                if let Some(err) = self.finish_pass() {
                    self.finished = true;
                    return Some(Err(err));
                }
                if self.descriptions.is_empty() {
                    continue;
                }
            }

            match self.next_window() {
                Ok(Some(batch)) => {
                    self.pass_batches += 1;
                    self.stats.batches += 1;
                    if self.stats.batches == 1 {
                        info!(
                            "First batch ready: {} pairs, embedding dim {}",
                            batch.len(),
                            batch.image_input.ncols()
                        );
                    }
                    return Some(Ok(batch));
                }
                Ok(None) => continue,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
