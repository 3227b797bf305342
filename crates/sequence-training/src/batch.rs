//! Aligned (image, prefix, target) training batches

use caption_net_common::{pad_sequence, TokenId};
use ndarray::{Array2, ArrayView1, Axis};

use crate::TrainingError;

/// Aligned training pairs; row `i` of every array belongs to pair `i`
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceBatch {
    /// Image embedding per pair, `[pairs, embedding_dim]`
    pub image_input: Array2<f32>,
    /// Left-padded token prefix per pair, `[pairs, max_length]`
    pub text_input: Array2<TokenId>,
    /// One-hot next token per pair, `[pairs, vocab_size]`
    pub targets: Array2<f32>,
}

impl SequenceBatch {
    /// Number of pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.text_input.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Target token id of every pair (the hot index of each target row)
    #[must_use]
    pub fn target_ids(&self) -> Vec<TokenId> {
        self.targets
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .position(|&v| v == 1.0)
                    .and_then(|idx| TokenId::try_from(idx).ok())
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// Accumulates pairs into flat buffers and shapes them on `finish`
pub(crate) struct BatchBuilder {
    max_length: usize,
    vocab_size: usize,
    embedding_dim: Option<usize>,
    images: Vec<f32>,
    prefixes: Vec<TokenId>,
    targets: Vec<f32>,
    rows: usize,
}

impl BatchBuilder {
    pub(crate) fn new(max_length: usize, vocab_size: usize) -> Self {
        Self {
            max_length,
            vocab_size,
            embedding_dim: None,
            images: Vec::new(),
            prefixes: Vec::new(),
            targets: Vec::new(),
            rows: 0,
        }
    }

    /// Add one pair; nothing is written if the pair is rejected
    pub(crate) fn push_pair(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        prefix: &[TokenId],
        target: TokenId,
    ) -> Result<(), TrainingError> {
        let hot = target as usize;
        if hot >= self.vocab_size {
            return Err(TrainingError::TargetOutOfRange {
                token: target,
                vocab_size: self.vocab_size,
            });
        }
        match self.embedding_dim {
            Some(expected) if expected != embedding.len() => {
                return Err(TrainingError::EmbeddingDimension {
                    expected,
                    actual: embedding.len(),
                });
            }
            Some(_) => {}
            None => self.embedding_dim = Some(embedding.len()),
        }

        self.images.extend(embedding.iter().copied());
        self.prefixes.extend(pad_sequence(prefix, self.max_length));
        let offset = self.targets.len();
        self.targets.resize(offset + self.vocab_size, 0.0);
        self.targets[offset + hot] = 1.0;
        self.rows += 1;
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.rows
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub(crate) fn finish(self) -> Result<SequenceBatch, TrainingError> {
        let dim = self.embedding_dim.unwrap_or(0);
        Ok(SequenceBatch {
            image_input: Array2::from_shape_vec((self.rows, dim), self.images)?,
            text_input: Array2::from_shape_vec((self.rows, self.max_length), self.prefixes)?,
            targets: Array2::from_shape_vec((self.rows, self.vocab_size), self.targets)?,
        })
    }
}
