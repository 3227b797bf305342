//! Capability contracts for the two opaque networks

use ndarray::{Array1, ArrayD, ArrayView1};
use std::path::Path;
use thiserror::Error;

use crate::TokenId;

/// Errors raised by an oracle call
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Oracle inference failed: {0}")]
    Inference(String),

    #[error("Invalid oracle output: {0}")]
    InvalidOutput(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Next-token probability function backed by the trained sequence model
pub trait NextTokenOracle {
    /// Probability distribution over the vocabulary for the token following
    /// `padded_prefix` (already left-padded to the model's sequence length).
    fn predict(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        padded_prefix: &[TokenId],
    ) -> Result<Array1<f32>, OracleError>;
}

impl<O: NextTokenOracle + ?Sized> NextTokenOracle for &mut O {
    fn predict(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        padded_prefix: &[TokenId],
    ) -> Result<Array1<f32>, OracleError> {
        (**self).predict(embedding, padded_prefix)
    }
}

impl<O: NextTokenOracle + ?Sized> NextTokenOracle for Box<O> {
    fn predict(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        padded_prefix: &[TokenId],
    ) -> Result<Array1<f32>, OracleError> {
        (**self).predict(embedding, padded_prefix)
    }
}

/// Image feature extractor producing one embedding per image file
pub trait FeatureExtractor {
    /// Embedding in the extractor's native layout; failures on unreadable
    /// files propagate.
    fn extract(&mut self, image_path: &Path) -> crate::Result<ArrayD<f32>>;
}

impl<E: FeatureExtractor + ?Sized> FeatureExtractor for Box<E> {
    fn extract(&mut self, image_path: &Path) -> crate::Result<ArrayD<f32>> {
        (**self).extract(image_path)
    }
}
