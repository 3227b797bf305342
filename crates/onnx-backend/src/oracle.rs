//! Next-token oracle backed by the trained decoder network

use caption_net_common::{NextTokenOracle, OracleError, TokenId};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use tracing::debug;

use crate::{create_session, OnnxError};

/// Decoder input carrying the image embedding, `[1, embedding_dim]`
pub const IMAGE_INPUT: &str = "image_input";
/// Decoder input carrying the padded prefix as float ids, `[1, max_length]`
pub const TEXT_INPUT: &str = "text_input";

pub struct OnnxOracle {
    session: Session,
    image_input: String,
    text_input: String,
}

impl OnnxOracle {
    /// Load the decoder with the default input names
    pub fn new(model_path: &Path) -> Result<Self, OnnxError> {
        Self::with_input_names(model_path, IMAGE_INPUT, TEXT_INPUT)
    }

    pub fn with_input_names(
        model_path: &Path,
        image_input: &str,
        text_input: &str,
    ) -> Result<Self, OnnxError> {
        let session = create_session(model_path)?;
        Ok(Self {
            session,
            image_input: image_input.to_string(),
            text_input: text_input.to_string(),
        })
    }
}

/// Shape the decoder inputs for a single query
fn decoder_inputs(
    embedding: ArrayView1<'_, f32>,
    padded_prefix: &[TokenId],
) -> (Array2<f32>, Array2<f32>) {
    let image = embedding.to_owned().insert_axis(Axis(0));
    let text = Array1::from_iter(padded_prefix.iter().map(|&id| id as f32)).insert_axis(Axis(0));
    (image, text)
}

impl NextTokenOracle for OnnxOracle {
    fn predict(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        padded_prefix: &[TokenId],
    ) -> Result<Array1<f32>, OracleError> {
        let (image, text) = decoder_inputs(embedding, padded_prefix);

        let image = TensorRef::from_array_view(image.view())
            .map_err(|e| OracleError::Inference(e.to_string()))?;
        let text = TensorRef::from_array_view(text.view())
            .map_err(|e| OracleError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![
                self.image_input.as_str() => image,
                self.text_input.as_str() => text,
            ])
            .map_err(|e| OracleError::Inference(e.to_string()))?;

        let (_shape, probs) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OracleError::Inference(e.to_string()))?;
        if probs.is_empty() {
            return Err(OracleError::InvalidOutput(
                "decoder returned an empty distribution".to_string(),
            ));
        }

        debug!("Decoder distribution over {} tokens", probs.len());
        Ok(Array1::from(probs.to_vec()))
    }
}
