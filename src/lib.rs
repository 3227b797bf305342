//! CaptionNet - image captioning with a CNN encoder and a sequence decoder
//!
//! Umbrella crate re-exporting the workspace libraries:
//! - [`common`]: vocabulary, tokenizer/oracle/extractor traits, shared errors
//! - [`text`]: caption cleaning and vocabulary fitting
//! - [`generation`]: greedy and beam-search decoding
//! - [`training`]: training-pair expansion and the batch stream
//! - [`onnx`]: ONNX Runtime feature extractor and decoder oracle

pub use caption_net_common as common;
pub use caption_net_generation as generation;
pub use caption_net_onnx as onnx;
pub use caption_net_text as text;
pub use caption_net_training as training;

pub use caption_net_common::{
    Descriptions, FeatureExtractor, NextTokenOracle, ProcessingError, TokenId, TokenizerAdapter,
    Vocabulary,
};
pub use caption_net_generation::{CaptionConfig, CaptionGenerator, SearchStrategy, TextGenerator};
pub use caption_net_training::{expand_caption, sequence_batch_stream, StreamConfig};
