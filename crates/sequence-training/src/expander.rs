//! Caption to (prefix, next-token) pair expansion

use caption_net_common::TokenizerAdapter;
use ndarray::ArrayView1;
use tracing::debug;

use crate::batch::{BatchBuilder, SequenceBatch};
use crate::TrainingError;

/// Expand one image's captions into supervised pairs.
///
/// Each caption is tokenized (unknown words are dropped by the tokenizer) and
/// every split point `i` in `1..ids.len()` yields the prefix `ids[..i]`,
/// left-padded to `max_length`, with `ids[i]` as one-hot target. A caption of
/// `n` known tokens therefore contributes `n - 1` pairs. Every pair carries
/// an unmodified copy of `embedding`.
///
/// # Errors
/// Returns an error if `max_length` or `vocab_size` is zero, or if a token id
/// does not fit in `vocab_size`.
pub fn expand_caption<T, S>(
    tokenizer: &T,
    captions: &[S],
    embedding: ArrayView1<'_, f32>,
    max_length: usize,
    vocab_size: usize,
) -> Result<SequenceBatch, TrainingError>
where
    T: TokenizerAdapter + ?Sized,
    S: AsRef<str>,
{
    if max_length == 0 {
        return Err(TrainingError::InvalidConfig(
            "max_length must be at least 1".to_string(),
        ));
    }
    if vocab_size == 0 {
        return Err(TrainingError::InvalidConfig(
            "vocab_size must be at least 1".to_string(),
        ));
    }

    let mut builder = BatchBuilder::new(max_length, vocab_size);
    expand_into(&mut builder, tokenizer, captions, embedding)?;
    builder.finish()
}

/// Append the pairs of `captions` to `builder`, returning how many were added
pub(crate) fn expand_into<T, S>(
    builder: &mut BatchBuilder,
    tokenizer: &T,
    captions: &[S],
    embedding: ArrayView1<'_, f32>,
) -> Result<usize, TrainingError>
where
    T: TokenizerAdapter + ?Sized,
    S: AsRef<str>,
{
    let before = builder.len();
    for caption in captions {
        let ids = tokenizer.tokenize(caption.as_ref());
        for i in 1..ids.len() {
            builder.push_pair(embedding, &ids[..i], ids[i])?;
        }
    }

    let added = builder.len() - before;
    debug!("Expanded {} captions into {} pairs", captions.len(), added);
    Ok(added)
}
