//! Text generation logic for caption decoding
//!
//! Greedy and beam search over a next-token oracle. Each step left-pads the
//! current prefix to `max_length`, asks the oracle for a distribution over the
//! vocabulary, and extends the prefix. Decoding starts from the START marker and
//! finishes on the END marker or when the prefix reaches `max_length` ids.

use caption_net_common::{
    pad_sequence, ControlTokens, NextTokenOracle, OracleError, TokenId, TokenizerAdapter,
    END_TOKEN, START_TOKEN,
};
use ndarray::{Array1, ArrayView1};
use tracing::debug;

use crate::{CaptionError, SearchStrategy};

/// Floor added to every probability before taking its log, so a zero
/// probability scores `ln(1e-10)` instead of `-inf`
pub const LOG_EPSILON: f32 = 1e-10;

/// A beam-search hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Token ids, starting with START
    pub tokens: Vec<TokenId>,
    /// Sum of `ln(p + LOG_EPSILON)` over every generated token
    pub score: f32,
}

impl Candidate {
    fn is_terminated(&self, end: TokenId) -> bool {
        self.tokens.last() == Some(&end)
    }
}

/// Caption decoder with an explicit oracle handle and tokenizer
pub struct TextGenerator<O, T> {
    oracle: O,
    tokenizer: T,
    control: ControlTokens,
}

impl<O: NextTokenOracle, T: TokenizerAdapter> TextGenerator<O, T> {
    /// Create a decoder with already-resolved START/END ids
    pub fn new(oracle: O, tokenizer: T, control: ControlTokens) -> Self {
        Self {
            oracle,
            tokenizer,
            control,
        }
    }

    /// Create a decoder, resolving the standard START/END markers in `tokenizer`
    ///
    /// # Errors
    /// Returns an error if either marker has no id
    pub fn from_tokenizer(oracle: O, tokenizer: T) -> Result<Self, CaptionError> {
        let control = ControlTokens::resolve(&tokenizer, START_TOKEN, END_TOKEN).ok_or_else(|| {
            CaptionError::InvalidConfig(format!(
                "tokenizer has no id for '{}' or '{}'",
                START_TOKEN, END_TOKEN
            ))
        })?;
        debug!("Control tokens: START={}, END={}", control.start, control.end);
        Ok(Self::new(oracle, tokenizer, control))
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    pub fn control_tokens(&self) -> ControlTokens {
        self.control
    }

    /// Decode with the selected strategy and render the caption text
    pub fn decode(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        strategy: SearchStrategy,
        max_length: usize,
        num_beams: usize,
    ) -> Result<String, CaptionError> {
        self.decode_scored(embedding, strategy, max_length, num_beams)
            .map(|(text, _)| text)
    }

    /// Like [`decode`](Self::decode), also returning the beam score of the
    /// chosen hypothesis (greedy decoding has none)
    pub fn decode_scored(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        strategy: SearchStrategy,
        max_length: usize,
        num_beams: usize,
    ) -> Result<(String, Option<f32>), CaptionError> {
        match strategy {
            SearchStrategy::Greedy => Ok((self.greedy_decode(embedding, max_length)?, None)),
            SearchStrategy::Beam => {
                let beams = self.beam_search(embedding, max_length, num_beams)?;
                let best = &beams[0];
                Ok((self.render(&best.tokens), Some(best.score)))
            }
        }
    }

    /// Greedy decoding, rendered as text
    pub fn greedy_decode(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        max_length: usize,
    ) -> Result<String, CaptionError> {
        let tokens = self.greedy_search(embedding, max_length)?;
        let caption = self.render(&tokens);
        debug!("Generated caption: '{}'", caption);
        Ok(caption)
    }

    /// Greedy decoding: always append the most probable next token.
    ///
    /// Stops after END, when the sequence holds `max_length` ids, or when the
    /// oracle picks an id with no word (the generated prefix is kept).
    pub fn greedy_search(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        max_length: usize,
    ) -> Result<Vec<TokenId>, CaptionError> {
        check_max_length(max_length)?;

        let mut tokens = vec![self.control.start];
        debug!("Starting greedy generation (max_length={})", max_length);

        while tokens.len() < max_length {
            let probs = self.next_distribution(embedding, &tokens, max_length)?;
            let next = argmax(probs.view()).ok_or_else(|| {
                OracleError::InvalidOutput("distribution has no valid token".to_string())
            })?;

            if self.tokenizer.id_to_token(next).is_none() {
                debug!("Token ID {} has no word, stopping generation", next);
                break;
            }

            debug!("Step {}: Generated token ID {}", tokens.len() - 1, next);
            tokens.push(next);

            if next == self.control.end {
                debug!("Generated END token, stopping generation");
                break;
            }
        }

        Ok(tokens)
    }

    /// Beam search, rendered as text from the best hypothesis
    pub fn beam_decode(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        max_length: usize,
        num_beams: usize,
    ) -> Result<String, CaptionError> {
        let beams = self.beam_search(embedding, max_length, num_beams)?;
        let caption = self.render(&beams[0].tokens);
        debug!("Generated caption: '{}' (score {:.4})", caption, beams[0].score);
        Ok(caption)
    }

    /// Beam search returning the final beam, best first (never empty).
    ///
    /// Every unfinished hypothesis is extended with the oracle's `num_beams`
    /// most probable tokens; finished ones (ending in END) are carried over
    /// unchanged. All of them are then ranked by cumulative log score with a
    /// stable sort and cut back to `num_beams`. The search stops as soon as the
    /// best hypothesis is finished, or once no unfinished hypothesis is shorter
    /// than `max_length`. Scores are not length-normalized.
    pub fn beam_search(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        max_length: usize,
        num_beams: usize,
    ) -> Result<Vec<Candidate>, CaptionError> {
        check_max_length(max_length)?;
        if num_beams == 0 {
            return Err(CaptionError::InvalidConfig(
                "beam width must be at least 1".to_string(),
            ));
        }

        let end = self.control.end;
        let mut beams = vec![Candidate {
            tokens: vec![self.control.start],
            score: 0.0,
        }];

        debug!(
            "Starting beam search (max_length={}, num_beams={})",
            max_length, num_beams
        );

        loop {
            let best = &beams[0];
            if best.is_terminated(end) && best.tokens.len() > 1 {
                debug!("Best hypothesis finished, stopping beam search");
                break;
            }
            let has_open = beams
                .iter()
                .any(|c| !c.is_terminated(end) && c.tokens.len() < max_length);
            if !has_open {
                debug!("Reached max length, stopping beam search");
                break;
            }

            let mut all_candidates = Vec::with_capacity(beams.len() * num_beams);
            for candidate in &beams {
                if candidate.is_terminated(end) || candidate.tokens.len() >= max_length {
                    all_candidates.push(candidate.clone());
                    continue;
                }

                let probs = self.next_distribution(embedding, &candidate.tokens, max_length)?;
                for id in top_k_ascending(probs.view(), num_beams) {
                    let mut tokens = Vec::with_capacity(candidate.tokens.len() + 1);
                    tokens.extend_from_slice(&candidate.tokens);
                    tokens.push(id);
                    all_candidates.push(Candidate {
                        tokens,
                        score: candidate.score + (probs[id as usize] + LOG_EPSILON).ln(),
                    });
                }
            }

            if all_candidates.is_empty() {
                debug!("No finite probabilities to expand, stopping beam search");
                break;
            }

            // Stable: equal scores keep the order they were produced in
            all_candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
            all_candidates.truncate(num_beams);
            beams = all_candidates;

            debug!(
                "Beam step: {} hypotheses, best score {:.4} (length {})",
                beams.len(),
                beams[0].score,
                beams[0].tokens.len()
            );
        }

        Ok(beams)
    }

    /// Join the words of `tokens`, dropping START/END, padding and ids with no word
    pub fn render(&self, tokens: &[TokenId]) -> String {
        tokens
            .iter()
            .filter(|&&id| !self.control.is_control(id))
            .filter_map(|&id| {
                let word = self.tokenizer.id_to_token(id);
                if word.is_none() {
                    debug!("Token ID {} has no word, skipping", id);
                }
                word
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn next_distribution(
        &mut self,
        embedding: ArrayView1<'_, f32>,
        tokens: &[TokenId],
        max_length: usize,
    ) -> Result<Array1<f32>, CaptionError> {
        let prefix = pad_sequence(tokens, max_length);
        let probs = self.oracle.predict(embedding, &prefix)?;
        if probs.is_empty() {
            return Err(OracleError::InvalidOutput("empty distribution".to_string()).into());
        }
        Ok(probs)
    }
}

fn check_max_length(max_length: usize) -> Result<(), CaptionError> {
    if max_length == 0 {
        return Err(CaptionError::InvalidConfig(
            "max_length must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Index of the first maximum
fn argmax(probs: ArrayView1<'_, f32>) -> Option<TokenId> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &p) in probs.iter().enumerate() {
        if p.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, best_p)| p > best_p) {
            best = Some((idx, p));
        }
    }
    best.and_then(|(idx, _)| TokenId::try_from(idx).ok())
}

/// The `k` most probable ids in ascending probability order (the last one is
/// the most probable); ties keep index order and NaN entries are never picked
fn top_k_ascending(probs: ArrayView1<'_, f32>, k: usize) -> Vec<TokenId> {
    let mut order: Vec<usize> = (0..probs.len()).filter(|&idx| !probs[idx].is_nan()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));
    order[order.len().saturating_sub(k)..]
        .iter()
        .filter_map(|&idx| TokenId::try_from(idx).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_takes_first_maximum() {
        assert_eq!(argmax(array![0.1, 0.4, 0.4, 0.1].view()), Some(1));
        assert_eq!(argmax(array![f32::NAN, 0.2, 0.7].view()), Some(2));
        assert_eq!(argmax(Array1::<f32>::zeros(0).view()), None);
    }

    #[test]
    fn test_top_k_ascending() {
        let probs = array![0.05, 0.5, 0.1, 0.3, 0.05];
        assert_eq!(top_k_ascending(probs.view(), 2), vec![3, 1]);
        assert_eq!(top_k_ascending(probs.view(), 3), vec![2, 3, 1]);
        assert_eq!(top_k_ascending(probs.view(), 10).len(), 5);
    }

    #[test]
    fn test_top_k_skips_nan() {
        let probs = array![0.1, f32::NAN, 0.5];
        assert_eq!(top_k_ascending(probs.view(), 2), vec![0, 2]);
        assert_eq!(top_k_ascending(probs.view(), 5), vec![0, 2]);
        assert_eq!(
            top_k_ascending(probs.view(), 1),
            vec![argmax(probs.view()).unwrap()]
        );
    }

    #[test]
    fn test_top_k_ties_keep_index_order() {
        let probs = array![0.25, 0.25, 0.25, 0.25];
        assert_eq!(top_k_ascending(probs.view(), 2), vec![2, 3]);
    }

    #[test]
    fn test_candidate_termination() {
        let candidate = Candidate {
            tokens: vec![1, 2, 4],
            score: -0.5,
        };
        assert!(candidate.is_terminated(4));
        assert!(!candidate.is_terminated(2));
    }
}
