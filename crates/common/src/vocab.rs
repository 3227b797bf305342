//! Word-level vocabulary and the tokenizer contract used by decoding and training
//!
//! Ids start at 1 in descending word-frequency order; id 0 is reserved for padding.
//! The vocabulary wraps a `tokenizers` word-level model: text is lowercased,
//! punctuation is replaced by spaces, then split on whitespace. Words without
//! an id are dropped.

use std::collections::HashMap;
use std::path::Path;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::normalizers::replace::{Replace, ReplacePattern};
use tokenizers::normalizers::utils::{Lowercase, Sequence};
use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::{NormalizedString, Normalizer, Tokenizer};
use tracing::{debug, info, warn};

use crate::{ProcessingError, Result, TokenId, PAD_ID};

/// Marker wrapped around every cleaned caption to open it
pub const START_TOKEN: &str = "startseq";
/// Marker wrapped around every cleaned caption to close it
pub const END_TOKEN: &str = "endseq";
/// Model token holding the padding id; also the model's unknown token
pub const PAD_TOKEN: &str = "[PAD]";

/// Characters replaced by a space before splitting
const FILTER_PATTERN: &str = r##"[!"#$%&()*+,\-./:;<=>?@\[\\\]^_`{|}~\t\n]"##;

/// Read-only word/id mapping consumed by the decoder and the sequence expander
pub trait TokenizerAdapter {
    /// Id for `word`, if the word is in the vocabulary
    fn token_to_id(&self, word: &str) -> Option<TokenId>;

    /// Word for `id`; `None` for the padding id and unknown ids
    fn id_to_token(&self, id: TokenId) -> Option<String>;

    /// Ordered ids of the known words in `text`
    fn tokenize(&self, text: &str) -> Vec<TokenId>;

    /// Number of id slots including the padding slot
    fn vocab_size(&self) -> usize;
}

/// Resolved ids of the START and END markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTokens {
    pub start: TokenId,
    pub end: TokenId,
}

impl ControlTokens {
    /// Look up both markers in `tokenizer`
    pub fn resolve<T: TokenizerAdapter + ?Sized>(
        tokenizer: &T,
        start: &str,
        end: &str,
    ) -> Option<Self> {
        Some(Self {
            start: tokenizer.token_to_id(start)?,
            end: tokenizer.token_to_id(end)?,
        })
    }

    /// Whether `id` is one of the two markers
    #[must_use]
    pub fn is_control(&self, id: TokenId) -> bool {
        id == self.start || id == self.end
    }
}

fn tokenizer_error(context: &str, err: tokenizers::Error) -> ProcessingError {
    ProcessingError::Tokenizer(format!("{}: {}", context, err))
}

/// Lowercase, then blank out the filtered characters
fn caption_normalizer() -> Result<Sequence> {
    let replace = Replace::new(ReplacePattern::Regex(FILTER_PATTERN.to_string()), " ")
        .map_err(|e| tokenizer_error("Failed to build punctuation filter", e))?;
    Ok(Sequence::new(vec![Lowercase.into(), replace.into()]))
}

/// Word-level vocabulary backed by a `tokenizers` model
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokenizer: Tokenizer,
    start_token: String,
    end_token: String,
}

impl Vocabulary {
    /// Build a vocabulary from words already in id order (first word gets id 1)
    ///
    /// # Errors
    /// Returns an error if a word is empty, reserved or appears twice
    pub fn from_words<I, S>(words: I, start_token: &str, end_token: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab: HashMap<String, TokenId> = HashMap::new();
        vocab.insert(PAD_TOKEN.to_string(), PAD_ID);

        for (i, word) in words.into_iter().map(Into::into).enumerate() {
            if word.is_empty() {
                return Err(ProcessingError::InvalidVocabulary(format!(
                    "empty word at id {}",
                    i + 1
                )));
            }
            let id = TokenId::try_from(i + 1).map_err(|_| {
                ProcessingError::InvalidVocabulary(format!("too many words: {}", i + 1))
            })?;
            if vocab.contains_key(&word) {
                return Err(ProcessingError::InvalidVocabulary(format!(
                    "duplicate or reserved word '{}'",
                    word
                )));
            }
            vocab.insert(word, id);
        }

        let model = WordLevel::builder()
            .vocab(vocab.into_iter().collect())
            .unk_token(PAD_TOKEN.to_string())
            .build()
            .map_err(|e| tokenizer_error("Failed to build word-level model", e))?;

        let mut tokenizer = Tokenizer::new(model);
        tokenizer.with_normalizer(Some(caption_normalizer()?));
        tokenizer.with_pre_tokenizer(Some(WhitespaceSplit));

        Self::from_tokenizer(tokenizer, start_token, end_token)
    }

    /// Wrap an existing tokenizer whose model reserves id 0 for [`PAD_TOKEN`]
    ///
    /// # Errors
    /// Returns an error if id 0 is not the padding token
    pub fn from_tokenizer(tokenizer: Tokenizer, start_token: &str, end_token: &str) -> Result<Self> {
        if tokenizer.token_to_id(PAD_TOKEN) != Some(PAD_ID) {
            return Err(ProcessingError::InvalidVocabulary(format!(
                "id {} must hold the padding token '{}'",
                PAD_ID, PAD_TOKEN
            )));
        }
        Ok(Self {
            tokenizer,
            start_token: start_token.to_string(),
            end_token: end_token.to_string(),
        })
    }

    /// Fit a vocabulary on caption texts.
    ///
    /// Ids are assigned by descending word count; words with equal counts
    /// keep the order in which they were first seen.
    pub fn fit_on_texts<I, S>(texts: I, start_token: &str, end_token: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalizer = caption_normalizer()?;
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let mut normalized = NormalizedString::from(text.as_ref());
            normalizer
                .normalize(&mut normalized)
                .map_err(|e| tokenizer_error("Failed to normalize caption", e))?;

            for word in normalized.get().split_whitespace() {
                match seen.get(word) {
                    Some(&slot) => counts[slot].1 += 1,
                    None => {
                        seen.insert(word.to_string(), counts.len());
                        counts.push((word.to_string(), 1));
                    }
                }
            }
        }

        // Stable sort keeps first-seen order among equal counts
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        let vocab = Self::from_words(counts.into_iter().map(|(w, _)| w), start_token, end_token)?;
        info!(
            "Fitted vocabulary: {} words (vocab size {})",
            vocab.vocab_size() - 1,
            vocab.vocab_size()
        );
        Ok(vocab)
    }

    /// The START marker word
    #[must_use]
    pub fn start_token(&self) -> &str {
        &self.start_token
    }

    /// The END marker word
    #[must_use]
    pub fn end_token(&self) -> &str {
        &self.end_token
    }

    #[must_use]
    pub fn start_id(&self) -> Option<TokenId> {
        self.token_to_id(&self.start_token)
    }

    #[must_use]
    pub fn end_id(&self) -> Option<TokenId> {
        self.token_to_id(&self.end_token)
    }

    /// Resolve the START/END marker ids
    ///
    /// # Errors
    /// Returns an error if either marker is missing from the vocabulary
    pub fn control_tokens(&self) -> Result<ControlTokens> {
        ControlTokens::resolve(self, &self.start_token, &self.end_token).ok_or_else(|| {
            ProcessingError::InvalidVocabulary(format!(
                "control tokens '{}'/'{}' are not in the vocabulary",
                self.start_token, self.end_token
            ))
        })
    }

    /// Words in id order, starting at id 1
    #[must_use]
    pub fn words(&self) -> Vec<String> {
        let mut entries: Vec<(String, TokenId)> = self
            .tokenizer
            .get_vocab(false)
            .into_iter()
            .filter(|&(_, id)| id != PAD_ID)
            .collect();
        entries.sort_by_key(|&(_, id)| id);
        entries.into_iter().map(|(word, _)| word).collect()
    }

    /// The underlying tokenizer
    #[must_use]
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Save as a `tokenizers` JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.tokenizer
            .save(path, false)
            .map_err(|e| tokenizer_error("Failed to save tokenizer", e))?;
        debug!(
            "Saved vocabulary ({} words) to {}",
            self.vocab_size() - 1,
            path.display()
        );
        Ok(())
    }

    /// Load a `tokenizers` JSON file, using the standard START/END markers
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_markers(path, START_TOKEN, END_TOKEN)
    }

    pub fn load_with_markers<P: AsRef<Path>>(
        path: P,
        start_token: &str,
        end_token: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading tokenizer from {:?}", path);
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| tokenizer_error("Failed to load tokenizer", e))?;
        let vocab = Self::from_tokenizer(tokenizer, start_token, end_token)?;
        info!(
            "Loaded vocabulary from {} (vocab size {})",
            path.display(),
            vocab.vocab_size()
        );
        Ok(vocab)
    }
}

impl TokenizerAdapter for Vocabulary {
    fn token_to_id(&self, word: &str) -> Option<TokenId> {
        self.tokenizer
            .token_to_id(word)
            .filter(|&id| id != PAD_ID)
    }

    fn id_to_token(&self, id: TokenId) -> Option<String> {
        if id == PAD_ID {
            return None;
        }
        self.tokenizer.id_to_token(id)
    }

    fn tokenize(&self, text: &str) -> Vec<TokenId> {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding
                .get_ids()
                .iter()
                .copied()
                .filter(|&id| id != PAD_ID)
                .collect(),
            Err(err) => {
                warn!("Failed to tokenize {:?}: {}", text, err);
                Vec::new()
            }
        }
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_vocab() -> Vocabulary {
        Vocabulary::from_words(["startseq", "cat", "sat", "endseq"], START_TOKEN, END_TOKEN)
            .unwrap()
    }

    #[test]
    fn test_ids_start_at_one() {
        let vocab = cat_vocab();
        assert_eq!(vocab.token_to_id("startseq"), Some(1));
        assert_eq!(vocab.token_to_id("endseq"), Some(4));
        assert_eq!(vocab.token_to_id(PAD_TOKEN), None);
        assert_eq!(vocab.id_to_token(2).as_deref(), Some("cat"));
        assert_eq!(vocab.id_to_token(0), None);
        assert_eq!(vocab.id_to_token(5), None);
        assert_eq!(vocab.vocab_size(), 5);
    }

    #[test]
    fn test_tokenize_normalizes_and_drops_unknown_words() {
        let vocab = cat_vocab();
        assert_eq!(vocab.tokenize("startseq Cat, sat on-the mat endseq"), vec![1, 2, 3, 4]);
        assert_eq!(vocab.tokenize("CAT\tsat.\nendseq"), vec![2, 3, 4]);
        assert!(vocab.tokenize("dog").is_empty());
        assert!(vocab.tokenize("").is_empty());
    }

    #[test]
    fn test_padding_token_in_text_is_not_a_word() {
        let vocab = cat_vocab();
        assert_eq!(vocab.tokenize("[PAD] cat"), vec![2]);
    }

    #[test]
    fn test_fit_orders_by_count_then_first_seen() {
        let vocab = Vocabulary::fit_on_texts(
            [
                "startseq dog runs endseq",
                "startseq cat sits endseq",
                "startseq cat runs endseq",
            ],
            START_TOKEN,
            END_TOKEN,
        )
        .unwrap();

        assert_eq!(vocab.words(), vec!["startseq", "endseq", "runs", "cat", "dog", "sits"]);
        assert_eq!(vocab.vocab_size(), 7);
    }

    #[test]
    fn test_fit_normalizes_like_tokenize() {
        let vocab = Vocabulary::fit_on_texts(["Dog's ball, dog!"], START_TOKEN, END_TOKEN).unwrap();
        assert_eq!(vocab.words(), vec!["dog's", "ball", "dog"]);
        assert_eq!(vocab.tokenize("DOG'S ball"), vec![1, 2]);
    }

    #[test]
    fn test_control_tokens() {
        let tokens = cat_vocab().control_tokens().unwrap();
        assert_eq!(tokens, ControlTokens { start: 1, end: 4 });
        assert_eq!(cat_vocab().start_id(), Some(1));
        assert_eq!(cat_vocab().end_id(), Some(4));
        assert!(tokens.is_control(4));
        assert!(!tokens.is_control(2));

        let missing = Vocabulary::from_words(["cat"], START_TOKEN, END_TOKEN).unwrap();
        assert!(missing.control_tokens().is_err());
    }

    #[test]
    fn test_duplicate_and_reserved_words_rejected() {
        let result = Vocabulary::from_words(["cat", "cat"], START_TOKEN, END_TOKEN);
        assert!(matches!(result, Err(ProcessingError::InvalidVocabulary(_))));

        let result = Vocabulary::from_words(["cat", PAD_TOKEN], START_TOKEN, END_TOKEN);
        assert!(matches!(result, Err(ProcessingError::InvalidVocabulary(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");

        let vocab = cat_vocab();
        vocab.save(&path).unwrap();
        let loaded = Vocabulary::load(&path).unwrap();

        assert_eq!(loaded.words(), vocab.words());
        assert_eq!(loaded.token_to_id("sat"), Some(3));
        assert_eq!(loaded.tokenize("Cat sat!"), vec![2, 3]);
        assert_eq!(loaded.vocab_size(), 5);
        assert_eq!(loaded.start_token(), START_TOKEN);

        let reread = Tokenizer::from_file(&path).unwrap();
        assert_eq!(reread.token_to_id(PAD_TOKEN), Some(PAD_ID));
    }

    #[test]
    fn test_load_rejects_tokenizer_without_padding_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");

        let model = WordLevel::builder()
            .vocab([("[UNK]".to_string(), 0), ("cat".to_string(), 1)].into_iter().collect())
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();
        Tokenizer::new(model).save(&path, false).unwrap();

        assert!(matches!(
            Vocabulary::load(&path),
            Err(ProcessingError::InvalidVocabulary(_))
        ));
    }
}
