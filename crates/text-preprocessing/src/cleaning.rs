//! Caption text cleaning
//!
//! Captions are lowercased, stripped of ASCII punctuation, filtered down to
//! alphabetic words longer than one character, then wrapped in the START/END
//! markers so the decoder learns where a caption begins and ends.

use caption_net_common::{Descriptions, END_TOKEN, START_TOKEN};
use tracing::debug;

/// Clean a single raw caption and wrap it with the START/END markers
#[must_use]
pub fn clean_caption(raw: &str) -> String {
    let words = raw
        .split_whitespace()
        .map(|word| {
            word.to_lowercase()
                .chars()
                .filter(|c| !c.is_ascii_punctuation())
                .collect::<String>()
        })
        .filter(|word| word.chars().count() > 1)
        .filter(|word| word.chars().all(char::is_alphabetic));

    let mut cleaned = String::from(START_TOKEN);
    for word in words {
        cleaned.push(' ');
        cleaned.push_str(&word);
    }
    cleaned.push(' ');
    cleaned.push_str(END_TOKEN);
    cleaned
}

/// Clean every caption in place
pub fn clean_descriptions(descriptions: &mut Descriptions) {
    let mut cleaned = 0usize;
    for (_, captions) in descriptions.iter_mut() {
        for caption in captions.iter_mut() {
            *caption = clean_caption(caption);
            cleaned += 1;
        }
    }
    debug!("Cleaned {} captions", cleaned);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_caption() {
        assert_eq!(
            clean_caption("A child in a pink dress is climbing up a set of stairs ."),
            "startseq child in pink dress is climbing up set of stairs endseq"
        );
    }

    #[test]
    fn test_clean_caption_drops_numbers_and_punctuation() {
        assert_eq!(
            clean_caption("Two dogs, 3 cats & the dog's ball2"),
            "startseq two dogs cats the dogs endseq"
        );
    }

    #[test]
    fn test_clean_empty_caption_keeps_markers() {
        assert_eq!(clean_caption("a . 1"), "startseq endseq");
    }

    #[test]
    fn test_clean_descriptions_in_place() {
        let mut descriptions: Descriptions =
            [("img", "A Dog runs."), ("img", "Grass!")].into_iter().collect();
        clean_descriptions(&mut descriptions);

        assert_eq!(
            descriptions.get("img").unwrap(),
            &["startseq dog runs endseq".to_string(), "startseq grass endseq".to_string()]
        );
    }
}
