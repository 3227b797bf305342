//! Caption text preprocessing
//!
//! Turns the raw Flickr8k-style token file into cleaned, START/END wrapped
//! captions grouped per image, and fits the word vocabulary used by both the
//! decoder and the training-pair expander.
//!
//! # Raw format
//! One caption per line: `<image file name>#<n> <caption words...>`.
//! The image id is the file name up to its first `.`.
//!
//! # Example
//! ```no_run
//! use caption_net_text::{clean_descriptions, fit_vocabulary, read_descriptions};
//!
//! # fn main() -> Result<(), caption_net_text::TextError> {
//! let mut descriptions = read_descriptions("data/raw/caption/Flickr8k.token.txt")?;
//! clean_descriptions(&mut descriptions);
//! let vocab = fit_vocabulary(&descriptions)?;
//! # Ok(())
//! # }
//! ```

mod cleaning;

pub use cleaning::{clean_caption, clean_descriptions};

use caption_net_common::{Descriptions, ProcessingError, Vocabulary, END_TOKEN, START_TOKEN};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during text preprocessing
#[derive(Error, Debug)]
pub enum TextError {
    #[error("Could not read {path}: {source}")]
    FileNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] ProcessingError),

    #[error("No captions found")]
    NoCaptions,
}

pub type Result<T> = std::result::Result<T, TextError>;

fn read_doc(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| TextError::FileNotFound {
        path: path.display().to_string(),
        source,
    })
}

/// Parse raw caption lines into captions grouped per image id.
///
/// Lines with fewer than two whitespace-separated tokens are skipped.
#[must_use]
pub fn load_descriptions(doc: &str) -> Descriptions {
    let mut descriptions = Descriptions::new();

    for line in doc.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(image_token), Some(first_word)) = (tokens.next(), tokens.next()) else {
            continue;
        };

        let image_id = image_token.split('.').next().unwrap_or(image_token);
        let caption = std::iter::once(first_word)
            .chain(tokens)
            .collect::<Vec<_>>()
            .join(" ");

        descriptions.push(image_id, caption);
    }

    info!("Loaded {} images with captions", descriptions.len());
    descriptions
}

/// Read and parse a raw caption file
pub fn read_descriptions<P: AsRef<Path>>(path: P) -> Result<Descriptions> {
    Ok(load_descriptions(&read_doc(path.as_ref())?))
}

/// Write cleaned descriptions as one `<image id> <caption>` line per caption
pub fn save_descriptions<P: AsRef<Path>>(descriptions: &Descriptions, path: P) -> Result<()> {
    let lines: Vec<String> = descriptions
        .iter()
        .flat_map(|(key, captions)| captions.iter().map(move |c| format!("{} {}", key, c)))
        .collect();

    std::fs::write(path.as_ref(), lines.join("\n"))?;
    debug!(
        "Saved {} captions to {}",
        lines.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Read a file written by [`save_descriptions`]
pub fn load_clean_descriptions<P: AsRef<Path>>(path: P) -> Result<Descriptions> {
    let doc = read_doc(path.as_ref())?;
    let descriptions: Descriptions = doc
        .lines()
        .filter_map(|line| line.split_once(' '))
        .collect();

    info!(
        "Loaded {} images with cleaned captions from {}",
        descriptions.len(),
        path.as_ref().display()
    );
    Ok(descriptions)
}

/// Longest caption, in words
#[must_use]
pub fn max_caption_length(descriptions: &Descriptions) -> usize {
    descriptions
        .all_captions()
        .map(|caption| caption.split_whitespace().count())
        .max()
        .unwrap_or(0)
}

/// Parse a split file (one image file name per line) into image ids
#[must_use]
pub fn load_image_ids(doc: &str) -> HashSet<String> {
    doc.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.split('.').next().unwrap_or(line).to_string())
        .collect()
}

/// Read a split file and return its image ids
pub fn read_image_ids<P: AsRef<Path>>(path: P) -> Result<HashSet<String>> {
    let ids = load_image_ids(&read_doc(path.as_ref())?);
    info!("Loaded {} image ids from {}", ids.len(), path.as_ref().display());
    Ok(ids)
}

/// Fit the word vocabulary on every cleaned caption
pub fn fit_vocabulary(descriptions: &Descriptions) -> Result<Vocabulary> {
    if descriptions.is_empty() {
        return Err(TextError::NoCaptions);
    }
    Ok(Vocabulary::fit_on_texts(
        descriptions.all_captions(),
        START_TOKEN,
        END_TOKEN,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "1000268201_693b08cb0e.jpg#0\tA child in a pink dress .\n\
                       1000268201_693b08cb0e.jpg#1\tA girl going into a wooden building .\n\
                       \n\
                       1001773457_577c3a7d70.jpg#0 A black dog and a spotted dog are fighting\n\
                       broken_line\n";

    #[test]
    fn test_load_descriptions_groups_by_image_id() {
        let descriptions = load_descriptions(RAW);

        assert_eq!(
            descriptions.keys().collect::<Vec<_>>(),
            vec!["1000268201_693b08cb0e", "1001773457_577c3a7d70"]
        );
        assert_eq!(
            descriptions.get("1000268201_693b08cb0e").unwrap()[0],
            "A child in a pink dress ."
        );
        assert_eq!(descriptions.get("1000268201_693b08cb0e").unwrap().len(), 2);
    }

    #[test]
    fn test_max_caption_length_counts_words() {
        let mut descriptions = load_descriptions(RAW);
        clean_descriptions(&mut descriptions);
        // startseq black dog and spotted dog are fighting endseq
        assert_eq!(max_caption_length(&descriptions), 9);
    }

    #[test]
    fn test_load_image_ids() {
        let ids = load_image_ids("2513260012_03d33305cf.jpg\n\n2903617548_d3e38d7f88.jpg\n");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("2513260012_03d33305cf"));
    }

    #[test]
    fn test_fit_vocabulary_requires_captions() {
        assert!(matches!(
            fit_vocabulary(&Descriptions::new()),
            Err(TextError::NoCaptions)
        ));
    }

    #[test]
    fn test_read_missing_file_names_path() {
        let err = read_descriptions("/nonexistent/Flickr8k.token.txt").unwrap_err();
        assert!(err.to_string().contains("Flickr8k.token.txt"));
    }
}
