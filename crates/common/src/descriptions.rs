//! Insertion-ordered mapping from image id to its captions

use std::collections::{HashMap, HashSet};

/// Captions grouped by image id, iterated in first-insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Descriptions {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl Descriptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `caption` to the captions of `image_id`
    pub fn push(&mut self, image_id: &str, caption: impl Into<String>) {
        let slot = match self.index.get(image_id) {
            Some(&slot) => slot,
            None => {
                self.index.insert(image_id.to_string(), self.entries.len());
                self.entries.push((image_id.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        self.entries[slot].1.push(caption.into());
    }

    /// Captions of `image_id`
    #[must_use]
    pub fn get(&self, image_id: &str) -> Option<&[String]> {
        self.index
            .get(image_id)
            .map(|&slot| self.entries[slot].1.as_slice())
    }

    /// Image ids in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, captions)| (k.as_str(), captions.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<String>)> {
        self.entries
            .iter_mut()
            .map(|(k, captions)| (k.as_str(), captions))
    }

    /// Every caption of every image, in order
    pub fn all_captions(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|(_, captions)| captions.iter().map(String::as_str))
    }

    /// Entry at position `i` in insertion order
    #[must_use]
    pub fn entry(&self, i: usize) -> Option<(&str, &[String])> {
        self.entries
            .get(i)
            .map(|(k, captions)| (k.as_str(), captions.as_slice()))
    }

    /// Keep only the images whose id is in `ids`, preserving order
    #[must_use]
    pub fn filter(&self, ids: &HashSet<String>) -> Self {
        let mut kept = Self::new();
        for (key, captions) in self.iter().filter(|(key, _)| ids.contains(*key)) {
            for caption in captions {
                kept.push(key, caption.clone());
            }
        }
        kept
    }

    /// Number of images
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, C: Into<String>> FromIterator<(K, C)> for Descriptions {
    fn from_iter<I: IntoIterator<Item = (K, C)>>(iter: I) -> Self {
        let mut descriptions = Self::new();
        for (key, caption) in iter {
            descriptions.push(key.as_ref(), caption);
        }
        descriptions
    }
}
