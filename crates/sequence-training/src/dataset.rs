//! Stored image embeddings and epoch sizing

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

use crate::Result;

/// Image id to embedding, in the extractor's native shape (e.g. `[1, 4096]`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureStore {
    features: HashMap<String, ArrayD<f32>>,
}

impl FeatureStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the embedding of `image_id`
    pub fn insert(&mut self, image_id: impl Into<String>, features: ArrayD<f32>) {
        self.features.insert(image_id.into(), features);
    }

    #[must_use]
    pub fn get(&self, image_id: &str) -> Option<&ArrayD<f32>> {
        self.features.get(image_id)
    }

    #[must_use]
    pub fn contains(&self, image_id: &str) -> bool {
        self.features.contains_key(image_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Stored image ids, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    /// Drop every embedding whose id is not in `ids`
    pub fn retain_ids(&mut self, ids: &HashSet<String>) {
        self.features.retain(|id, _| ids.contains(id));
    }

    /// Save as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!("Saved {} embeddings to {}", self.len(), path.display());
        Ok(())
    }

    /// Load from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let store: Self = serde_json::from_reader(reader)?;
        info!("Loaded {} embeddings from {}", store.len(), path.display());
        Ok(store)
    }

    /// Load from JSON, keeping only the embeddings of `ids`
    pub fn load_filtered<P: AsRef<Path>>(path: P, ids: &HashSet<String>) -> Result<Self> {
        let mut store = Self::load(path)?;
        store.retain_ids(ids);
        info!("Kept {} embeddings for {} requested ids", store.len(), ids.len());
        Ok(store)
    }
}

impl FromIterator<(String, ArrayD<f32>)> for FeatureStore {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

/// Batches pulled per epoch: `num_images / batch_size`, at least one when
/// there is any image, zero when there are no images or `batch_size` is zero
#[must_use]
pub fn steps_per_epoch(num_images: usize, batch_size: usize) -> usize {
    if num_images == 0 || batch_size == 0 {
        return 0;
    }
    (num_images / batch_size).max(1)
}
