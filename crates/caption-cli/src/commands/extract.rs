//! Image directory to feature store

use anyhow::{Context as _, Result};
use caption_net_common::FeatureExtractor;
use caption_net_onnx::OnnxFeatureExtractor;
use caption_net_training::FeatureStore;
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::CaptionNetConfig;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Args)]
pub struct ExtractCommand {
    /// Directory of images (overrides the configured path)
    #[arg(long, value_name = "DIR")]
    images_dir: Option<PathBuf>,

    /// Output feature store (overrides the configured path)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

/// Image files directly inside `dir`, sorted by name
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Directory not found: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    images.sort();
    Ok(images)
}

impl ExtractCommand {
    pub fn execute(self, config: &CaptionNetConfig) -> Result<()> {
        let start = Instant::now();
        let images_dir = self.images_dir.unwrap_or_else(|| config.data.images_dir.clone());
        let output = self.output.unwrap_or_else(|| config.data.features_file.clone());

        let images = list_images(&images_dir)?;
        info!("Found {} images in {}", images.len(), images_dir.display());
        if images.is_empty() {
            anyhow::bail!("No .jpg/.jpeg/.png images in {}", images_dir.display());
        }

        let mut extractor = OnnxFeatureExtractor::new(&config.models.extractor_model)
            .context("Failed to load feature extractor")?
            .with_image_size(config.hyperparameters.image_size);

        let mut store = FeatureStore::new();
        for path in &images {
            let Some(image_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match extractor.extract(path) {
                Ok(features) => store.insert(image_id, features),
                Err(e) => warn!("Failed to process {}: {}", path.display(), e),
            }
        }

        config.ensure_directories()?;
        store
            .save(&output)
            .with_context(|| format!("Failed to save features to {}", output.display()))?;

        info!(
            "Extracted {}/{} images in {:.2}s",
            store.len(),
            images.len(),
            start.elapsed().as_secs_f64()
        );
        println!("Saved {} embeddings to {}", store.len(), output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_images_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.png", "c.jpeg", "notes.txt", "d.gif"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG", "c.jpeg"]);
    }

    #[test]
    fn test_list_images_missing_dir() {
        assert!(list_images(Path::new("/nonexistent/images")).is_err());
    }
}
