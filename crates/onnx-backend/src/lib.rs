//! ONNX Runtime backends for the two captioning networks
//!
//! - [`OnnxFeatureExtractor`]: VGG16 cut at the second fully-connected layer,
//!   producing a 4096-value embedding per image
//! - [`OnnxOracle`]: the trained decoder, mapping (embedding, padded prefix)
//!   to a next-token distribution
//!
//! Sessions are created with full graph optimization and the fastest
//! available execution provider (CoreML, then CUDA, then CPU).

mod extractor;
mod oracle;

pub use extractor::{preprocess_image, OnnxFeatureExtractor, IMAGE_SIZE, VGG_BGR_MEANS};
pub use oracle::{OnnxOracle, IMAGE_INPUT, TEXT_INPUT};

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Environment variable overriding the intra-op thread count
pub const THREADS_ENV: &str = "CAPTION_NET_THREADS";

/// Error type for ONNX operations
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

fn session_builder(num_threads: usize) -> Result<SessionBuilder, OnnxError> {
    Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(num_threads)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))
}

/// Create an optimized ONNX Runtime session for `model_path`
///
/// Thread count is the number of physical cores unless [`THREADS_ENV`] is
/// set. If CoreML cannot compile the model the session is rebuilt with CUDA
/// and CPU only.
///
/// # Errors
/// Returns [`OnnxError::ModelNotFound`] if the file does not exist, or a
/// builder/load error from ONNX Runtime.
pub fn create_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let num_threads = std::env::var(THREADS_ENV)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get_physical);
    let start = Instant::now();

    let session = session_builder(num_threads)?
        .with_execution_providers([
            CoreMLExecutionProvider::default().with_subgraphs(true).build(),
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path);

    let session = match session {
        Ok(session) => session,
        Err(e) if e.to_string().contains("CoreML") || e.to_string().contains("MLModel") => {
            warn!(
                "CoreML failed for {}, retrying with CUDA/CPU: {}",
                model_path.display(),
                e
            );
            session_builder(num_threads)?
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e| OnnxError::ModelLoadError {
                    path: model_path.display().to_string(),
                    error: format!("CoreML failed, CPU/CUDA also failed: {}", e),
                })?
        }
        Err(e) => {
            return Err(OnnxError::ModelLoadError {
                path: model_path.display().to_string(),
                error: e.to_string(),
            })
        }
    };

    info!(
        "Loaded ONNX model {} in {:.3}s",
        model_path.display(),
        start.elapsed().as_secs_f64()
    );
    debug!("Intra-op threads: {}", num_threads);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = create_session(Path::new("nonexistent_decoder.onnx"));
        assert!(matches!(result, Err(OnnxError::ModelNotFound(_))));
    }

    #[test]
    fn test_error_display() {
        let err = OnnxError::ModelNotFound("decoder.onnx".to_string());
        assert_eq!(err.to_string(), "Model file not found: decoder.onnx");

        let err = OnnxError::ModelLoadError {
            path: "decoder.onnx".to_string(),
            error: "invalid format".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load ONNX model from decoder.onnx: invalid format"
        );
    }
}
