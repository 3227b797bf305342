//! VGG16 fc2 image embeddings

use caption_net_common::{FeatureExtractor, ProcessingError};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array4, ArrayD, IxDyn};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use tracing::debug;

use crate::{create_session, OnnxError};

/// Input side length expected by VGG16
pub const IMAGE_SIZE: u32 = 224;

/// ImageNet channel means in BGR order, subtracted from every pixel
pub const VGG_BGR_MEANS: [f32; 3] = [103.939, 116.779, 123.68];

const DEFAULT_INPUT_NAME: &str = "input_1";

/// Resize to `size`×`size` and apply caffe-style VGG preprocessing:
/// RGB to BGR, subtract [`VGG_BGR_MEANS`], NHWC layout `[1, size, size, 3]`.
pub fn preprocess_image(img: &DynamicImage, size: u32) -> Array4<f32> {
    let img = img.resize_exact(size, size, FilterType::Nearest).to_rgb8();
    let side = size as usize;

    let mut tensor = Array4::<f32>::zeros((1, side, side, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (channel, &mean) in VGG_BGR_MEANS.iter().enumerate() {
            tensor[[0, y, x, channel]] = f32::from(pixel[2 - channel]) - mean;
        }
    }
    tensor
}

/// Feature extractor backed by a VGG16 ONNX export
pub struct OnnxFeatureExtractor {
    session: Session,
    input_name: String,
    image_size: u32,
}

impl OnnxFeatureExtractor {
    /// Load the model; the image input defaults to `input_1` (Keras naming)
    pub fn new(model_path: &Path) -> Result<Self, OnnxError> {
        let session = create_session(model_path)?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| DEFAULT_INPUT_NAME.to_string());
        debug!("Feature extractor input: {}", input_name);

        Ok(Self {
            session,
            input_name,
            image_size: IMAGE_SIZE,
        })
    }

    #[must_use]
    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }
}

impl FeatureExtractor for OnnxFeatureExtractor {
    fn extract(&mut self, image_path: &Path) -> caption_net_common::Result<ArrayD<f32>> {
        let img = image::open(image_path)?;
        let input = preprocess_image(&img, self.image_size);

        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| ProcessingError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| ProcessingError::Inference(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProcessingError::Inference(e.to_string()))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        debug!("Extracted {:?} features from {}", dims, image_path.display());
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
            .map_err(|e| ProcessingError::InvalidShape(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_preprocess_shape_and_bgr_means() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])));
        let tensor = preprocess_image(&img, IMAGE_SIZE);

        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!((tensor[[0, 0, 0, 0]] - (30.0 - 103.939)).abs() < 1e-4);
        assert!((tensor[[0, 100, 50, 1]] - (20.0 - 116.779)).abs() < 1e-4);
        assert!((tensor[[0, 223, 223, 2]] - (10.0 - 123.68)).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_keeps_layout_row_major() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 0, 0]));
        let tensor = preprocess_image(&DynamicImage::ImageRgb8(img), 2);

        // Red pixel at x=1, y=0 lands in the last (R) channel of row 0
        assert!((tensor[[0, 0, 1, 2]] - (255.0 - 123.68)).abs() < 1e-4);
        assert!((tensor[[0, 1, 0, 2]] + 123.68).abs() < 1e-4);
    }

    #[test]
    #[ignore] // Requires models/vgg16_fc2.onnx
    fn test_extract_fc2_features() {
        let model = Path::new("models/vgg16_fc2.onnx");
        if !model.exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("grey.png");
        RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]))
            .save(&image_path)
            .unwrap();

        let mut extractor = OnnxFeatureExtractor::new(model).unwrap();
        let features = extractor.extract(&image_path).unwrap();
        assert_eq!(features.len(), 4096);
    }

    #[test]
    fn test_missing_model() {
        let result = OnnxFeatureExtractor::new(Path::new("missing/vgg16.onnx"));
        assert!(matches!(result, Err(OnnxError::ModelNotFound(_))));
    }
}
