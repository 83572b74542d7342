//! U²-Net salient-object matting via ONNX Runtime.
//!
//! Predicts a foreground probability map at 320×320, stretches it back to the
//! source size and uses it as the alpha channel.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage, RgbaImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const U2NET_INPUT_SIZE: u32 = 320;
const U2NET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const U2NET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum MattingError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("cannot remove background from an empty image")]
    EmptyImage,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// U²-Net background remover.
pub struct U2NetMatting {
    session: Session,
}

impl U2NetMatting {
    /// Load the U²-Net ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, MattingError> {
        if !model_path.exists() {
            return Err(MattingError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded U2-Net model");

        Ok(Self { session })
    }

    /// Predict the foreground mask for an RGB image at its own resolution.
    pub fn mask(&mut self, image: &RgbImage) -> Result<GrayImage, MattingError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(MattingError::EmptyImage);
        }

        let input = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, prediction) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| MattingError::InferenceFailed(format!("mask extraction: {e}")))?;

        let side = U2NET_INPUT_SIZE as usize;
        if prediction.len() < side * side {
            return Err(MattingError::InferenceFailed(format!(
                "expected at least {} mask values, got {}",
                side * side,
                prediction.len()
            )));
        }

        let small = prediction_to_mask(&prediction[..side * side]);
        Ok(imageops::resize(&small, image.width(), image.height(), FilterType::Lanczos3))
    }

    /// Cut out the foreground: the mask becomes the alpha channel.
    pub fn cut_out(&mut self, image: &RgbImage) -> Result<RgbaImage, MattingError> {
        let mask = self.mask(image)?;
        Ok(apply_mask(image, &mask))
    }
}

/// Resize to 320×320, scale by the brightest pixel, ImageNet-normalize.
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(image, U2NET_INPUT_SIZE, U2NET_INPUT_SIZE, FilterType::Lanczos3);
    let max = resized.pixels().flat_map(|p| p.0).max().unwrap_or(0).max(1) as f32;

    let side = U2NET_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / max - U2NET_MEAN[c]) / U2NET_STD[c];
        }
    }
    tensor
}

/// Min-max normalize the raw 320×320 prediction into an 8-bit mask.
fn prediction_to_mask(prediction: &[f32]) -> GrayImage {
    let (lo, hi) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;

    GrayImage::from_fn(U2NET_INPUT_SIZE, U2NET_INPUT_SIZE, |x, y| {
        let v = prediction[(y * U2NET_INPUT_SIZE + x) as usize];
        let norm = if range > f32::EPSILON { (v - lo) / range } else { 0.0 };
        Luma([(norm * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

fn apply_mask(image: &RgbImage, mask: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        image::Rgba([r, g, b, mask.get_pixel(x, y)[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_prediction_to_mask_stretches_range() {
        let side = U2NET_INPUT_SIZE as usize;
        let mut prediction = vec![0.2f32; side * side];
        prediction[0] = 0.1;
        prediction[1] = 0.6;

        let mask = prediction_to_mask(&prediction);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 0)[0], 255);
        assert_eq!(mask.get_pixel(2, 0)[0], 51);
    }

    #[test]
    fn test_prediction_to_mask_flat_is_transparent() {
        let side = U2NET_INPUT_SIZE as usize;
        let mask = prediction_to_mask(&vec![0.7; side * side]);
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_preprocess_scales_by_max_pixel() {
        let image = RgbImage::from_pixel(10, 10, Rgb([100, 50, 0]));
        let tensor = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        let r = tensor[[0, 0, 160, 160]];
        assert!((r - (1.0 - U2NET_MEAN[0]) / U2NET_STD[0]).abs() < 0.02, "r = {r}");
    }

    #[test]
    fn test_apply_mask_sets_alpha() {
        let image = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let mask = GrayImage::from_raw(2, 1, vec![0, 200]).unwrap();
        let out = apply_mask(&image, &mask);
        assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30, 0]);
        assert_eq!(out.get_pixel(1, 0).0, [10, 20, 30, 200]);
    }
}
