//! Capability interfaces the daemon is built against.
//!
//! Each capability is a black box over pretrained models. Implementations take
//! `&mut self` because ONNX sessions need exclusive access while running, and
//! must be `Send` so they can be moved onto the inference thread.

use crate::detector::DetectorError;
use crate::matting::MattingError;
use crate::recognizer::RecognizerError;
use crate::types::Verdict;
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("matting: {0}")]
    Matting(#[from] MattingError),
    #[error("label font: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("face could not be detected in {0}; confirm that the picture is a face photo")]
    FaceNotDetected(&'static str),
    /// Failure reported by a capability implemented outside this crate.
    #[error("{0}")]
    Other(String),
}

/// Draws facial landmarks on the most prominent face of an image.
pub trait LandmarkAnnotator: Send {
    /// Returns the annotated image, or `None` when no face is found.
    fn annotate(&mut self, image: &DynamicImage) -> Result<Option<DynamicImage>, CapabilityError>;
}

/// Replaces an image's background with transparency.
pub trait BackgroundRemover: Send {
    fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage, CapabilityError>;
}

/// Decides whether two images show the same person.
pub trait FaceComparator: Send {
    fn compare(&mut self, first: &DynamicImage, second: &DynamicImage) -> Result<Verdict, CapabilityError>;
}

impl BackgroundRemover for crate::matting::U2NetMatting {
    fn remove_background(&mut self, image: &DynamicImage) -> Result<RgbaImage, CapabilityError> {
        Ok(self.cut_out(&image.to_rgb8())?)
    }
}
