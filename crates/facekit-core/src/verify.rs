//! Face verification: SCRFD detection + ArcFace embeddings + cosine distance.

use crate::capability::{CapabilityError, FaceComparator};
use crate::detector::{FaceDetector, DETECTOR_BACKEND};
use crate::recognizer::{FaceRecognizer, ARCFACE_MODEL_NAME};
use crate::types::{BoundingBox, Embedding, FacialAreas, Verdict};
use image::{DynamicImage, RgbImage};
use std::time::Instant;

/// Default cosine-distance threshold for ArcFace.
pub const DEFAULT_VERIFY_THRESHOLD: f32 = 0.68;

const SIMILARITY_METRIC: &str = "cosine";

/// [`FaceComparator`] backed by SCRFD and ArcFace.
pub struct ArcFaceComparator {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    threshold: f32,
}

impl ArcFaceComparator {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer, threshold: f32) -> Self {
        Self { detector, recognizer, threshold }
    }

    /// Detect the most confident face and embed it.
    fn embed(&mut self, image: &RgbImage, which: &'static str) -> Result<(BoundingBox, Embedding), CapabilityError> {
        let face = self
            .detector
            .detect(image)?
            .into_iter()
            .next()
            .ok_or(CapabilityError::FaceNotDetected(which))?;
        let embedding = self.recognizer.extract(image, &face)?;
        Ok((face, embedding))
    }
}

impl FaceComparator for ArcFaceComparator {
    fn compare(&mut self, first: &DynamicImage, second: &DynamicImage) -> Result<Verdict, CapabilityError> {
        let started = Instant::now();
        let (img1, img2) = (first.to_rgb8(), second.to_rgb8());

        let (face1, emb1) = self.embed(&img1, "img1")?;
        let (face2, emb2) = self.embed(&img2, "img2")?;

        let distance = emb1.cosine_distance(&emb2);
        let verdict = build_verdict(
            distance,
            self.threshold,
            FacialAreas {
                img1: face1.facial_area(img1.width(), img1.height()),
                img2: face2.facial_area(img2.width(), img2.height()),
            },
            started.elapsed().as_secs_f32(),
        );

        tracing::info!(distance, verified = verdict.verified, "faces compared");
        Ok(verdict)
    }
}

fn build_verdict(distance: f32, threshold: f32, facial_areas: FacialAreas, time: f32) -> Verdict {
    Verdict {
        verified: distance <= threshold,
        distance,
        threshold,
        model_name: ARCFACE_MODEL_NAME.to_string(),
        detector_backend: DETECTOR_BACKEND.to_string(),
        similarity_metric: SIMILARITY_METRIC.to_string(),
        facial_areas,
        time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FacialArea;

    fn areas() -> FacialAreas {
        let area = FacialArea { x: 0, y: 0, w: 10, h: 10 };
        FacialAreas { img1: area, img2: area }
    }

    #[test]
    fn test_verdict_at_threshold_is_verified() {
        let v = build_verdict(0.68, 0.68, areas(), 0.1);
        assert!(v.verified);
        assert_eq!(v.model_name, "ArcFace");
        assert_eq!(v.detector_backend, "scrfd");
        assert_eq!(v.similarity_metric, "cosine");
    }

    #[test]
    fn test_verdict_above_threshold_is_rejected() {
        let v = build_verdict(0.9, DEFAULT_VERIFY_THRESHOLD, areas(), 0.1);
        assert!(!v.verified);
        assert_eq!(v.threshold, DEFAULT_VERIFY_THRESHOLD);
    }
}
